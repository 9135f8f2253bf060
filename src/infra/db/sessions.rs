use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateSessionParams, RepoError, SessionsRepo};
use crate::domain::entities::SessionRecord;
use crate::domain::types::UserRole;

use super::{PostgresRepositories, map_sqlx_error};

// Sessions join users so the guard resolves the role in one round trip.
const SESSION_SELECT: &str = "SELECT s.id, s.user_id, u.role, s.token_prefix, s.hashed_secret, \
     s.expires_at, s.revoked_at, s.last_seen_at, s.created_at
     FROM sessions s
     INNER JOIN users u ON u.id = s.user_id";

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    role: UserRole,
    token_prefix: String,
    hashed_secret: Vec<u8>,
    expires_at: Option<OffsetDateTime>,
    revoked_at: Option<OffsetDateTime>,
    last_seen_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            role: row.role,
            token_prefix: row.token_prefix,
            hashed_secret: row.hashed_secret,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            last_seen_at: row.last_seen_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let CreateSessionParams {
            user_id,
            token_prefix,
            hashed_secret,
            expires_at,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        sqlx::query(
            "INSERT INTO sessions (
                id, user_id, token_prefix, hashed_secret,
                expires_at, revoked_at, last_seen_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, NULL, NULL, $6)",
        )
        .bind(id)
        .bind(user_id)
        .bind(&token_prefix)
        .bind(&hashed_secret)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, SessionRow>(&format!("{SESSION_SELECT} WHERE s.id = $1"))
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(SessionRecord::from(row))
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "{SESSION_SELECT} WHERE s.token_prefix = $1"
        ))
        .bind(prefix)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SessionRecord::from))
    }

    async fn revoke_session(&self, id: Uuid, revoked_at: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query("UPDATE sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL")
            .bind(id)
            .bind(revoked_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn revoke_sessions_for_user(
        &self,
        user_id: Uuid,
        revoked_at: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(revoked_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn update_last_seen(&self, id: Uuid, seen_at: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query("UPDATE sessions SET last_seen_at = $2 WHERE id = $1")
            .bind(id)
            .bind(seen_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
