use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::listing::{Predicate, ValidatedListQuery};
use crate::application::repos::{
    CreateEnrollmentParams, EnrollmentsRepo, EnrollmentsWriteRepo, RepoError,
    UpdateEnrollmentParams,
};
use crate::domain::entities::EnrollmentRecord;
use crate::domain::types::EnrollmentStatus;

use super::{PostgresRepositories, map_sqlx_error};

const ENROLLMENT_COLUMNS: &str =
    "e.id, e.intake_id, e.user_id, e.status, e.note, e.created_at, e.updated_at";

const ENROLLMENT_RETURNING: &str = "id, intake_id, user_id, status, note, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct EnrollmentRow {
    id: Uuid,
    intake_id: Uuid,
    user_id: Uuid,
    status: EnrollmentStatus,
    note: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<EnrollmentRow> for EnrollmentRecord {
    fn from(row: EnrollmentRow) -> Self {
        Self {
            id: row.id,
            intake_id: row.intake_id,
            user_id: row.user_id,
            status: row.status,
            note: row.note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl EnrollmentsRepo for PostgresRepositories {
    async fn list_enrollments(
        &self,
        query: &ValidatedListQuery,
    ) -> Result<Vec<EnrollmentRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e WHERE 1=1 "
        ));
        Self::apply_predicates(&mut qb, &query.predicates);
        Self::apply_order_and_page(&mut qb, query, "e.id");

        let rows = qb
            .build_query_as::<EnrollmentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EnrollmentRecord::from).collect())
    }

    async fn count_enrollments(&self, predicates: &[Predicate]) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM enrollments e WHERE 1=1 ");
        Self::apply_predicates(&mut qb, predicates);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, RepoError> {
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e WHERE e.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(EnrollmentRecord::from))
    }

    async fn count_by_status(&self, status: EnrollmentStatus) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE status = $1")
            .bind(status)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}

#[async_trait]
impl EnrollmentsWriteRepo for PostgresRepositories {
    async fn create_enrollment(
        &self,
        params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        let CreateEnrollmentParams {
            intake_id,
            user_id,
            status,
            note,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "INSERT INTO enrollments (id, intake_id, user_id, status, note, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {ENROLLMENT_RETURNING}"
        ))
        .bind(id)
        .bind(intake_id)
        .bind(user_id)
        .bind(status)
        .bind(note)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(EnrollmentRecord::from(row))
    }

    async fn update_enrollment(
        &self,
        params: UpdateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        let UpdateEnrollmentParams { id, status, note } = params;

        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "UPDATE enrollments
             SET status = $2, note = $3, updated_at = now()
             WHERE id = $1
             RETURNING {ENROLLMENT_RETURNING}"
        ))
        .bind(id)
        .bind(status)
        .bind(note)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(EnrollmentRecord::from(row))
    }

    async fn delete_enrollment(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM enrollments WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
