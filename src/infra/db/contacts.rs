use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::listing::{Predicate, ValidatedListQuery};
use crate::application::repos::{
    ContactRequestsRepo, ContactRequestsWriteRepo, CreateContactRequestParams, RepoError,
};
use crate::domain::entities::ContactRequestRecord;
use crate::domain::types::ContactStatus;

use super::{PostgresRepositories, map_sqlx_error};

const CONTACT_COLUMNS: &str =
    "cr.id, cr.name, cr.email, cr.phone, cr.message, cr.status, cr.handled_at, cr.created_at";

const CONTACT_RETURNING: &str = "id, name, email, phone, message, status, handled_at, created_at";

#[derive(sqlx::FromRow)]
struct ContactRequestRow {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    message: String,
    status: ContactStatus,
    handled_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl From<ContactRequestRow> for ContactRequestRecord {
    fn from(row: ContactRequestRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            message: row.message,
            status: row.status,
            handled_at: row.handled_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ContactRequestsRepo for PostgresRepositories {
    async fn list_contact_requests(
        &self,
        query: &ValidatedListQuery,
    ) -> Result<Vec<ContactRequestRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {CONTACT_COLUMNS} FROM contact_requests cr WHERE 1=1 "
        ));
        Self::apply_predicates(&mut qb, &query.predicates);
        Self::apply_order_and_page(&mut qb, query, "cr.id");

        let rows = qb
            .build_query_as::<ContactRequestRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ContactRequestRecord::from).collect())
    }

    async fn count_contact_requests(&self, predicates: &[Predicate]) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM contact_requests cr WHERE 1=1 ");
        Self::apply_predicates(&mut qb, predicates);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactRequestRecord>, RepoError> {
        let row = sqlx::query_as::<_, ContactRequestRow>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contact_requests cr WHERE cr.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ContactRequestRecord::from))
    }

    async fn count_by_status(&self, status: ContactStatus) -> Result<u64, RepoError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contact_requests WHERE status = $1")
                .bind(status)
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}

#[async_trait]
impl ContactRequestsWriteRepo for PostgresRepositories {
    async fn create_contact_request(
        &self,
        params: CreateContactRequestParams,
    ) -> Result<ContactRequestRecord, RepoError> {
        let CreateContactRequestParams {
            name,
            email,
            phone,
            message,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, ContactRequestRow>(&format!(
            "INSERT INTO contact_requests (
                id, name, email, phone, message, status, handled_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, 'new', NULL, $6)
            RETURNING {CONTACT_RETURNING}"
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(message)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ContactRequestRecord::from(row))
    }

    async fn mark_handled(
        &self,
        id: Uuid,
        handled_at: OffsetDateTime,
    ) -> Result<ContactRequestRecord, RepoError> {
        let row = sqlx::query_as::<_, ContactRequestRow>(&format!(
            "UPDATE contact_requests
             SET status = 'handled', handled_at = $2
             WHERE id = $1
             RETURNING {CONTACT_RETURNING}"
        ))
        .bind(id)
        .bind(handled_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ContactRequestRecord::from(row))
    }

    async fn delete_contact_request(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM contact_requests WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
