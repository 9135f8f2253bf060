use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::listing::{Predicate, ValidatedListQuery};
use crate::application::repos::{
    CreateRefundParams, RefundsRepo, RefundsWriteRepo, RepoError, UpdateRefundStatusParams,
};
use crate::domain::entities::RefundRecord;
use crate::domain::types::RefundStatus;

use super::{PostgresRepositories, map_sqlx_error};

const REFUND_COLUMNS: &str = "r.id, r.payment_id, r.amount_cents, r.reason, r.status, \
     r.processed_at, r.created_at, r.updated_at";

const REFUND_RETURNING: &str =
    "id, payment_id, amount_cents, reason, status, processed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    payment_id: Uuid,
    amount_cents: i64,
    reason: String,
    status: RefundStatus,
    processed_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<RefundRow> for RefundRecord {
    fn from(row: RefundRow) -> Self {
        Self {
            id: row.id,
            payment_id: row.payment_id,
            amount_cents: row.amount_cents,
            reason: row.reason,
            status: row.status,
            processed_at: row.processed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl RefundsRepo for PostgresRepositories {
    async fn list_refunds(
        &self,
        query: &ValidatedListQuery,
    ) -> Result<Vec<RefundRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {REFUND_COLUMNS} FROM refunds r WHERE 1=1 "
        ));
        Self::apply_predicates(&mut qb, &query.predicates);
        Self::apply_order_and_page(&mut qb, query, "r.id");

        let rows = qb
            .build_query_as::<RefundRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RefundRecord::from).collect())
    }

    async fn count_refunds(&self, predicates: &[Predicate]) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM refunds r WHERE 1=1 ");
        Self::apply_predicates(&mut qb, predicates);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefundRecord>, RepoError> {
        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds r WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RefundRecord::from))
    }

    async fn total_refunded_for_payment(&self, payment_id: Uuid) -> Result<i64, RepoError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::bigint
             FROM refunds
             WHERE payment_id = $1 AND status IN ('requested', 'approved', 'processed')",
        )
        .bind(payment_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(total)
    }

    async fn count_by_status(&self, status: RefundStatus) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refunds WHERE status = $1")
            .bind(status)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}

#[async_trait]
impl RefundsWriteRepo for PostgresRepositories {
    async fn create_refund(&self, params: CreateRefundParams) -> Result<RefundRecord, RepoError> {
        let CreateRefundParams {
            payment_id,
            amount_cents,
            reason,
            status,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "INSERT INTO refunds (
                id, payment_id, amount_cents, reason, status,
                processed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NULL, $6, $6)
            RETURNING {REFUND_RETURNING}"
        ))
        .bind(id)
        .bind(payment_id)
        .bind(amount_cents)
        .bind(reason)
        .bind(status)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(RefundRecord::from(row))
    }

    async fn update_refund_status(
        &self,
        params: UpdateRefundStatusParams,
    ) -> Result<RefundRecord, RepoError> {
        let UpdateRefundStatusParams {
            id,
            status,
            processed_at,
        } = params;

        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "UPDATE refunds
             SET status = $2, processed_at = COALESCE($3, processed_at), updated_at = now()
             WHERE id = $1
             RETURNING {REFUND_RETURNING}"
        ))
        .bind(id)
        .bind(status)
        .bind(processed_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(RefundRecord::from(row))
    }

    async fn delete_refund(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM refunds WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
