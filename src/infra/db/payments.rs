use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::listing::{Predicate, ValidatedListQuery};
use crate::application::repos::{
    CreatePaymentParams, PaymentsRepo, PaymentsWriteRepo, RepoError, UpdatePaymentStatusParams,
};
use crate::domain::entities::PaymentRecord;
use crate::domain::types::{PaymentMethod, PaymentStatus};

use super::{PostgresRepositories, map_sqlx_error};

const PAYMENT_COLUMNS: &str = "p.id, p.enrollment_id, p.amount_cents, p.method, p.status, \
     p.reference, p.paid_at, p.created_at, p.updated_at";

const PAYMENT_RETURNING: &str = "id, enrollment_id, amount_cents, method, status, \
     reference, paid_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    enrollment_id: Uuid,
    amount_cents: i64,
    method: PaymentMethod,
    status: PaymentStatus,
    reference: Option<String>,
    paid_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PaymentRow> for PaymentRecord {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            enrollment_id: row.enrollment_id,
            amount_cents: row.amount_cents,
            method: row.method,
            status: row.status,
            reference: row.reference,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PaymentsRepo for PostgresRepositories {
    async fn list_payments(
        &self,
        query: &ValidatedListQuery,
    ) -> Result<Vec<PaymentRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments p WHERE 1=1 "
        ));
        Self::apply_predicates(&mut qb, &query.predicates);
        Self::apply_order_and_page(&mut qb, query, "p.id");

        let rows = qb
            .build_query_as::<PaymentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PaymentRecord::from).collect())
    }

    async fn count_payments(&self, predicates: &[Predicate]) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM payments p WHERE 1=1 ");
        Self::apply_predicates(&mut qb, predicates);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, RepoError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PaymentRecord::from))
    }

    async fn total_paid_for_enrollment(&self, enrollment_id: Uuid) -> Result<i64, RepoError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::bigint
             FROM payments
             WHERE enrollment_id = $1 AND status = 'paid'",
        )
        .bind(enrollment_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(total)
    }

    async fn sum_paid_cents(&self) -> Result<i64, RepoError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::bigint FROM payments WHERE status = 'paid'",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(total)
    }
}

#[async_trait]
impl PaymentsWriteRepo for PostgresRepositories {
    async fn create_payment(&self, params: CreatePaymentParams) -> Result<PaymentRecord, RepoError> {
        let CreatePaymentParams {
            enrollment_id,
            amount_cents,
            method,
            status,
            reference,
            paid_at,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments (
                id, enrollment_id, amount_cents, method, status,
                reference, paid_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {PAYMENT_RETURNING}"
        ))
        .bind(id)
        .bind(enrollment_id)
        .bind(amount_cents)
        .bind(method)
        .bind(status)
        .bind(reference)
        .bind(paid_at)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PaymentRecord::from(row))
    }

    async fn update_payment_status(
        &self,
        params: UpdatePaymentStatusParams,
    ) -> Result<PaymentRecord, RepoError> {
        let UpdatePaymentStatusParams {
            id,
            status,
            paid_at,
        } = params;

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments
             SET status = $2, paid_at = $3, updated_at = now()
             WHERE id = $1
             RETURNING {PAYMENT_RETURNING}"
        ))
        .bind(id)
        .bind(status)
        .bind(paid_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PaymentRecord::from(row))
    }

    async fn delete_payment(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
