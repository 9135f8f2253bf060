use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::admin::{cached_detail, cached_list, parse_detail_id, report_fetch_error};
use crate::application::listing::{
    DetailResult, FieldKind, FilterField, ListPage, ListQuery, ListResult, ListSpec, SortField,
    SortOrder, codes,
};
use crate::application::repos::{
    CreateRefundParams, PaymentsRepo, RefundsRepo, RefundsWriteRepo, RepoError,
    UpdateRefundStatusParams,
};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::RefundRecord;
use crate::domain::types::{PaymentStatus, RefundStatus};

pub const REFUND_LIST_SPEC: ListSpec = ListSpec {
    resource: "refunds",
    sort_fields: &[
        SortField {
            name: "created_at",
            column: "r.created_at",
        },
        SortField {
            name: "amount_cents",
            column: "r.amount_cents",
        },
        SortField {
            name: "processed_at",
            column: "r.processed_at",
        },
    ],
    filter_fields: &[
        FilterField {
            name: "payment_id",
            column: "r.payment_id",
            kind: FieldKind::Uuid,
        },
        FilterField {
            name: "status",
            column: "r.status::text",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "amount_cents",
            column: "r.amount_cents",
            kind: FieldKind::Integer,
        },
        FilterField {
            name: "created_at",
            column: "r.created_at",
            kind: FieldKind::Timestamp,
        },
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
    max_page_size: 100,
};

#[derive(Debug, Error)]
pub enum AdminRefundError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("refund not found")]
    NotFound,
    #[error("payment does not exist")]
    UnknownPayment,
    #[error("refunds may only be requested against paid payments")]
    PaymentNotPaid,
    #[error("refund exceeds the refundable balance of {remaining_cents} cents")]
    ExceedsBalance { remaining_cents: i64 },
    #[error("refund is not in a state that allows this transition")]
    InvalidTransition,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateRefundCommand {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
}

#[derive(Clone)]
pub struct AdminRefundService {
    reader: Arc<dyn RefundsRepo>,
    writer: Arc<dyn RefundsWriteRepo>,
    payments: Arc<dyn PaymentsRepo>,
    cache: Option<Arc<ResourceCache<RefundRecord>>>,
}

impl AdminRefundService {
    pub fn new(
        reader: Arc<dyn RefundsRepo>,
        writer: Arc<dyn RefundsWriteRepo>,
        payments: Arc<dyn PaymentsRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            payments,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResourceCache<RefundRecord>>>) -> Self {
        self.cache = cache;
        self
    }

    pub async fn list(&self, query: &ListQuery) -> ListResult<RefundRecord> {
        let validated = match REFUND_LIST_SPEC.validate(query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::Refunds, query);
        let reader = self.reader.clone();
        cached_list(
            self.cache.as_ref().map(|cache| &cache.lists),
            key,
            move || async move {
                let rows = reader
                    .list_refunds(&validated)
                    .await
                    .map_err(|err| report_fetch_error("refunds", "list", &err))?;
                let total = reader
                    .count_refunds(&validated.predicates)
                    .await
                    .map_err(|err| report_fetch_error("refunds", "count", &err))?;
                Ok(ListPage { rows, total })
            },
        )
        .await
    }

    pub async fn detail(&self, id: &str) -> DetailResult<RefundRecord> {
        let parsed = match parse_detail_id(id) {
            Ok(parsed) => parsed,
            Err(message) => return DetailResult::failure(codes::VALIDATION_ERROR, message),
        };
        let Some(refund_id) = parsed else {
            return DetailResult::ok(None);
        };

        let key = QueryKey::detail(Resource::Refunds, id);
        let reader = self.reader.clone();
        cached_detail(
            self.cache.as_ref().map(|cache| &cache.details),
            key,
            "refund",
            move || async move {
                reader
                    .find_by_id(refund_id)
                    .await
                    .map_err(|err| report_fetch_error("refunds", "fetch", &err))
            },
        )
        .await
    }

    /// Request a refund against a paid payment, bounded by what has not
    /// already been claimed by other refunds of that payment.
    pub async fn create(
        &self,
        command: CreateRefundCommand,
    ) -> Result<RefundRecord, AdminRefundError> {
        let reason = command.reason.trim().to_string();
        if reason.is_empty() {
            return Err(AdminRefundError::ConstraintViolation("reason"));
        }
        if command.amount_cents <= 0 {
            return Err(AdminRefundError::ConstraintViolation("amount_cents"));
        }

        let payment = self
            .payments
            .find_by_id(command.payment_id)
            .await?
            .ok_or(AdminRefundError::UnknownPayment)?;
        if payment.status != PaymentStatus::Paid {
            return Err(AdminRefundError::PaymentNotPaid);
        }

        let already_claimed = self
            .reader
            .total_refunded_for_payment(command.payment_id)
            .await?;
        let remaining = payment.amount_cents - already_claimed;
        if command.amount_cents > remaining {
            return Err(AdminRefundError::ExceedsBalance {
                remaining_cents: remaining.max(0),
            });
        }

        let refund = self
            .writer
            .create_refund(CreateRefundParams {
                payment_id: command.payment_id,
                amount_cents: command.amount_cents,
                reason,
                status: RefundStatus::Requested,
            })
            .await?;

        self.invalidate();
        Ok(refund)
    }

    pub async fn approve(&self, id: Uuid) -> Result<RefundRecord, AdminRefundError> {
        self.transition(id, RefundStatus::Requested, RefundStatus::Approved, None)
            .await
    }

    pub async fn reject(&self, id: Uuid) -> Result<RefundRecord, AdminRefundError> {
        self.transition(id, RefundStatus::Requested, RefundStatus::Rejected, None)
            .await
    }

    pub async fn process(&self, id: Uuid) -> Result<RefundRecord, AdminRefundError> {
        self.transition(
            id,
            RefundStatus::Approved,
            RefundStatus::Processed,
            Some(OffsetDateTime::now_utc()),
        )
        .await
    }

    /// Idempotent: deleting an id that no longer exists is a success.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminRefundError> {
        self.writer.delete_refund(id).await?;
        self.invalidate();
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: RefundStatus,
        next: RefundStatus,
        processed_at: Option<OffsetDateTime>,
    ) -> Result<RefundRecord, AdminRefundError> {
        let refund = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminRefundError::NotFound)?;
        if refund.status != expected {
            return Err(AdminRefundError::InvalidTransition);
        }

        let refund = self
            .writer
            .update_refund_status(UpdateRefundStatusParams {
                id,
                status: next,
                processed_at,
            })
            .await?;

        self.invalidate();
        Ok(refund)
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}
