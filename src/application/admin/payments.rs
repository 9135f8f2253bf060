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
    CoursesRepo, CreatePaymentParams, EnrollmentsRepo, EnrollmentsWriteRepo, IntakesRepo,
    PaymentsRepo, PaymentsWriteRepo, RepoError, UpdateEnrollmentParams, UpdatePaymentStatusParams,
};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::{EnrollmentRecord, PaymentRecord};
use crate::domain::types::{EnrollmentStatus, PaymentMethod, PaymentStatus};

pub const PAYMENT_LIST_SPEC: ListSpec = ListSpec {
    resource: "payments",
    sort_fields: &[
        SortField {
            name: "created_at",
            column: "p.created_at",
        },
        SortField {
            name: "amount_cents",
            column: "p.amount_cents",
        },
        SortField {
            name: "paid_at",
            column: "p.paid_at",
        },
    ],
    filter_fields: &[
        FilterField {
            name: "enrollment_id",
            column: "p.enrollment_id",
            kind: FieldKind::Uuid,
        },
        FilterField {
            name: "status",
            column: "p.status::text",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "method",
            column: "p.method::text",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "amount_cents",
            column: "p.amount_cents",
            kind: FieldKind::Integer,
        },
        FilterField {
            name: "paid_at",
            column: "p.paid_at",
            kind: FieldKind::Timestamp,
        },
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
    max_page_size: 100,
};

#[derive(Debug, Error)]
pub enum AdminPaymentError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("payment not found")]
    NotFound,
    #[error("enrollment does not exist")]
    UnknownEnrollment,
    #[error("payment is already settled")]
    AlreadySettled,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreatePaymentCommand {
    pub enrollment_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Clone)]
pub struct AdminPaymentService {
    reader: Arc<dyn PaymentsRepo>,
    writer: Arc<dyn PaymentsWriteRepo>,
    enrollments: Arc<dyn EnrollmentsRepo>,
    enrollments_writer: Arc<dyn EnrollmentsWriteRepo>,
    intakes: Arc<dyn IntakesRepo>,
    courses: Arc<dyn CoursesRepo>,
    cache: Option<Arc<ResourceCache<PaymentRecord>>>,
    enrollment_cache: Option<Arc<ResourceCache<EnrollmentRecord>>>,
}

impl AdminPaymentService {
    pub fn new(
        reader: Arc<dyn PaymentsRepo>,
        writer: Arc<dyn PaymentsWriteRepo>,
        enrollments: Arc<dyn EnrollmentsRepo>,
        enrollments_writer: Arc<dyn EnrollmentsWriteRepo>,
        intakes: Arc<dyn IntakesRepo>,
        courses: Arc<dyn CoursesRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            enrollments,
            enrollments_writer,
            intakes,
            courses,
            cache: None,
            enrollment_cache: None,
        }
    }

    pub fn with_caches(
        mut self,
        cache: Option<Arc<ResourceCache<PaymentRecord>>>,
        enrollment_cache: Option<Arc<ResourceCache<EnrollmentRecord>>>,
    ) -> Self {
        self.cache = cache;
        self.enrollment_cache = enrollment_cache;
        self
    }

    pub async fn list(&self, query: &ListQuery) -> ListResult<PaymentRecord> {
        let validated = match PAYMENT_LIST_SPEC.validate(query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::Payments, query);
        let reader = self.reader.clone();
        cached_list(
            self.cache.as_ref().map(|cache| &cache.lists),
            key,
            move || async move {
                let rows = reader
                    .list_payments(&validated)
                    .await
                    .map_err(|err| report_fetch_error("payments", "list", &err))?;
                let total = reader
                    .count_payments(&validated.predicates)
                    .await
                    .map_err(|err| report_fetch_error("payments", "count", &err))?;
                Ok(ListPage { rows, total })
            },
        )
        .await
    }

    pub async fn detail(&self, id: &str) -> DetailResult<PaymentRecord> {
        let parsed = match parse_detail_id(id) {
            Ok(parsed) => parsed,
            Err(message) => return DetailResult::failure(codes::VALIDATION_ERROR, message),
        };
        let Some(payment_id) = parsed else {
            return DetailResult::ok(None);
        };

        let key = QueryKey::detail(Resource::Payments, id);
        let reader = self.reader.clone();
        cached_detail(
            self.cache.as_ref().map(|cache| &cache.details),
            key,
            "payment",
            move || async move {
                reader
                    .find_by_id(payment_id)
                    .await
                    .map_err(|err| report_fetch_error("payments", "fetch", &err))
            },
        )
        .await
    }

    /// Record a pending payment against an enrollment.
    pub async fn create(
        &self,
        command: CreatePaymentCommand,
    ) -> Result<PaymentRecord, AdminPaymentError> {
        if command.amount_cents <= 0 {
            return Err(AdminPaymentError::ConstraintViolation("amount_cents"));
        }

        self.enrollments
            .find_by_id(command.enrollment_id)
            .await?
            .ok_or(AdminPaymentError::UnknownEnrollment)?;

        let payment = self
            .writer
            .create_payment(CreatePaymentParams {
                enrollment_id: command.enrollment_id,
                amount_cents: command.amount_cents,
                method: command.method,
                status: PaymentStatus::Pending,
                reference: command.reference,
                paid_at: None,
            })
            .await?;

        self.invalidate_payments();
        Ok(payment)
    }

    /// Settle a pending payment. When the enrollment's paid total now covers
    /// the course price, a pending enrollment is confirmed in the same step.
    pub async fn record_paid(&self, id: Uuid) -> Result<PaymentRecord, AdminPaymentError> {
        let payment = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminPaymentError::NotFound)?;
        if payment.status != PaymentStatus::Pending {
            return Err(AdminPaymentError::AlreadySettled);
        }

        let now = OffsetDateTime::now_utc();
        let payment = self
            .writer
            .update_payment_status(UpdatePaymentStatusParams {
                id,
                status: PaymentStatus::Paid,
                paid_at: Some(now),
            })
            .await?;
        self.invalidate_payments();

        self.try_confirm_enrollment(payment.enrollment_id).await?;
        Ok(payment)
    }

    pub async fn record_failed(&self, id: Uuid) -> Result<PaymentRecord, AdminPaymentError> {
        let payment = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminPaymentError::NotFound)?;
        if payment.status != PaymentStatus::Pending {
            return Err(AdminPaymentError::AlreadySettled);
        }

        let payment = self
            .writer
            .update_payment_status(UpdatePaymentStatusParams {
                id,
                status: PaymentStatus::Failed,
                paid_at: None,
            })
            .await?;
        self.invalidate_payments();
        Ok(payment)
    }

    /// Idempotent: deleting an id that no longer exists is a success.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminPaymentError> {
        self.writer.delete_payment(id).await?;
        self.invalidate_payments();
        Ok(())
    }

    async fn try_confirm_enrollment(&self, enrollment_id: Uuid) -> Result<(), AdminPaymentError> {
        let Some(enrollment) = self.enrollments.find_by_id(enrollment_id).await? else {
            return Ok(());
        };
        if enrollment.status != EnrollmentStatus::Pending {
            return Ok(());
        }

        let Some(intake) = self.intakes.find_by_id(enrollment.intake_id).await? else {
            return Ok(());
        };
        let Some(course) = self.courses.find_by_id(intake.course_id).await? else {
            return Ok(());
        };

        let paid = self
            .reader
            .total_paid_for_enrollment(enrollment_id)
            .await?;
        if paid < course.price_cents {
            return Ok(());
        }

        self.enrollments_writer
            .update_enrollment(UpdateEnrollmentParams {
                id: enrollment_id,
                status: EnrollmentStatus::Confirmed,
                note: enrollment.note,
            })
            .await?;
        if let Some(cache) = &self.enrollment_cache {
            cache.invalidate();
        }
        Ok(())
    }

    fn invalidate_payments(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}
