//! Repository traits describing persistence adapters.
//!
//! List methods only accept a [`ValidatedListQuery`]; the allow-list
//! validation in `application::listing` is the single gate between request
//! input and SQL.

use async_trait::async_trait;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::application::listing::{Predicate, ValidatedListQuery};
use crate::domain::entities::{
    CategoryRecord, ContactRequestRecord, CourseRecord, EnrollmentRecord, IntakeRecord,
    PaymentRecord, RefundRecord, SessionRecord, UserRecord,
};
use crate::domain::types::{
    ContactStatus, CourseLevel, EnrollmentStatus, PaymentMethod, PaymentStatus, RefundStatus,
    UserRole,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

// ----------------------------------------------------------------------------
// Categories
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateCategoryParams {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateCategoryParams {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
}

/// A category together with its published-course count, for the public
/// catalog sidebar.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoryWithCount {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub course_count: i64,
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list_categories(&self, query: &ValidatedListQuery)
    -> Result<Vec<CategoryRecord>, RepoError>;
    async fn count_categories(&self, predicates: &[Predicate]) -> Result<u64, RepoError>;
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<CategoryRecord>, RepoError>;
    async fn count_course_usage(&self, id: Uuid) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait CategoriesWriteRepo: Send + Sync {
    async fn create_category(&self, params: CreateCategoryParams)
    -> Result<CategoryRecord, RepoError>;
    async fn update_category(&self, params: UpdateCategoryParams)
    -> Result<CategoryRecord, RepoError>;
    async fn delete_category(&self, id: Uuid) -> Result<(), RepoError>;
}

// ----------------------------------------------------------------------------
// Courses
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateCourseParams {
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub category_id: Uuid,
    pub level: CourseLevel,
    pub price_cents: i64,
    pub duration_weeks: i32,
    pub published: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateCourseParams {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub category_id: Uuid,
    pub level: CourseLevel,
    pub price_cents: i64,
    pub duration_weeks: i32,
    pub published: bool,
}

#[async_trait]
pub trait CoursesRepo: Send + Sync {
    async fn list_courses(&self, query: &ValidatedListQuery) -> Result<Vec<CourseRecord>, RepoError>;
    async fn count_courses(&self, predicates: &[Predicate]) -> Result<u64, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CourseRecord>, RepoError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<CourseRecord>, RepoError>;
    async fn count_published(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait CoursesWriteRepo: Send + Sync {
    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError>;
    async fn update_course(&self, params: UpdateCourseParams) -> Result<CourseRecord, RepoError>;
    async fn delete_course(&self, id: Uuid) -> Result<(), RepoError>;
}

// ----------------------------------------------------------------------------
// Intakes
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateIntakeParams {
    pub course_id: Uuid,
    pub name: String,
    pub starts_on: Date,
    pub ends_on: Date,
    pub capacity: i32,
    pub enrollment_deadline: Date,
}

#[derive(Debug, Clone)]
pub struct UpdateIntakeParams {
    pub id: Uuid,
    pub name: String,
    pub starts_on: Date,
    pub ends_on: Date,
    pub capacity: i32,
    pub enrollment_deadline: Date,
}

#[async_trait]
pub trait IntakesRepo: Send + Sync {
    async fn list_intakes(&self, query: &ValidatedListQuery) -> Result<Vec<IntakeRecord>, RepoError>;
    async fn count_intakes(&self, predicates: &[Predicate]) -> Result<u64, RepoError>;
    async fn list_for_course(&self, course_id: Uuid) -> Result<Vec<IntakeRecord>, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<IntakeRecord>, RepoError>;
    /// Enrollments counting against capacity: pending + confirmed.
    async fn count_active_enrollments(&self, id: Uuid) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait IntakesWriteRepo: Send + Sync {
    async fn create_intake(&self, params: CreateIntakeParams) -> Result<IntakeRecord, RepoError>;
    async fn update_intake(&self, params: UpdateIntakeParams) -> Result<IntakeRecord, RepoError>;
    async fn delete_intake(&self, id: Uuid) -> Result<(), RepoError>;
}

// ----------------------------------------------------------------------------
// Users
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct UpdateUserParams {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn list_users(&self, query: &ValidatedListQuery) -> Result<Vec<UserRecord>, RepoError>;
    async fn count_users(&self, predicates: &[Predicate]) -> Result<u64, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;
}

#[async_trait]
pub trait UsersWriteRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;
    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), RepoError>;
}

// ----------------------------------------------------------------------------
// Enrollments
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateEnrollmentParams {
    pub intake_id: Uuid,
    pub user_id: Uuid,
    pub status: EnrollmentStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateEnrollmentParams {
    pub id: Uuid,
    pub status: EnrollmentStatus,
    pub note: Option<String>,
}

#[async_trait]
pub trait EnrollmentsRepo: Send + Sync {
    async fn list_enrollments(
        &self,
        query: &ValidatedListQuery,
    ) -> Result<Vec<EnrollmentRecord>, RepoError>;
    async fn count_enrollments(&self, predicates: &[Predicate]) -> Result<u64, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, RepoError>;
    async fn count_by_status(&self, status: EnrollmentStatus) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait EnrollmentsWriteRepo: Send + Sync {
    async fn create_enrollment(
        &self,
        params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError>;
    async fn update_enrollment(
        &self,
        params: UpdateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError>;
    async fn delete_enrollment(&self, id: Uuid) -> Result<(), RepoError>;
}

// ----------------------------------------------------------------------------
// Payments
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreatePaymentParams {
    pub enrollment_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub paid_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct UpdatePaymentStatusParams {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub paid_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait PaymentsRepo: Send + Sync {
    async fn list_payments(&self, query: &ValidatedListQuery)
    -> Result<Vec<PaymentRecord>, RepoError>;
    async fn count_payments(&self, predicates: &[Predicate]) -> Result<u64, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, RepoError>;
    /// Sum of `paid` payments recorded against an enrollment.
    async fn total_paid_for_enrollment(&self, enrollment_id: Uuid) -> Result<i64, RepoError>;
    async fn sum_paid_cents(&self) -> Result<i64, RepoError>;
}

#[async_trait]
pub trait PaymentsWriteRepo: Send + Sync {
    async fn create_payment(&self, params: CreatePaymentParams) -> Result<PaymentRecord, RepoError>;
    async fn update_payment_status(
        &self,
        params: UpdatePaymentStatusParams,
    ) -> Result<PaymentRecord, RepoError>;
    async fn delete_payment(&self, id: Uuid) -> Result<(), RepoError>;
}

// ----------------------------------------------------------------------------
// Refunds
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateRefundParams {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
    pub status: RefundStatus,
}

#[derive(Debug, Clone)]
pub struct UpdateRefundStatusParams {
    pub id: Uuid,
    pub status: RefundStatus,
    pub processed_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait RefundsRepo: Send + Sync {
    async fn list_refunds(&self, query: &ValidatedListQuery) -> Result<Vec<RefundRecord>, RepoError>;
    async fn count_refunds(&self, predicates: &[Predicate]) -> Result<u64, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefundRecord>, RepoError>;
    /// Sum of refunds already requested/approved/processed for a payment.
    async fn total_refunded_for_payment(&self, payment_id: Uuid) -> Result<i64, RepoError>;
    async fn count_by_status(&self, status: RefundStatus) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait RefundsWriteRepo: Send + Sync {
    async fn create_refund(&self, params: CreateRefundParams) -> Result<RefundRecord, RepoError>;
    async fn update_refund_status(
        &self,
        params: UpdateRefundStatusParams,
    ) -> Result<RefundRecord, RepoError>;
    async fn delete_refund(&self, id: Uuid) -> Result<(), RepoError>;
}

// ----------------------------------------------------------------------------
// Contact requests
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateContactRequestParams {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
}

#[async_trait]
pub trait ContactRequestsRepo: Send + Sync {
    async fn list_contact_requests(
        &self,
        query: &ValidatedListQuery,
    ) -> Result<Vec<ContactRequestRecord>, RepoError>;
    async fn count_contact_requests(&self, predicates: &[Predicate]) -> Result<u64, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactRequestRecord>, RepoError>;
    async fn count_by_status(&self, status: ContactStatus) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ContactRequestsWriteRepo: Send + Sync {
    async fn create_contact_request(
        &self,
        params: CreateContactRequestParams,
    ) -> Result<ContactRequestRecord, RepoError>;
    async fn mark_handled(
        &self,
        id: Uuid,
        handled_at: OffsetDateTime,
    ) -> Result<ContactRequestRecord, RepoError>;
    async fn delete_contact_request(&self, id: Uuid) -> Result<(), RepoError>;
}

// ----------------------------------------------------------------------------
// Sessions
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub user_id: Uuid,
    pub token_prefix: String,
    pub hashed_secret: Vec<u8>,
    pub expires_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn create_session(&self, params: CreateSessionParams)
    -> Result<SessionRecord, RepoError>;
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError>;
    async fn revoke_session(&self, id: Uuid, revoked_at: OffsetDateTime) -> Result<(), RepoError>;
    async fn revoke_sessions_for_user(
        &self,
        user_id: Uuid,
        revoked_at: OffsetDateTime,
    ) -> Result<u64, RepoError>;
    async fn update_last_seen(&self, id: Uuid, seen_at: OffsetDateTime) -> Result<(), RepoError>;
}
