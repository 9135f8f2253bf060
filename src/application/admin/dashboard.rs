use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::application::repos::{
    ContactRequestsRepo, CoursesRepo, EnrollmentsRepo, PaymentsRepo, RefundsRepo, RepoError,
};
use crate::domain::types::{ContactStatus, EnrollmentStatus, RefundStatus};

#[derive(Debug, Error)]
pub enum AdminDashboardError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentCounts {
    pub pending: u64,
    pub confirmed: u64,
    pub cancelled: u64,
    pub completed: u64,
}

/// Headline figures for the back-office landing panel.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub courses_total: u64,
    pub courses_published: u64,
    pub enrollments: EnrollmentCounts,
    pub revenue_cents: i64,
    pub refunds_awaiting_review: u64,
    pub unhandled_contact_requests: u64,
}

#[derive(Clone)]
pub struct AdminDashboardService {
    courses: Arc<dyn CoursesRepo>,
    enrollments: Arc<dyn EnrollmentsRepo>,
    payments: Arc<dyn PaymentsRepo>,
    refunds: Arc<dyn RefundsRepo>,
    contacts: Arc<dyn ContactRequestsRepo>,
}

impl AdminDashboardService {
    pub fn new(
        courses: Arc<dyn CoursesRepo>,
        enrollments: Arc<dyn EnrollmentsRepo>,
        payments: Arc<dyn PaymentsRepo>,
        refunds: Arc<dyn RefundsRepo>,
        contacts: Arc<dyn ContactRequestsRepo>,
    ) -> Self {
        Self {
            courses,
            enrollments,
            payments,
            refunds,
            contacts,
        }
    }

    pub async fn summary(&self) -> Result<DashboardSummary, AdminDashboardError> {
        let courses_total = self.courses.count_courses(&[]).await?;
        let courses_published = self.courses.count_published().await?;

        let enrollments = EnrollmentCounts {
            pending: self
                .enrollments
                .count_by_status(EnrollmentStatus::Pending)
                .await?,
            confirmed: self
                .enrollments
                .count_by_status(EnrollmentStatus::Confirmed)
                .await?,
            cancelled: self
                .enrollments
                .count_by_status(EnrollmentStatus::Cancelled)
                .await?,
            completed: self
                .enrollments
                .count_by_status(EnrollmentStatus::Completed)
                .await?,
        };

        let revenue_cents = self.payments.sum_paid_cents().await?;
        let refunds_awaiting_review = self
            .refunds
            .count_by_status(RefundStatus::Requested)
            .await?;
        let unhandled_contact_requests = self
            .contacts
            .count_by_status(ContactStatus::New)
            .await?;

        Ok(DashboardSummary {
            courses_total,
            courses_published,
            enrollments,
            revenue_cents,
            refunds_awaiting_review,
            unhandled_contact_requests,
        })
    }
}
