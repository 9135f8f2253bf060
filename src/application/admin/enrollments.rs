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
    CoursesRepo, CreateEnrollmentParams, EnrollmentsRepo, EnrollmentsWriteRepo, IntakesRepo,
    PaymentsRepo, RepoError, UpdateEnrollmentParams, UsersRepo,
};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::EnrollmentRecord;
use crate::domain::types::EnrollmentStatus;

pub const ENROLLMENT_LIST_SPEC: ListSpec = ListSpec {
    resource: "enrollments",
    sort_fields: &[
        SortField {
            name: "created_at",
            column: "e.created_at",
        },
        SortField {
            name: "updated_at",
            column: "e.updated_at",
        },
        SortField {
            name: "status",
            column: "e.status",
        },
    ],
    filter_fields: &[
        FilterField {
            name: "intake_id",
            column: "e.intake_id",
            kind: FieldKind::Uuid,
        },
        FilterField {
            name: "user_id",
            column: "e.user_id",
            kind: FieldKind::Uuid,
        },
        FilterField {
            name: "status",
            column: "e.status::text",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "created_at",
            column: "e.created_at",
            kind: FieldKind::Timestamp,
        },
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
    max_page_size: 100,
};

#[derive(Debug, Error)]
pub enum AdminEnrollmentError {
    #[error("enrollment not found")]
    NotFound,
    #[error("intake does not exist")]
    UnknownIntake,
    #[error("user does not exist")]
    UnknownUser,
    #[error("enrollment deadline has passed")]
    DeadlinePassed,
    #[error("intake is at capacity ({capacity})")]
    AtCapacity { capacity: i32 },
    #[error("enrollment is not awaiting confirmation")]
    NotPending,
    #[error("confirmed requires a paid payment covering the course price")]
    Unpaid,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateEnrollmentCommand {
    pub intake_id: Uuid,
    pub user_id: Uuid,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct AdminEnrollmentService {
    reader: Arc<dyn EnrollmentsRepo>,
    writer: Arc<dyn EnrollmentsWriteRepo>,
    intakes: Arc<dyn IntakesRepo>,
    courses: Arc<dyn CoursesRepo>,
    users: Arc<dyn UsersRepo>,
    payments: Arc<dyn PaymentsRepo>,
    cache: Option<Arc<ResourceCache<EnrollmentRecord>>>,
}

impl AdminEnrollmentService {
    pub fn new(
        reader: Arc<dyn EnrollmentsRepo>,
        writer: Arc<dyn EnrollmentsWriteRepo>,
        intakes: Arc<dyn IntakesRepo>,
        courses: Arc<dyn CoursesRepo>,
        users: Arc<dyn UsersRepo>,
        payments: Arc<dyn PaymentsRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            intakes,
            courses,
            users,
            payments,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResourceCache<EnrollmentRecord>>>) -> Self {
        self.cache = cache;
        self
    }

    pub async fn list(&self, query: &ListQuery) -> ListResult<EnrollmentRecord> {
        let validated = match ENROLLMENT_LIST_SPEC.validate(query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::Enrollments, query);
        let reader = self.reader.clone();
        cached_list(
            self.cache.as_ref().map(|cache| &cache.lists),
            key,
            move || async move {
                let rows = reader
                    .list_enrollments(&validated)
                    .await
                    .map_err(|err| report_fetch_error("enrollments", "list", &err))?;
                let total = reader
                    .count_enrollments(&validated.predicates)
                    .await
                    .map_err(|err| report_fetch_error("enrollments", "count", &err))?;
                Ok(ListPage { rows, total })
            },
        )
        .await
    }

    pub async fn detail(&self, id: &str) -> DetailResult<EnrollmentRecord> {
        let parsed = match parse_detail_id(id) {
            Ok(parsed) => parsed,
            Err(message) => return DetailResult::failure(codes::VALIDATION_ERROR, message),
        };
        let Some(enrollment_id) = parsed else {
            return DetailResult::ok(None);
        };

        let key = QueryKey::detail(Resource::Enrollments, id);
        let reader = self.reader.clone();
        cached_detail(
            self.cache.as_ref().map(|cache| &cache.details),
            key,
            "enrollment",
            move || async move {
                reader
                    .find_by_id(enrollment_id)
                    .await
                    .map_err(|err| report_fetch_error("enrollments", "fetch", &err))
            },
        )
        .await
    }

    /// Enroll a user into an intake. Refused after the intake's enrollment
    /// deadline or once pending + confirmed enrollments fill its capacity.
    pub async fn create(
        &self,
        command: CreateEnrollmentCommand,
    ) -> Result<EnrollmentRecord, AdminEnrollmentError> {
        let intake = self
            .intakes
            .find_by_id(command.intake_id)
            .await?
            .ok_or(AdminEnrollmentError::UnknownIntake)?;

        self.users
            .find_by_id(command.user_id)
            .await?
            .ok_or(AdminEnrollmentError::UnknownUser)?;

        let today = OffsetDateTime::now_utc().date();
        if today > intake.enrollment_deadline {
            return Err(AdminEnrollmentError::DeadlinePassed);
        }

        let active = self
            .intakes
            .count_active_enrollments(command.intake_id)
            .await?;
        if active >= intake.capacity as u64 {
            return Err(AdminEnrollmentError::AtCapacity {
                capacity: intake.capacity,
            });
        }

        let enrollment = self
            .writer
            .create_enrollment(CreateEnrollmentParams {
                intake_id: command.intake_id,
                user_id: command.user_id,
                status: EnrollmentStatus::Pending,
                note: command.note,
            })
            .await?;

        self.invalidate();
        Ok(enrollment)
    }

    /// Confirm a pending enrollment. Requires paid payments covering the
    /// course price.
    pub async fn confirm(&self, id: Uuid) -> Result<EnrollmentRecord, AdminEnrollmentError> {
        let enrollment = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminEnrollmentError::NotFound)?;
        if enrollment.status != EnrollmentStatus::Pending {
            return Err(AdminEnrollmentError::NotPending);
        }

        let intake = self
            .intakes
            .find_by_id(enrollment.intake_id)
            .await?
            .ok_or(AdminEnrollmentError::UnknownIntake)?;
        let course = self
            .courses
            .find_by_id(intake.course_id)
            .await?
            .ok_or(AdminEnrollmentError::Repo(RepoError::NotFound))?;

        let paid = self.payments.total_paid_for_enrollment(id).await?;
        if paid < course.price_cents {
            return Err(AdminEnrollmentError::Unpaid);
        }

        self.transition(id, EnrollmentStatus::Confirmed, enrollment.note)
            .await
    }

    pub async fn cancel(
        &self,
        id: Uuid,
        note: Option<String>,
    ) -> Result<EnrollmentRecord, AdminEnrollmentError> {
        let enrollment = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminEnrollmentError::NotFound)?;
        self.transition(id, EnrollmentStatus::Cancelled, note.or(enrollment.note))
            .await
    }

    pub async fn complete(&self, id: Uuid) -> Result<EnrollmentRecord, AdminEnrollmentError> {
        let enrollment = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminEnrollmentError::NotFound)?;
        self.transition(id, EnrollmentStatus::Completed, enrollment.note)
            .await
    }

    /// Idempotent: deleting an id that no longer exists is a success.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminEnrollmentError> {
        self.writer.delete_enrollment(id).await?;
        self.invalidate();
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        status: EnrollmentStatus,
        note: Option<String>,
    ) -> Result<EnrollmentRecord, AdminEnrollmentError> {
        let enrollment = self
            .writer
            .update_enrollment(UpdateEnrollmentParams { id, status, note })
            .await?;
        self.invalidate();
        Ok(enrollment)
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::Duration;
    use time::macros::date;

    use super::*;
    use crate::application::listing::{Predicate, ValidatedListQuery};
    use crate::domain::entities::{CourseRecord, IntakeRecord, UserRecord};
    use crate::domain::types::{CourseLevel, UserRole};

    struct StubIntakesRepo {
        intake: Option<IntakeRecord>,
        active: u64,
    }

    #[async_trait]
    impl IntakesRepo for StubIntakesRepo {
        async fn list_intakes(
            &self,
            _query: &ValidatedListQuery,
        ) -> Result<Vec<IntakeRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_intakes(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn list_for_course(&self, _course_id: Uuid) -> Result<Vec<IntakeRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<IntakeRecord>, RepoError> {
            Ok(self.intake.clone().filter(|intake| intake.id == id))
        }

        async fn count_active_enrollments(&self, _id: Uuid) -> Result<u64, RepoError> {
            Ok(self.active)
        }
    }

    struct StubCoursesRepo {
        course: Option<CourseRecord>,
    }

    #[async_trait]
    impl CoursesRepo for StubCoursesRepo {
        async fn list_courses(
            &self,
            _query: &ValidatedListQuery,
        ) -> Result<Vec<CourseRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_courses(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<CourseRecord>, RepoError> {
            Ok(self.course.clone().filter(|course| course.id == id))
        }

        async fn find_by_slug(&self, _slug: &str) -> Result<Option<CourseRecord>, RepoError> {
            Ok(None)
        }

        async fn count_published(&self) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    struct StubUsersRepo {
        user: Option<UserRecord>,
    }

    #[async_trait]
    impl UsersRepo for StubUsersRepo {
        async fn list_users(
            &self,
            _query: &ValidatedListQuery,
        ) -> Result<Vec<UserRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_users(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
            Ok(self.user.clone().filter(|user| user.id == id))
        }

        async fn find_by_email(&self, _email: &str) -> Result<Option<UserRecord>, RepoError> {
            Ok(None)
        }
    }

    struct StubPaymentsRepo {
        paid_cents: i64,
    }

    #[async_trait]
    impl PaymentsRepo for StubPaymentsRepo {
        async fn list_payments(
            &self,
            _query: &ValidatedListQuery,
        ) -> Result<Vec<crate::domain::entities::PaymentRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_payments(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn find_by_id(
            &self,
            _id: Uuid,
        ) -> Result<Option<crate::domain::entities::PaymentRecord>, RepoError> {
            Ok(None)
        }

        async fn total_paid_for_enrollment(
            &self,
            _enrollment_id: Uuid,
        ) -> Result<i64, RepoError> {
            Ok(self.paid_cents)
        }

        async fn sum_paid_cents(&self) -> Result<i64, RepoError> {
            Ok(self.paid_cents)
        }
    }

    #[derive(Default)]
    struct RecordingEnrollmentsRepo {
        enrollment: Option<EnrollmentRecord>,
        created: Mutex<Vec<CreateEnrollmentParams>>,
        updated: Mutex<Vec<UpdateEnrollmentParams>>,
    }

    #[async_trait]
    impl EnrollmentsRepo for RecordingEnrollmentsRepo {
        async fn list_enrollments(
            &self,
            _query: &ValidatedListQuery,
        ) -> Result<Vec<EnrollmentRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_enrollments(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, RepoError> {
            Ok(self
                .enrollment
                .clone()
                .filter(|enrollment| enrollment.id == id))
        }

        async fn count_by_status(&self, _status: EnrollmentStatus) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    #[async_trait]
    impl EnrollmentsWriteRepo for RecordingEnrollmentsRepo {
        async fn create_enrollment(
            &self,
            params: CreateEnrollmentParams,
        ) -> Result<EnrollmentRecord, RepoError> {
            self.created.lock().unwrap().push(params.clone());
            Ok(sample_enrollment(
                Uuid::new_v4(),
                params.intake_id,
                params.user_id,
                params.status,
            ))
        }

        async fn update_enrollment(
            &self,
            params: UpdateEnrollmentParams,
        ) -> Result<EnrollmentRecord, RepoError> {
            self.updated.lock().unwrap().push(params.clone());
            Ok(sample_enrollment(
                params.id,
                Uuid::new_v4(),
                Uuid::new_v4(),
                params.status,
            ))
        }

        async fn delete_enrollment(&self, _id: Uuid) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn sample_intake(id: Uuid, course_id: Uuid, capacity: i32, deadline_offset_days: i64) -> IntakeRecord {
        let today = OffsetDateTime::now_utc().date();
        IntakeRecord {
            id,
            course_id,
            name: "2026 Autumn".to_string(),
            starts_on: date!(2099 - 09 - 01),
            ends_on: date!(2099 - 12 - 01),
            capacity,
            enrollment_deadline: today
                .checked_add(Duration::days(deadline_offset_days))
                .expect("valid date"),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn sample_course(id: Uuid, price_cents: i64) -> CourseRecord {
        CourseRecord {
            id,
            slug: "intro".to_string(),
            title: "Intro".to_string(),
            summary: String::new(),
            description: String::new(),
            category_id: Uuid::new_v4(),
            level: CourseLevel::Beginner,
            price_cents,
            duration_weeks: 8,
            published: true,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn sample_user(id: Uuid) -> UserRecord {
        UserRecord {
            id,
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            phone: None,
            role: UserRole::User,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn sample_enrollment(
        id: Uuid,
        intake_id: Uuid,
        user_id: Uuid,
        status: EnrollmentStatus,
    ) -> EnrollmentRecord {
        EnrollmentRecord {
            id,
            intake_id,
            user_id,
            status,
            note: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    struct Fixture {
        service: AdminEnrollmentService,
        repo: Arc<RecordingEnrollmentsRepo>,
    }

    fn fixture(
        intake: Option<IntakeRecord>,
        active: u64,
        course: Option<CourseRecord>,
        user: Option<UserRecord>,
        paid_cents: i64,
        enrollment: Option<EnrollmentRecord>,
    ) -> Fixture {
        let repo = Arc::new(RecordingEnrollmentsRepo {
            enrollment,
            ..RecordingEnrollmentsRepo::default()
        });
        let service = AdminEnrollmentService::new(
            repo.clone(),
            repo.clone(),
            Arc::new(StubIntakesRepo { intake, active }),
            Arc::new(StubCoursesRepo { course }),
            Arc::new(StubUsersRepo { user }),
            Arc::new(StubPaymentsRepo { paid_cents }),
        );
        Fixture { service, repo }
    }

    #[tokio::test]
    async fn create_rejects_past_deadline() {
        let intake_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let fixture = fixture(
            Some(sample_intake(intake_id, Uuid::new_v4(), 20, -1)),
            0,
            None,
            Some(sample_user(user_id)),
            0,
            None,
        );

        let err = fixture
            .service
            .create(CreateEnrollmentCommand {
                intake_id,
                user_id,
                note: None,
            })
            .await
            .expect_err("deadline passed");
        assert!(matches!(err, AdminEnrollmentError::DeadlinePassed));
        assert!(fixture.repo.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_full_intake() {
        let intake_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let fixture = fixture(
            Some(sample_intake(intake_id, Uuid::new_v4(), 2, 30)),
            2,
            None,
            Some(sample_user(user_id)),
            0,
            None,
        );

        let err = fixture
            .service
            .create(CreateEnrollmentCommand {
                intake_id,
                user_id,
                note: None,
            })
            .await
            .expect_err("at capacity");
        assert!(matches!(
            err,
            AdminEnrollmentError::AtCapacity { capacity: 2 }
        ));
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let intake_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let fixture = fixture(
            Some(sample_intake(intake_id, Uuid::new_v4(), 20, 30)),
            3,
            None,
            Some(sample_user(user_id)),
            0,
            None,
        );

        let enrollment = fixture
            .service
            .create(CreateEnrollmentCommand {
                intake_id,
                user_id,
                note: Some("walk-in".to_string()),
            })
            .await
            .expect("created");

        assert_eq!(enrollment.status, EnrollmentStatus::Pending);
        assert_eq!(fixture.repo.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confirm_requires_full_payment() {
        let course_id = Uuid::new_v4();
        let intake_id = Uuid::new_v4();
        let enrollment_id = Uuid::new_v4();
        let fixture = fixture(
            Some(sample_intake(intake_id, course_id, 20, 30)),
            0,
            Some(sample_course(course_id, 50_000)),
            None,
            20_000,
            Some(sample_enrollment(
                enrollment_id,
                intake_id,
                Uuid::new_v4(),
                EnrollmentStatus::Pending,
            )),
        );

        let err = fixture
            .service
            .confirm(enrollment_id)
            .await
            .expect_err("unpaid");
        assert!(matches!(err, AdminEnrollmentError::Unpaid));
        assert!(fixture.repo.updated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_succeeds_when_paid() {
        let course_id = Uuid::new_v4();
        let intake_id = Uuid::new_v4();
        let enrollment_id = Uuid::new_v4();
        let fixture = fixture(
            Some(sample_intake(intake_id, course_id, 20, 30)),
            0,
            Some(sample_course(course_id, 50_000)),
            None,
            50_000,
            Some(sample_enrollment(
                enrollment_id,
                intake_id,
                Uuid::new_v4(),
                EnrollmentStatus::Pending,
            )),
        );

        let enrollment = fixture
            .service
            .confirm(enrollment_id)
            .await
            .expect("confirmed");
        assert_eq!(enrollment.status, EnrollmentStatus::Confirmed);
    }

    #[tokio::test]
    async fn confirm_rejects_non_pending() {
        let intake_id = Uuid::new_v4();
        let enrollment_id = Uuid::new_v4();
        let fixture = fixture(
            Some(sample_intake(intake_id, Uuid::new_v4(), 20, 30)),
            0,
            None,
            None,
            0,
            Some(sample_enrollment(
                enrollment_id,
                intake_id,
                Uuid::new_v4(),
                EnrollmentStatus::Cancelled,
            )),
        );

        let err = fixture
            .service
            .confirm(enrollment_id)
            .await
            .expect_err("not pending");
        assert!(matches!(err, AdminEnrollmentError::NotPending));
    }
}
