//! In-memory repository stubs shared by the router-level tests that must run
//! without a database: every data-layer call is counted, so tests can assert
//! that guard failures abort before any executor side effect.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use enrolla::application::admin::{
    categories::AdminCategoryService, contacts::AdminContactService, courses::AdminCourseService,
    dashboard::AdminDashboardService, enrollments::AdminEnrollmentService,
    intakes::AdminIntakeService, payments::AdminPaymentService, refunds::AdminRefundService,
    users::AdminUserService,
};
use enrolla::application::auth::AuthService;
use enrolla::application::listing::{Predicate, SortOrder, ValidatedListQuery};
use enrolla::cache::AppCaches;
use enrolla::infra::http::RateLimiter;
use enrolla::application::repos::{
    CategoriesRepo, CategoriesWriteRepo, CategoryWithCount, ContactRequestsRepo,
    ContactRequestsWriteRepo, CoursesRepo, CoursesWriteRepo, CreateCategoryParams,
    CreateContactRequestParams, CreateCourseParams, CreateEnrollmentParams, CreateIntakeParams,
    CreatePaymentParams, CreateRefundParams, CreateSessionParams, CreateUserParams,
    EnrollmentsRepo, EnrollmentsWriteRepo, IntakesRepo, IntakesWriteRepo, PaymentsRepo,
    PaymentsWriteRepo, RefundsRepo, RefundsWriteRepo, RepoError, SessionsRepo, UpdateCategoryParams,
    UpdateCourseParams, UpdateEnrollmentParams, UpdateIntakeParams, UpdatePaymentStatusParams,
    UpdateRefundStatusParams, UpdateUserParams, UsersRepo, UsersWriteRepo,
};
use enrolla::domain::entities::{
    CategoryRecord, ContactRequestRecord, CourseRecord, EnrollmentRecord, IntakeRecord,
    PaymentRecord, RefundRecord, SessionRecord, UserRecord,
};
use enrolla::domain::types::{
    ContactStatus, CourseLevel, EnrollmentStatus, RefundStatus, UserRole,
};

/// One stub standing in for every repository trait. Session resolution is
/// excluded from the data-call count: the auth guard is allowed to run, the
/// executors behind it are not.
#[derive(Default)]
pub struct StubRepositories {
    pub courses: Mutex<Vec<CourseRecord>>,
    pub categories: Mutex<Vec<CategoryRecord>>,
    pub sessions: Mutex<Vec<SessionRecord>>,
    pub session_role: Mutex<Option<UserRole>>,
    pub data_calls: AtomicUsize,
}

impl StubRepositories {
    pub fn with_courses(rows: Vec<CourseRecord>) -> Self {
        Self {
            courses: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn sample_course(slug: &str, minutes_ago: i64, published: bool) -> CourseRecord {
    let now = OffsetDateTime::now_utc();
    CourseRecord {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        title: format!("Course {slug}"),
        summary: "A course".to_string(),
        description: "Full outline".to_string(),
        category_id: Uuid::new_v4(),
        level: CourseLevel::Beginner,
        price_cents: 49_900,
        duration_weeks: 8,
        published,
        created_at: now - time::Duration::minutes(minutes_ago),
        updated_at: now,
    }
}

pub fn sample_user(role: UserRole) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        name: "Dana".to_string(),
        email: format!("dana-{}@example.com", Uuid::new_v4().simple()),
        phone: None,
        role,
        created_at: OffsetDateTime::now_utc(),
        updated_at: OffsetDateTime::now_utc(),
    }
}

fn unsupported<T>(op: &'static str) -> Result<T, RepoError> {
    Err(RepoError::InvalidInput {
        message: format!("stub repository does not support {op}"),
    })
}

#[async_trait]
impl CoursesRepo for StubRepositories {
    async fn list_courses(&self, query: &ValidatedListQuery) -> Result<Vec<CourseRecord>, RepoError> {
        self.touch();
        let mut rows = self.courses.lock().unwrap().clone();
        rows.sort_by(|a, b| match query.order {
            SortOrder::Asc => a.created_at.cmp(&b.created_at),
            SortOrder::Desc => b.created_at.cmp(&a.created_at),
        });
        Ok(rows
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect())
    }

    async fn count_courses(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
        self.touch();
        Ok(self.courses.lock().unwrap().len() as u64)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CourseRecord>, RepoError> {
        self.touch();
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .find(|course| course.id == id)
            .cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CourseRecord>, RepoError> {
        self.touch();
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .find(|course| course.slug == slug)
            .cloned())
    }

    async fn count_published(&self) -> Result<u64, RepoError> {
        self.touch();
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .filter(|course| course.published)
            .count() as u64)
    }
}

#[async_trait]
impl CoursesWriteRepo for StubRepositories {
    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError> {
        self.touch();
        let now = OffsetDateTime::now_utc();
        let course = CourseRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            title: params.title,
            summary: params.summary,
            description: params.description,
            category_id: params.category_id,
            level: params.level,
            price_cents: params.price_cents,
            duration_weeks: params.duration_weeks,
            published: params.published,
            created_at: now,
            updated_at: now,
        };
        self.courses.lock().unwrap().push(course.clone());
        Ok(course)
    }

    async fn update_course(&self, params: UpdateCourseParams) -> Result<CourseRecord, RepoError> {
        self.touch();
        let mut courses = self.courses.lock().unwrap();
        let course = courses
            .iter_mut()
            .find(|course| course.id == params.id)
            .ok_or(RepoError::NotFound)?;
        course.title = params.title;
        course.summary = params.summary;
        course.description = params.description;
        course.category_id = params.category_id;
        course.level = params.level;
        course.price_cents = params.price_cents;
        course.duration_weeks = params.duration_weeks;
        course.published = params.published;
        course.updated_at = OffsetDateTime::now_utc();
        Ok(course.clone())
    }

    async fn delete_course(&self, id: Uuid) -> Result<(), RepoError> {
        self.touch();
        self.courses.lock().unwrap().retain(|course| course.id != id);
        Ok(())
    }
}

#[async_trait]
impl CategoriesRepo for StubRepositories {
    async fn list_categories(
        &self,
        _query: &ValidatedListQuery,
    ) -> Result<Vec<CategoryRecord>, RepoError> {
        self.touch();
        Ok(self.categories.lock().unwrap().clone())
    }

    async fn count_categories(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
        self.touch();
        Ok(self.categories.lock().unwrap().len() as u64)
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, RepoError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
        self.touch();
        Ok(self
            .categories
            .lock()
            .unwrap()
            .iter()
            .find(|category| category.id == id)
            .cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CategoryRecord>, RepoError> {
        self.touch();
        Ok(self
            .categories
            .lock()
            .unwrap()
            .iter()
            .find(|category| category.slug == slug)
            .cloned())
    }

    async fn count_course_usage(&self, _id: Uuid) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }
}

#[async_trait]
impl CategoriesWriteRepo for StubRepositories {
    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        self.touch();
        let now = OffsetDateTime::now_utc();
        let category = CategoryRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            name: params.name,
            description: params.description,
            created_at: now,
            updated_at: now,
        };
        self.categories.lock().unwrap().push(category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        self.touch();
        let mut categories = self.categories.lock().unwrap();
        let category = categories
            .iter_mut()
            .find(|category| category.id == params.id)
            .ok_or(RepoError::NotFound)?;
        category.slug = params.slug;
        category.name = params.name;
        category.description = params.description;
        category.updated_at = OffsetDateTime::now_utc();
        Ok(category.clone())
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), RepoError> {
        self.touch();
        self.categories
            .lock()
            .unwrap()
            .retain(|category| category.id != id);
        Ok(())
    }
}

#[async_trait]
impl IntakesRepo for StubRepositories {
    async fn list_intakes(&self, _query: &ValidatedListQuery) -> Result<Vec<IntakeRecord>, RepoError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn count_intakes(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }

    async fn list_for_course(&self, _course_id: Uuid) -> Result<Vec<IntakeRecord>, RepoError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<IntakeRecord>, RepoError> {
        self.touch();
        Ok(None)
    }

    async fn count_active_enrollments(&self, _id: Uuid) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }
}

#[async_trait]
impl IntakesWriteRepo for StubRepositories {
    async fn create_intake(&self, _params: CreateIntakeParams) -> Result<IntakeRecord, RepoError> {
        self.touch();
        unsupported("create_intake")
    }

    async fn update_intake(&self, _params: UpdateIntakeParams) -> Result<IntakeRecord, RepoError> {
        self.touch();
        unsupported("update_intake")
    }

    async fn delete_intake(&self, _id: Uuid) -> Result<(), RepoError> {
        self.touch();
        Ok(())
    }
}

#[async_trait]
impl UsersRepo for StubRepositories {
    async fn list_users(&self, _query: &ValidatedListQuery) -> Result<Vec<UserRecord>, RepoError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn count_users(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        self.touch();
        Ok(None)
    }

    async fn find_by_email(&self, _email: &str) -> Result<Option<UserRecord>, RepoError> {
        self.touch();
        Ok(None)
    }
}

#[async_trait]
impl UsersWriteRepo for StubRepositories {
    async fn create_user(&self, _params: CreateUserParams) -> Result<UserRecord, RepoError> {
        self.touch();
        unsupported("create_user")
    }

    async fn update_user(&self, _params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        self.touch();
        unsupported("update_user")
    }

    async fn delete_user(&self, _id: Uuid) -> Result<(), RepoError> {
        self.touch();
        Ok(())
    }
}

#[async_trait]
impl EnrollmentsRepo for StubRepositories {
    async fn list_enrollments(
        &self,
        _query: &ValidatedListQuery,
    ) -> Result<Vec<EnrollmentRecord>, RepoError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn count_enrollments(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<EnrollmentRecord>, RepoError> {
        self.touch();
        Ok(None)
    }

    async fn count_by_status(&self, _status: EnrollmentStatus) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }
}

#[async_trait]
impl EnrollmentsWriteRepo for StubRepositories {
    async fn create_enrollment(
        &self,
        _params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        self.touch();
        unsupported("create_enrollment")
    }

    async fn update_enrollment(
        &self,
        _params: UpdateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        self.touch();
        unsupported("update_enrollment")
    }

    async fn delete_enrollment(&self, _id: Uuid) -> Result<(), RepoError> {
        self.touch();
        Ok(())
    }
}

#[async_trait]
impl PaymentsRepo for StubRepositories {
    async fn list_payments(
        &self,
        _query: &ValidatedListQuery,
    ) -> Result<Vec<PaymentRecord>, RepoError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn count_payments(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<PaymentRecord>, RepoError> {
        self.touch();
        Ok(None)
    }

    async fn total_paid_for_enrollment(&self, _enrollment_id: Uuid) -> Result<i64, RepoError> {
        self.touch();
        Ok(0)
    }

    async fn sum_paid_cents(&self) -> Result<i64, RepoError> {
        self.touch();
        Ok(0)
    }
}

#[async_trait]
impl PaymentsWriteRepo for StubRepositories {
    async fn create_payment(&self, _params: CreatePaymentParams) -> Result<PaymentRecord, RepoError> {
        self.touch();
        unsupported("create_payment")
    }

    async fn update_payment_status(
        &self,
        _params: UpdatePaymentStatusParams,
    ) -> Result<PaymentRecord, RepoError> {
        self.touch();
        unsupported("update_payment_status")
    }

    async fn delete_payment(&self, _id: Uuid) -> Result<(), RepoError> {
        self.touch();
        Ok(())
    }
}

#[async_trait]
impl RefundsRepo for StubRepositories {
    async fn list_refunds(&self, _query: &ValidatedListQuery) -> Result<Vec<RefundRecord>, RepoError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn count_refunds(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<RefundRecord>, RepoError> {
        self.touch();
        Ok(None)
    }

    async fn total_refunded_for_payment(&self, _payment_id: Uuid) -> Result<i64, RepoError> {
        self.touch();
        Ok(0)
    }

    async fn count_by_status(&self, _status: RefundStatus) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }
}

#[async_trait]
impl RefundsWriteRepo for StubRepositories {
    async fn create_refund(&self, _params: CreateRefundParams) -> Result<RefundRecord, RepoError> {
        self.touch();
        unsupported("create_refund")
    }

    async fn update_refund_status(
        &self,
        _params: UpdateRefundStatusParams,
    ) -> Result<RefundRecord, RepoError> {
        self.touch();
        unsupported("update_refund_status")
    }

    async fn delete_refund(&self, _id: Uuid) -> Result<(), RepoError> {
        self.touch();
        Ok(())
    }
}

#[async_trait]
impl ContactRequestsRepo for StubRepositories {
    async fn list_contact_requests(
        &self,
        _query: &ValidatedListQuery,
    ) -> Result<Vec<ContactRequestRecord>, RepoError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn count_contact_requests(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<ContactRequestRecord>, RepoError> {
        self.touch();
        Ok(None)
    }

    async fn count_by_status(&self, _status: ContactStatus) -> Result<u64, RepoError> {
        self.touch();
        Ok(0)
    }
}

#[async_trait]
impl ContactRequestsWriteRepo for StubRepositories {
    async fn create_contact_request(
        &self,
        params: CreateContactRequestParams,
    ) -> Result<ContactRequestRecord, RepoError> {
        self.touch();
        Ok(ContactRequestRecord {
            id: Uuid::new_v4(),
            name: params.name,
            email: params.email,
            phone: params.phone,
            message: params.message,
            status: ContactStatus::New,
            handled_at: None,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    async fn mark_handled(
        &self,
        _id: Uuid,
        _handled_at: OffsetDateTime,
    ) -> Result<ContactRequestRecord, RepoError> {
        self.touch();
        unsupported("mark_handled")
    }

    async fn delete_contact_request(&self, _id: Uuid) -> Result<(), RepoError> {
        self.touch();
        Ok(())
    }
}

#[async_trait]
impl SessionsRepo for StubRepositories {
    async fn create_session(&self, params: CreateSessionParams) -> Result<SessionRecord, RepoError> {
        let role = self.session_role.lock().unwrap().unwrap_or(UserRole::User);
        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            role,
            token_prefix: params.token_prefix,
            hashed_secret: params.hashed_secret,
            expires_at: params.expires_at,
            revoked_at: None,
            last_seen_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.sessions.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|session| session.token_prefix == prefix)
            .cloned())
    }

    async fn revoke_session(&self, id: Uuid, revoked_at: OffsetDateTime) -> Result<(), RepoError> {
        for session in self.sessions.lock().unwrap().iter_mut() {
            if session.id == id {
                session.revoked_at = Some(revoked_at);
            }
        }
        Ok(())
    }

    async fn revoke_sessions_for_user(
        &self,
        user_id: Uuid,
        revoked_at: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        let mut revoked = 0;
        for session in self.sessions.lock().unwrap().iter_mut() {
            if session.user_id == user_id && session.revoked_at.is_none() {
                session.revoked_at = Some(revoked_at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn update_last_seen(&self, _id: Uuid, _seen_at: OffsetDateTime) -> Result<(), RepoError> {
        Ok(())
    }
}

pub fn future_date(days: i64) -> Date {
    (OffsetDateTime::now_utc() + time::Duration::days(days)).date()
}

/// Operator token accepted as a bootstrap admin session in router tests.
pub const OPERATOR_TOKEN: &str = "integration-operator-token";

/// Build a full back-office state over the stub repositories, optionally
/// reading through the provided cache set.
pub fn admin_state(
    repos: &Arc<StubRepositories>,
    caches: Option<&AppCaches>,
) -> enrolla::infra::http::AdminState {
    let categories_repo: Arc<dyn CategoriesRepo> = repos.clone();
    let categories_write_repo: Arc<dyn CategoriesWriteRepo> = repos.clone();
    let courses_repo: Arc<dyn CoursesRepo> = repos.clone();
    let courses_write_repo: Arc<dyn CoursesWriteRepo> = repos.clone();
    let intakes_repo: Arc<dyn IntakesRepo> = repos.clone();
    let intakes_write_repo: Arc<dyn IntakesWriteRepo> = repos.clone();
    let users_repo: Arc<dyn UsersRepo> = repos.clone();
    let users_write_repo: Arc<dyn UsersWriteRepo> = repos.clone();
    let enrollments_repo: Arc<dyn EnrollmentsRepo> = repos.clone();
    let enrollments_write_repo: Arc<dyn EnrollmentsWriteRepo> = repos.clone();
    let payments_repo: Arc<dyn PaymentsRepo> = repos.clone();
    let payments_write_repo: Arc<dyn PaymentsWriteRepo> = repos.clone();
    let refunds_repo: Arc<dyn RefundsRepo> = repos.clone();
    let refunds_write_repo: Arc<dyn RefundsWriteRepo> = repos.clone();
    let contacts_repo: Arc<dyn ContactRequestsRepo> = repos.clone();
    let contacts_write_repo: Arc<dyn ContactRequestsWriteRepo> = repos.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repos.clone();

    let auth = AuthService::new(sessions_repo).with_bootstrap_admin_token(Some(OPERATOR_TOKEN));

    enrolla::infra::http::AdminState {
        auth,
        rate_limiter: Arc::new(RateLimiter::new(
            std::time::Duration::from_secs(60),
            10_000,
        )),
        dashboard: AdminDashboardService::new(
            courses_repo.clone(),
            enrollments_repo.clone(),
            payments_repo.clone(),
            refunds_repo.clone(),
            contacts_repo.clone(),
        ),
        categories: AdminCategoryService::new(categories_repo.clone(), categories_write_repo)
            .with_cache(caches.map(|caches| caches.categories.clone())),
        courses: AdminCourseService::new(courses_repo.clone(), courses_write_repo, categories_repo)
            .with_cache(caches.map(|caches| caches.courses.clone())),
        intakes: AdminIntakeService::new(
            intakes_repo.clone(),
            intakes_write_repo,
            courses_repo.clone(),
        )
        .with_cache(caches.map(|caches| caches.intakes.clone())),
        users: AdminUserService::new(users_repo.clone(), users_write_repo)
            .with_cache(caches.map(|caches| caches.users.clone())),
        enrollments: AdminEnrollmentService::new(
            enrollments_repo.clone(),
            enrollments_write_repo.clone(),
            intakes_repo.clone(),
            courses_repo.clone(),
            users_repo,
            payments_repo.clone(),
        )
        .with_cache(caches.map(|caches| caches.enrollments.clone())),
        payments: AdminPaymentService::new(
            payments_repo.clone(),
            payments_write_repo,
            enrollments_repo,
            enrollments_write_repo,
            intakes_repo,
            courses_repo,
        )
        .with_caches(
            caches.map(|caches| caches.payments.clone()),
            caches.map(|caches| caches.enrollments.clone()),
        ),
        refunds: AdminRefundService::new(refunds_repo, refunds_write_repo, payments_repo)
            .with_cache(caches.map(|caches| caches.refunds.clone())),
        contacts: AdminContactService::new(contacts_repo, contacts_write_repo)
            .with_cache(caches.map(|caches| caches.contact_requests.clone())),
    }
}
