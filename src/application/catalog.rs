//! Public catalog services: published courses, categories, intakes, and
//! contact-request submission.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::admin::courses::COURSE_LIST_SPEC;
use crate::application::admin::{cached_list, report_fetch_error};
use crate::application::listing::{
    FieldFilter, FilterOp, ListPage, ListQuery, ListResult, SortOrder, codes,
};
use crate::application::repos::{
    CategoriesRepo, CategoryWithCount, ContactRequestsWriteRepo, CoursesRepo,
    CreateContactRequestParams, IntakesRepo, RepoError,
};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::{ContactRequestRecord, CourseRecord, IntakeRecord};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid {0}")]
    Validation(&'static str),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Public list parameters; always scoped to published courses.
#[derive(Debug, Clone, Default)]
pub struct CatalogCourseQuery {
    pub page: u32,
    pub page_size: u32,
    pub category_id: Option<Uuid>,
    pub level: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitContactCommand {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
}

#[derive(Clone)]
pub struct CatalogService {
    courses: Arc<dyn CoursesRepo>,
    categories: Arc<dyn CategoriesRepo>,
    intakes: Arc<dyn IntakesRepo>,
    contacts: Arc<dyn ContactRequestsWriteRepo>,
    course_cache: Option<Arc<ResourceCache<CourseRecord>>>,
}

impl CatalogService {
    pub fn new(
        courses: Arc<dyn CoursesRepo>,
        categories: Arc<dyn CategoriesRepo>,
        intakes: Arc<dyn IntakesRepo>,
        contacts: Arc<dyn ContactRequestsWriteRepo>,
    ) -> Self {
        Self {
            courses,
            categories,
            intakes,
            contacts,
            course_cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResourceCache<CourseRecord>>>) -> Self {
        self.course_cache = cache;
        self
    }

    /// Published-course listing for the marketing site. Shares the courses
    /// cache namespace with the back office, so admin writes invalidate
    /// public pages too.
    pub async fn published_courses(&self, params: &CatalogCourseQuery) -> ListResult<CourseRecord> {
        let query = Self::build_query(params);
        let validated = match COURSE_LIST_SPEC.validate(&query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::Courses, &query);
        let reader = self.courses.clone();
        cached_list(
            self.course_cache.as_ref().map(|cache| &cache.lists),
            key,
            move || async move {
                let rows = reader
                    .list_courses(&validated)
                    .await
                    .map_err(|err| report_fetch_error("courses", "list", &err))?;
                let total = reader
                    .count_courses(&validated.predicates)
                    .await
                    .map_err(|err| report_fetch_error("courses", "count", &err))?;
                Ok(ListPage { rows, total })
            },
        )
        .await
    }

    /// Published course lookup by slug, with its upcoming intakes.
    pub async fn course_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<(CourseRecord, Vec<IntakeRecord>)>, CatalogError> {
        let Some(course) = self.courses.find_by_slug(slug).await? else {
            return Ok(None);
        };
        if !course.published {
            return Ok(None);
        }

        let intakes = self.intakes.list_for_course(course.id).await?;
        Ok(Some((course, intakes)))
    }

    pub async fn categories_with_counts(&self) -> Result<Vec<CategoryWithCount>, CatalogError> {
        self.categories
            .list_with_counts()
            .await
            .map_err(CatalogError::from)
    }

    /// Store a contact request from the public site. Notification delivery
    /// is a collaborator concern; persistence alone is the contract here.
    pub async fn submit_contact_request(
        &self,
        command: SubmitContactCommand,
    ) -> Result<ContactRequestRecord, CatalogError> {
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(CatalogError::Validation("name"));
        }

        let email = command.email.trim().to_ascii_lowercase();
        if !email.contains('@') || email.len() < 3 {
            return Err(CatalogError::Validation("email"));
        }

        let message = command.message.trim().to_string();
        if message.is_empty() {
            return Err(CatalogError::Validation("message"));
        }

        let phone = command.phone.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });

        self.contacts
            .create_contact_request(CreateContactRequestParams {
                name,
                email,
                phone,
                message,
            })
            .await
            .map_err(CatalogError::from)
    }

    fn build_query(params: &CatalogCourseQuery) -> ListQuery {
        let mut filters = vec![FieldFilter::new("published", FilterOp::Equals, "true")];
        if let Some(category_id) = params.category_id {
            filters.push(FieldFilter::new(
                "category_id",
                FilterOp::Equals,
                category_id.to_string(),
            ));
        }
        if let Some(level) = params.level.as_deref() {
            filters.push(FieldFilter::new("level", FilterOp::Equals, level));
        }
        if let Some(search) = params.search.as_deref() {
            filters.push(FieldFilter::new("title", FilterOp::Contains, search));
        }

        ListQuery {
            page: params.page.max(1),
            page_size: if params.page_size == 0 {
                COURSE_LIST_SPEC.default_query().page_size
            } else {
                params.page_size
            },
            sort_by: "created_at".to_string(),
            order: SortOrder::Desc,
            filters,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::application::listing::{BindValue, Predicate, ValidatedListQuery};
    use crate::domain::types::CourseLevel;

    #[derive(Default)]
    struct RecordingCoursesRepo {
        course: Option<CourseRecord>,
        seen_predicates: Mutex<Vec<Predicate>>,
    }

    #[async_trait]
    impl CoursesRepo for RecordingCoursesRepo {
        async fn list_courses(
            &self,
            query: &ValidatedListQuery,
        ) -> Result<Vec<CourseRecord>, RepoError> {
            *self.seen_predicates.lock().unwrap() = query.predicates.clone();
            Ok(Vec::new())
        }

        async fn count_courses(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<CourseRecord>, RepoError> {
            Ok(None)
        }

        async fn find_by_slug(&self, slug: &str) -> Result<Option<CourseRecord>, RepoError> {
            Ok(self.course.clone().filter(|course| course.slug == slug))
        }

        async fn count_published(&self) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    struct StubCategoriesRepo;

    #[async_trait]
    impl CategoriesRepo for StubCategoriesRepo {
        async fn list_categories(
            &self,
            _query: &ValidatedListQuery,
        ) -> Result<Vec<crate::domain::entities::CategoryRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_categories(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, RepoError> {
            Ok(Vec::new())
        }

        async fn find_by_id(
            &self,
            _id: Uuid,
        ) -> Result<Option<crate::domain::entities::CategoryRecord>, RepoError> {
            Ok(None)
        }

        async fn find_by_slug(
            &self,
            _slug: &str,
        ) -> Result<Option<crate::domain::entities::CategoryRecord>, RepoError> {
            Ok(None)
        }

        async fn count_course_usage(&self, _id: Uuid) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    struct StubIntakesRepo {
        intakes: Vec<IntakeRecord>,
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
            Ok(self.intakes.clone())
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<IntakeRecord>, RepoError> {
            Ok(None)
        }

        async fn count_active_enrollments(&self, _id: Uuid) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct RecordingContactsWriter {
        created: Mutex<Vec<CreateContactRequestParams>>,
    }

    #[async_trait]
    impl ContactRequestsWriteRepo for RecordingContactsWriter {
        async fn create_contact_request(
            &self,
            params: CreateContactRequestParams,
        ) -> Result<ContactRequestRecord, RepoError> {
            self.created.lock().unwrap().push(params.clone());
            Ok(ContactRequestRecord {
                id: Uuid::new_v4(),
                name: params.name,
                email: params.email,
                phone: params.phone,
                message: params.message,
                status: crate::domain::types::ContactStatus::New,
                handled_at: None,
                created_at: OffsetDateTime::now_utc(),
            })
        }

        async fn mark_handled(
            &self,
            _id: Uuid,
            _handled_at: OffsetDateTime,
        ) -> Result<ContactRequestRecord, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn delete_contact_request(&self, _id: Uuid) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn sample_course(slug: &str, published: bool) -> CourseRecord {
        CourseRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: "Intro".to_string(),
            summary: String::new(),
            description: String::new(),
            category_id: Uuid::new_v4(),
            level: CourseLevel::Beginner,
            price_cents: 10_000,
            duration_weeks: 8,
            published,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn service(courses: Arc<RecordingCoursesRepo>) -> CatalogService {
        CatalogService::new(
            courses,
            Arc::new(StubCategoriesRepo),
            Arc::new(StubIntakesRepo {
                intakes: Vec::new(),
            }),
            Arc::new(RecordingContactsWriter::default()),
        )
    }

    #[tokio::test]
    async fn published_listing_always_scopes_to_published() {
        let courses = Arc::new(RecordingCoursesRepo::default());
        let service = service(courses.clone());

        let result = service
            .published_courses(&CatalogCourseQuery {
                page: 1,
                page_size: 12,
                search: Some("rust".to_string()),
                ..CatalogCourseQuery::default()
            })
            .await;
        assert!(result.success);

        let predicates = courses.seen_predicates.lock().unwrap();
        assert!(predicates.iter().any(|predicate| {
            predicate.column == "c.published" && predicate.value == BindValue::Boolean(true)
        }));
        assert!(predicates.iter().any(|predicate| {
            predicate.column == "c.title" && predicate.op == FilterOp::Contains
        }));
    }

    #[tokio::test]
    async fn unpublished_course_is_hidden_from_slug_lookup() {
        let courses = Arc::new(RecordingCoursesRepo {
            course: Some(sample_course("hidden-course", false)),
            seen_predicates: Mutex::new(Vec::new()),
        });
        let service = service(courses);

        let found = service
            .course_by_slug("hidden-course")
            .await
            .expect("lookup");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn contact_request_requires_plausible_email() {
        let courses = Arc::new(RecordingCoursesRepo::default());
        let service = service(courses);

        let err = service
            .submit_contact_request(SubmitContactCommand {
                name: "Noa".to_string(),
                email: "nope".to_string(),
                phone: None,
                message: "Hello".to_string(),
            })
            .await
            .expect_err("bad email");
        assert!(matches!(err, CatalogError::Validation("email")));
    }

    #[tokio::test]
    async fn contact_request_is_persisted_normalized() {
        let contacts = Arc::new(RecordingContactsWriter::default());
        let service = CatalogService::new(
            Arc::new(RecordingCoursesRepo::default()),
            Arc::new(StubCategoriesRepo),
            Arc::new(StubIntakesRepo {
                intakes: Vec::new(),
            }),
            contacts.clone(),
        );

        service
            .submit_contact_request(SubmitContactCommand {
                name: "  Noa ".to_string(),
                email: "Noa@Example.com".to_string(),
                phone: Some("".to_string()),
                message: " When does the next intake start? ".to_string(),
            })
            .await
            .expect("stored");

        let created = contacts.created.lock().unwrap();
        assert_eq!(created[0].name, "Noa");
        assert_eq!(created[0].email, "noa@example.com");
        assert!(created[0].phone.is_none());
    }
}
