use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::admin::{cached_detail, cached_list, parse_detail_id, report_fetch_error};
use crate::application::listing::{
    DetailResult, FieldKind, FilterField, ListPage, ListQuery, ListResult, ListSpec, SortField,
    SortOrder, codes,
};
use crate::application::repos::{
    CategoriesRepo, CoursesRepo, CoursesWriteRepo, CreateCourseParams, RepoError,
    UpdateCourseParams,
};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::CourseRecord;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async};
use crate::domain::types::CourseLevel;

pub const COURSE_LIST_SPEC: ListSpec = ListSpec {
    resource: "courses",
    sort_fields: &[
        SortField {
            name: "created_at",
            column: "c.created_at",
        },
        SortField {
            name: "updated_at",
            column: "c.updated_at",
        },
        SortField {
            name: "title",
            column: "c.title",
        },
        SortField {
            name: "price_cents",
            column: "c.price_cents",
        },
        SortField {
            name: "duration_weeks",
            column: "c.duration_weeks",
        },
    ],
    filter_fields: &[
        FilterField {
            name: "title",
            column: "c.title",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "slug",
            column: "c.slug",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "category_id",
            column: "c.category_id",
            kind: FieldKind::Uuid,
        },
        FilterField {
            name: "level",
            column: "c.level::text",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "published",
            column: "c.published",
            kind: FieldKind::Boolean,
        },
        FilterField {
            name: "price_cents",
            column: "c.price_cents",
            kind: FieldKind::Integer,
        },
        FilterField {
            name: "created_at",
            column: "c.created_at",
            kind: FieldKind::Timestamp,
        },
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
    max_page_size: 100,
};

#[derive(Debug, Error)]
pub enum AdminCourseError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("course not found")]
    NotFound,
    #[error("category does not exist")]
    UnknownCategory,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateCourseCommand {
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
pub struct UpdateCourseCommand {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub category_id: Uuid,
    pub level: CourseLevel,
    pub price_cents: i64,
    pub duration_weeks: i32,
    pub published: bool,
}

#[derive(Clone)]
pub struct AdminCourseService {
    reader: Arc<dyn CoursesRepo>,
    writer: Arc<dyn CoursesWriteRepo>,
    categories: Arc<dyn CategoriesRepo>,
    cache: Option<Arc<ResourceCache<CourseRecord>>>,
}

impl AdminCourseService {
    pub fn new(
        reader: Arc<dyn CoursesRepo>,
        writer: Arc<dyn CoursesWriteRepo>,
        categories: Arc<dyn CategoriesRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            categories,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResourceCache<CourseRecord>>>) -> Self {
        self.cache = cache;
        self
    }

    pub async fn list(&self, query: &ListQuery) -> ListResult<CourseRecord> {
        let validated = match COURSE_LIST_SPEC.validate(query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::Courses, query);
        let reader = self.reader.clone();
        cached_list(
            self.cache.as_ref().map(|cache| &cache.lists),
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

    pub async fn detail(&self, id: &str) -> DetailResult<CourseRecord> {
        let parsed = match parse_detail_id(id) {
            Ok(parsed) => parsed,
            Err(message) => return DetailResult::failure(codes::VALIDATION_ERROR, message),
        };
        let Some(course_id) = parsed else {
            // Reserved empty-id placeholder for not-yet-created records.
            return DetailResult::ok(None);
        };

        let key = QueryKey::detail(Resource::Courses, id);
        let reader = self.reader.clone();
        cached_detail(
            self.cache.as_ref().map(|cache| &cache.details),
            key,
            "course",
            move || async move {
                reader
                    .find_by_id(course_id)
                    .await
                    .map_err(|err| report_fetch_error("courses", "fetch", &err))
            },
        )
        .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CourseRecord>, AdminCourseError> {
        self.reader
            .find_by_id(id)
            .await
            .map_err(AdminCourseError::from)
    }

    pub async fn create(
        &self,
        command: CreateCourseCommand,
    ) -> Result<CourseRecord, AdminCourseError> {
        let title = command.title.trim().to_string();
        ensure_non_empty(&title, "title")?;
        validate_numbers(command.price_cents, command.duration_weeks)?;

        self.categories
            .find_by_id(command.category_id)
            .await?
            .ok_or(AdminCourseError::UnknownCategory)?;

        let slug = self.unique_slug(&title).await?;

        let course = self
            .writer
            .create_course(CreateCourseParams {
                slug,
                title,
                summary: command.summary.trim().to_string(),
                description: command.description,
                category_id: command.category_id,
                level: command.level,
                price_cents: command.price_cents,
                duration_weeks: command.duration_weeks,
                published: command.published,
            })
            .await?;

        self.invalidate();
        Ok(course)
    }

    pub async fn update(
        &self,
        command: UpdateCourseCommand,
    ) -> Result<CourseRecord, AdminCourseError> {
        let title = command.title.trim().to_string();
        ensure_non_empty(&title, "title")?;
        validate_numbers(command.price_cents, command.duration_weeks)?;

        let existing = self
            .reader
            .find_by_id(command.id)
            .await?
            .ok_or(AdminCourseError::NotFound)?;

        self.categories
            .find_by_id(command.category_id)
            .await?
            .ok_or(AdminCourseError::UnknownCategory)?;

        let course = self
            .writer
            .update_course(UpdateCourseParams {
                id: command.id,
                slug: existing.slug,
                title,
                summary: command.summary.trim().to_string(),
                description: command.description,
                category_id: command.category_id,
                level: command.level,
                price_cents: command.price_cents,
                duration_weeks: command.duration_weeks,
                published: command.published,
            })
            .await?;

        self.invalidate();
        Ok(course)
    }

    pub async fn set_published(
        &self,
        id: Uuid,
        published: bool,
    ) -> Result<CourseRecord, AdminCourseError> {
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminCourseError::NotFound)?;

        self.update(UpdateCourseCommand {
            id,
            title: existing.title,
            summary: existing.summary,
            description: existing.description,
            category_id: existing.category_id,
            level: existing.level,
            price_cents: existing.price_cents,
            duration_weeks: existing.duration_weeks,
            published,
        })
        .await
    }

    /// Idempotent: deleting an id that no longer exists is a success.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminCourseError> {
        self.writer.delete_course(id).await?;
        self.invalidate();
        Ok(())
    }

    async fn unique_slug(&self, title: &str) -> Result<String, AdminCourseError> {
        let reader = self.reader.clone();
        match generate_unique_slug_async(title, move |candidate| {
            let reader = reader.clone();
            let candidate = candidate.to_string();
            async move {
                reader
                    .find_by_slug(&candidate)
                    .await
                    .map(|existing| existing.is_none())
            }
        })
        .await
        {
            Ok(slug) => Ok(slug),
            Err(SlugAsyncError::Slug(err)) => match err {
                SlugError::EmptyInput | SlugError::Unrepresentable { .. } => {
                    Err(AdminCourseError::ConstraintViolation("title"))
                }
                SlugError::Exhausted { .. } => Err(AdminCourseError::ConstraintViolation("slug")),
            },
            Err(SlugAsyncError::Predicate(err)) => Err(AdminCourseError::Repo(err)),
        }
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}

fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), AdminCourseError> {
    if value.trim().is_empty() {
        return Err(AdminCourseError::ConstraintViolation(field));
    }
    Ok(())
}

fn validate_numbers(price_cents: i64, duration_weeks: i32) -> Result<(), AdminCourseError> {
    if price_cents < 0 {
        return Err(AdminCourseError::ConstraintViolation("price_cents"));
    }
    if duration_weeks < 1 {
        return Err(AdminCourseError::ConstraintViolation("duration_weeks"));
    }
    Ok(())
}
