use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::admin::{cached_detail, cached_list, parse_detail_id, report_fetch_error};
use crate::application::listing::{
    DetailResult, FieldKind, FilterField, ListPage, ListQuery, ListResult, ListSpec, SortField,
    SortOrder, codes,
};
use crate::application::repos::{
    CategoriesRepo, CategoriesWriteRepo, CreateCategoryParams, RepoError, UpdateCategoryParams,
};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::CategoryRecord;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async};

pub const CATEGORY_LIST_SPEC: ListSpec = ListSpec {
    resource: "categories",
    sort_fields: &[
        SortField {
            name: "name",
            column: "cat.name",
        },
        SortField {
            name: "created_at",
            column: "cat.created_at",
        },
        SortField {
            name: "updated_at",
            column: "cat.updated_at",
        },
    ],
    filter_fields: &[
        FilterField {
            name: "name",
            column: "cat.name",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "slug",
            column: "cat.slug",
            kind: FieldKind::Text,
        },
    ],
    default_sort: "name",
    default_order: SortOrder::Asc,
    max_page_size: 100,
};

#[derive(Debug, Error)]
pub enum AdminCategoryError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("category not found")]
    NotFound,
    #[error("category is referenced by {count} courses")]
    InUse { count: u64 },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateCategoryCommand {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateCategoryCommand {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct AdminCategoryService {
    reader: Arc<dyn CategoriesRepo>,
    writer: Arc<dyn CategoriesWriteRepo>,
    cache: Option<Arc<ResourceCache<CategoryRecord>>>,
}

impl AdminCategoryService {
    pub fn new(reader: Arc<dyn CategoriesRepo>, writer: Arc<dyn CategoriesWriteRepo>) -> Self {
        Self {
            reader,
            writer,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResourceCache<CategoryRecord>>>) -> Self {
        self.cache = cache;
        self
    }

    pub async fn list(&self, query: &ListQuery) -> ListResult<CategoryRecord> {
        let validated = match CATEGORY_LIST_SPEC.validate(query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::Categories, query);
        let reader = self.reader.clone();
        cached_list(
            self.cache.as_ref().map(|cache| &cache.lists),
            key,
            move || async move {
                let rows = reader
                    .list_categories(&validated)
                    .await
                    .map_err(|err| report_fetch_error("categories", "list", &err))?;
                let total = reader
                    .count_categories(&validated.predicates)
                    .await
                    .map_err(|err| report_fetch_error("categories", "count", &err))?;
                Ok(ListPage { rows, total })
            },
        )
        .await
    }

    pub async fn detail(&self, id: &str) -> DetailResult<CategoryRecord> {
        let parsed = match parse_detail_id(id) {
            Ok(parsed) => parsed,
            Err(message) => return DetailResult::failure(codes::VALIDATION_ERROR, message),
        };
        let Some(category_id) = parsed else {
            return DetailResult::ok(None);
        };

        let key = QueryKey::detail(Resource::Categories, id);
        let reader = self.reader.clone();
        cached_detail(
            self.cache.as_ref().map(|cache| &cache.details),
            key,
            "category",
            move || async move {
                reader
                    .find_by_id(category_id)
                    .await
                    .map_err(|err| report_fetch_error("categories", "fetch", &err))
            },
        )
        .await
    }

    pub async fn create(
        &self,
        command: CreateCategoryCommand,
    ) -> Result<CategoryRecord, AdminCategoryError> {
        let name = command.name.trim().to_string();
        ensure_non_empty(&name, "name")?;
        let description = normalize_optional(command.description);

        let slug = self.unique_slug(&name).await?;

        let category = self
            .writer
            .create_category(CreateCategoryParams {
                slug,
                name,
                description,
            })
            .await?;

        self.invalidate();
        Ok(category)
    }

    pub async fn update(
        &self,
        command: UpdateCategoryCommand,
    ) -> Result<CategoryRecord, AdminCategoryError> {
        let name = command.name.trim().to_string();
        ensure_non_empty(&name, "name")?;
        let description = normalize_optional(command.description);

        let existing = self
            .reader
            .find_by_id(command.id)
            .await?
            .ok_or(AdminCategoryError::NotFound)?;

        let category = self
            .writer
            .update_category(UpdateCategoryParams {
                id: command.id,
                slug: existing.slug,
                name,
                description,
            })
            .await?;

        self.invalidate();
        Ok(category)
    }

    /// Deleting a referenced category is refused; deleting an absent one is
    /// an idempotent success.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminCategoryError> {
        let usage = self.reader.count_course_usage(id).await?;
        if usage > 0 {
            return Err(AdminCategoryError::InUse { count: usage });
        }

        self.writer.delete_category(id).await?;
        self.invalidate();
        Ok(())
    }

    async fn unique_slug(&self, name: &str) -> Result<String, AdminCategoryError> {
        let reader = self.reader.clone();
        match generate_unique_slug_async(name, move |candidate| {
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
                    Err(AdminCategoryError::ConstraintViolation("name"))
                }
                SlugError::Exhausted { .. } => Err(AdminCategoryError::ConstraintViolation("slug")),
            },
            Err(SlugAsyncError::Predicate(err)) => Err(AdminCategoryError::Repo(err)),
        }
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}

fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), AdminCategoryError> {
    if value.trim().is_empty() {
        return Err(AdminCategoryError::ConstraintViolation(field));
    }
    Ok(())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::application::listing::{Predicate, ValidatedListQuery};
    use crate::application::repos::CategoryWithCount;

    struct StubCategoriesRepo {
        usage: u64,
        record: Option<CategoryRecord>,
    }

    #[async_trait]
    impl CategoriesRepo for StubCategoriesRepo {
        async fn list_categories(
            &self,
            _query: &ValidatedListQuery,
        ) -> Result<Vec<CategoryRecord>, RepoError> {
            Ok(self.record.clone().into_iter().collect())
        }

        async fn count_categories(&self, _predicates: &[Predicate]) -> Result<u64, RepoError> {
            Ok(self.record.iter().count() as u64)
        }

        async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, RepoError> {
            Ok(Vec::new())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
            Ok(self.record.clone().filter(|category| category.id == id))
        }

        async fn find_by_slug(&self, slug: &str) -> Result<Option<CategoryRecord>, RepoError> {
            Ok(self.record.clone().filter(|category| category.slug == slug))
        }

        async fn count_course_usage(&self, _id: Uuid) -> Result<u64, RepoError> {
            Ok(self.usage)
        }
    }

    #[derive(Default)]
    struct RecordingCategoriesWriter {
        deleted: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl CategoriesWriteRepo for RecordingCategoriesWriter {
        async fn create_category(
            &self,
            params: CreateCategoryParams,
        ) -> Result<CategoryRecord, RepoError> {
            Ok(sample_category(Uuid::new_v4(), &params.slug))
        }

        async fn update_category(
            &self,
            params: UpdateCategoryParams,
        ) -> Result<CategoryRecord, RepoError> {
            Ok(sample_category(params.id, &params.slug))
        }

        async fn delete_category(&self, id: Uuid) -> Result<(), RepoError> {
            self.deleted.lock().unwrap().push(id);
            Ok(())
        }
    }

    fn sample_category(id: Uuid, slug: &str) -> CategoryRecord {
        CategoryRecord {
            id,
            slug: slug.to_string(),
            name: "Programming".to_string(),
            description: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn delete_rejects_category_in_use() {
        let id = Uuid::new_v4();
        let service = AdminCategoryService::new(
            Arc::new(StubCategoriesRepo {
                usage: 5,
                record: Some(sample_category(id, "programming")),
            }),
            Arc::new(RecordingCategoriesWriter::default()),
        );

        let err = service.delete(id).await.expect_err("in use");
        match err {
            AdminCategoryError::InUse { count } => assert_eq!(count, 5),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_of_unused_category_succeeds() {
        let id = Uuid::new_v4();
        let writer = Arc::new(RecordingCategoriesWriter::default());
        let service = AdminCategoryService::new(
            Arc::new(StubCategoriesRepo {
                usage: 0,
                record: Some(sample_category(id, "programming")),
            }),
            writer.clone(),
        );

        service.delete(id).await.expect("deleted");
        assert_eq!(writer.deleted.lock().unwrap().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn create_trims_and_slugs_the_name() {
        let writer = Arc::new(RecordingCategoriesWriter::default());
        let service = AdminCategoryService::new(
            Arc::new(StubCategoriesRepo {
                usage: 0,
                record: None,
            }),
            writer,
        );

        let category = service
            .create(CreateCategoryCommand {
                name: "  Data Engineering  ".to_string(),
                description: Some("   ".to_string()),
            })
            .await
            .expect("created");

        assert_eq!(category.slug, "data-engineering");
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let service = AdminCategoryService::new(
            Arc::new(StubCategoriesRepo {
                usage: 0,
                record: None,
            }),
            Arc::new(RecordingCategoriesWriter::default()),
        );

        let err = service
            .create(CreateCategoryCommand {
                name: "   ".to_string(),
                description: None,
            })
            .await
            .expect_err("blank name");
        assert!(matches!(err, AdminCategoryError::ConstraintViolation("name")));
    }
}
