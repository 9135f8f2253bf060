use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::admin::{cached_detail, cached_list, parse_detail_id, report_fetch_error};
use crate::application::listing::{
    DetailResult, FieldKind, FilterField, ListPage, ListQuery, ListResult, ListSpec, SortField,
    SortOrder, codes,
};
use crate::application::repos::{
    CreateUserParams, RepoError, UpdateUserParams, UsersRepo, UsersWriteRepo,
};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::UserRecord;
use crate::domain::types::UserRole;

pub const USER_LIST_SPEC: ListSpec = ListSpec {
    resource: "users",
    sort_fields: &[
        SortField {
            name: "created_at",
            column: "u.created_at",
        },
        SortField {
            name: "name",
            column: "u.name",
        },
        SortField {
            name: "email",
            column: "u.email",
        },
    ],
    filter_fields: &[
        FilterField {
            name: "name",
            column: "u.name",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "email",
            column: "u.email",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "role",
            column: "u.role::text",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "created_at",
            column: "u.created_at",
            kind: FieldKind::Timestamp,
        },
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
    max_page_size: 100,
};

#[derive(Debug, Error)]
pub enum AdminUserError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("user not found")]
    NotFound,
    #[error("a user with this email already exists")]
    DuplicateEmail,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateUserCommand {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct UpdateUserCommand {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Clone)]
pub struct AdminUserService {
    reader: Arc<dyn UsersRepo>,
    writer: Arc<dyn UsersWriteRepo>,
    cache: Option<Arc<ResourceCache<UserRecord>>>,
}

impl AdminUserService {
    pub fn new(reader: Arc<dyn UsersRepo>, writer: Arc<dyn UsersWriteRepo>) -> Self {
        Self {
            reader,
            writer,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResourceCache<UserRecord>>>) -> Self {
        self.cache = cache;
        self
    }

    pub async fn list(&self, query: &ListQuery) -> ListResult<UserRecord> {
        let validated = match USER_LIST_SPEC.validate(query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::Users, query);
        let reader = self.reader.clone();
        cached_list(
            self.cache.as_ref().map(|cache| &cache.lists),
            key,
            move || async move {
                let rows = reader
                    .list_users(&validated)
                    .await
                    .map_err(|err| report_fetch_error("users", "list", &err))?;
                let total = reader
                    .count_users(&validated.predicates)
                    .await
                    .map_err(|err| report_fetch_error("users", "count", &err))?;
                Ok(ListPage { rows, total })
            },
        )
        .await
    }

    pub async fn detail(&self, id: &str) -> DetailResult<UserRecord> {
        let parsed = match parse_detail_id(id) {
            Ok(parsed) => parsed,
            Err(message) => return DetailResult::failure(codes::VALIDATION_ERROR, message),
        };
        let Some(user_id) = parsed else {
            return DetailResult::ok(None);
        };

        let key = QueryKey::detail(Resource::Users, id);
        let reader = self.reader.clone();
        cached_detail(
            self.cache.as_ref().map(|cache| &cache.details),
            key,
            "user",
            move || async move {
                reader
                    .find_by_id(user_id)
                    .await
                    .map_err(|err| report_fetch_error("users", "fetch", &err))
            },
        )
        .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AdminUserError> {
        self.reader.find_by_id(id).await.map_err(AdminUserError::from)
    }

    pub async fn create(&self, command: CreateUserCommand) -> Result<UserRecord, AdminUserError> {
        let (name, email, phone) = normalize(command.name, command.email, command.phone)?;

        if self.reader.find_by_email(&email).await?.is_some() {
            return Err(AdminUserError::DuplicateEmail);
        }

        let user = self
            .writer
            .create_user(CreateUserParams {
                name,
                email,
                phone,
                role: command.role,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AdminUserError::DuplicateEmail,
                other => AdminUserError::Repo(other),
            })?;

        self.invalidate();
        Ok(user)
    }

    pub async fn update(&self, command: UpdateUserCommand) -> Result<UserRecord, AdminUserError> {
        let (name, email, phone) = normalize(command.name, command.email, command.phone)?;

        let existing = self
            .reader
            .find_by_id(command.id)
            .await?
            .ok_or(AdminUserError::NotFound)?;

        if email != existing.email
            && self.reader.find_by_email(&email).await?.is_some()
        {
            return Err(AdminUserError::DuplicateEmail);
        }

        let user = self
            .writer
            .update_user(UpdateUserParams {
                id: command.id,
                name,
                email,
                phone,
                role: command.role,
            })
            .await?;

        self.invalidate();
        Ok(user)
    }

    /// Idempotent: deleting an id that no longer exists is a success.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminUserError> {
        self.writer.delete_user(id).await?;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}

fn normalize(
    name: String,
    email: String,
    phone: Option<String>,
) -> Result<(String, String, Option<String>), AdminUserError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(AdminUserError::ConstraintViolation("name"));
    }

    let email = email.trim().to_ascii_lowercase();
    if !looks_like_email(&email) {
        return Err(AdminUserError::ConstraintViolation("email"));
    }

    let phone = phone.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    });

    Ok((name, email, phone))
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
