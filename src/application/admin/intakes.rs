use std::sync::Arc;

use thiserror::Error;
use time::Date;
use uuid::Uuid;

use crate::application::admin::{cached_detail, cached_list, parse_detail_id, report_fetch_error};
use crate::application::listing::{
    DetailResult, FieldKind, FilterField, ListPage, ListQuery, ListResult, ListSpec, SortField,
    SortOrder, codes,
};
use crate::application::repos::{
    CoursesRepo, CreateIntakeParams, IntakesRepo, IntakesWriteRepo, RepoError, UpdateIntakeParams,
};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::IntakeRecord;

pub const INTAKE_LIST_SPEC: ListSpec = ListSpec {
    resource: "intakes",
    sort_fields: &[
        SortField {
            name: "starts_on",
            column: "i.starts_on",
        },
        SortField {
            name: "created_at",
            column: "i.created_at",
        },
        SortField {
            name: "name",
            column: "i.name",
        },
        SortField {
            name: "capacity",
            column: "i.capacity",
        },
    ],
    filter_fields: &[
        FilterField {
            name: "course_id",
            column: "i.course_id",
            kind: FieldKind::Uuid,
        },
        FilterField {
            name: "name",
            column: "i.name",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "starts_on",
            column: "i.starts_on",
            kind: FieldKind::Date,
        },
        FilterField {
            name: "capacity",
            column: "i.capacity",
            kind: FieldKind::Integer,
        },
    ],
    default_sort: "starts_on",
    default_order: SortOrder::Desc,
    max_page_size: 100,
};

#[derive(Debug, Error)]
pub enum AdminIntakeError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("intake not found")]
    NotFound,
    #[error("course does not exist")]
    UnknownCourse,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateIntakeCommand {
    pub course_id: Uuid,
    pub name: String,
    pub starts_on: Date,
    pub ends_on: Date,
    pub capacity: i32,
    pub enrollment_deadline: Date,
}

#[derive(Debug, Clone)]
pub struct UpdateIntakeCommand {
    pub id: Uuid,
    pub name: String,
    pub starts_on: Date,
    pub ends_on: Date,
    pub capacity: i32,
    pub enrollment_deadline: Date,
}

#[derive(Clone)]
pub struct AdminIntakeService {
    reader: Arc<dyn IntakesRepo>,
    writer: Arc<dyn IntakesWriteRepo>,
    courses: Arc<dyn CoursesRepo>,
    cache: Option<Arc<ResourceCache<IntakeRecord>>>,
}

impl AdminIntakeService {
    pub fn new(
        reader: Arc<dyn IntakesRepo>,
        writer: Arc<dyn IntakesWriteRepo>,
        courses: Arc<dyn CoursesRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            courses,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResourceCache<IntakeRecord>>>) -> Self {
        self.cache = cache;
        self
    }

    pub async fn list(&self, query: &ListQuery) -> ListResult<IntakeRecord> {
        let validated = match INTAKE_LIST_SPEC.validate(query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::Intakes, query);
        let reader = self.reader.clone();
        cached_list(
            self.cache.as_ref().map(|cache| &cache.lists),
            key,
            move || async move {
                let rows = reader
                    .list_intakes(&validated)
                    .await
                    .map_err(|err| report_fetch_error("intakes", "list", &err))?;
                let total = reader
                    .count_intakes(&validated.predicates)
                    .await
                    .map_err(|err| report_fetch_error("intakes", "count", &err))?;
                Ok(ListPage { rows, total })
            },
        )
        .await
    }

    pub async fn detail(&self, id: &str) -> DetailResult<IntakeRecord> {
        let parsed = match parse_detail_id(id) {
            Ok(parsed) => parsed,
            Err(message) => return DetailResult::failure(codes::VALIDATION_ERROR, message),
        };
        let Some(intake_id) = parsed else {
            return DetailResult::ok(None);
        };

        let key = QueryKey::detail(Resource::Intakes, id);
        let reader = self.reader.clone();
        cached_detail(
            self.cache.as_ref().map(|cache| &cache.details),
            key,
            "intake",
            move || async move {
                reader
                    .find_by_id(intake_id)
                    .await
                    .map_err(|err| report_fetch_error("intakes", "fetch", &err))
            },
        )
        .await
    }

    pub async fn create(
        &self,
        command: CreateIntakeCommand,
    ) -> Result<IntakeRecord, AdminIntakeError> {
        let name = command.name.trim().to_string();
        validate_schedule(
            &name,
            command.starts_on,
            command.ends_on,
            command.capacity,
            command.enrollment_deadline,
        )?;

        self.courses
            .find_by_id(command.course_id)
            .await?
            .ok_or(AdminIntakeError::UnknownCourse)?;

        let intake = self
            .writer
            .create_intake(CreateIntakeParams {
                course_id: command.course_id,
                name,
                starts_on: command.starts_on,
                ends_on: command.ends_on,
                capacity: command.capacity,
                enrollment_deadline: command.enrollment_deadline,
            })
            .await?;

        self.invalidate();
        Ok(intake)
    }

    pub async fn update(
        &self,
        command: UpdateIntakeCommand,
    ) -> Result<IntakeRecord, AdminIntakeError> {
        let name = command.name.trim().to_string();
        validate_schedule(
            &name,
            command.starts_on,
            command.ends_on,
            command.capacity,
            command.enrollment_deadline,
        )?;

        self.reader
            .find_by_id(command.id)
            .await?
            .ok_or(AdminIntakeError::NotFound)?;

        let intake = self
            .writer
            .update_intake(UpdateIntakeParams {
                id: command.id,
                name,
                starts_on: command.starts_on,
                ends_on: command.ends_on,
                capacity: command.capacity,
                enrollment_deadline: command.enrollment_deadline,
            })
            .await?;

        self.invalidate();
        Ok(intake)
    }

    /// Idempotent: deleting an id that no longer exists is a success.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminIntakeError> {
        self.writer.delete_intake(id).await?;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}

fn validate_schedule(
    name: &str,
    starts_on: Date,
    ends_on: Date,
    capacity: i32,
    enrollment_deadline: Date,
) -> Result<(), AdminIntakeError> {
    if name.trim().is_empty() {
        return Err(AdminIntakeError::ConstraintViolation("name"));
    }
    if ends_on < starts_on {
        return Err(AdminIntakeError::ConstraintViolation("ends_on"));
    }
    if enrollment_deadline > starts_on {
        return Err(AdminIntakeError::ConstraintViolation("enrollment_deadline"));
    }
    if capacity < 1 {
        return Err(AdminIntakeError::ConstraintViolation("capacity"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn schedule_rejects_inverted_dates() {
        let err = validate_schedule(
            "2026 Autumn",
            date!(2026 - 09 - 01),
            date!(2026 - 08 - 01),
            20,
            date!(2026 - 08 - 20),
        )
        .expect_err("inverted dates");
        assert!(matches!(err, AdminIntakeError::ConstraintViolation("ends_on")));
    }

    #[test]
    fn schedule_rejects_deadline_after_start() {
        let err = validate_schedule(
            "2026 Autumn",
            date!(2026 - 09 - 01),
            date!(2026 - 12 - 01),
            20,
            date!(2026 - 09 - 15),
        )
        .expect_err("late deadline");
        assert!(matches!(
            err,
            AdminIntakeError::ConstraintViolation("enrollment_deadline")
        ));
    }

    #[test]
    fn schedule_rejects_zero_capacity() {
        let err = validate_schedule(
            "2026 Autumn",
            date!(2026 - 09 - 01),
            date!(2026 - 12 - 01),
            0,
            date!(2026 - 08 - 20),
        )
        .expect_err("zero capacity");
        assert!(matches!(err, AdminIntakeError::ConstraintViolation("capacity")));
    }

    #[test]
    fn schedule_accepts_consistent_input() {
        validate_schedule(
            "2026 Autumn",
            date!(2026 - 09 - 01),
            date!(2026 - 12 - 01),
            20,
            date!(2026 - 08 - 20),
        )
        .expect("valid schedule");
    }
}
