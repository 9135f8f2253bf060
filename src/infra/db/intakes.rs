use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::application::listing::{Predicate, ValidatedListQuery};
use crate::application::repos::{
    CreateIntakeParams, IntakesRepo, IntakesWriteRepo, RepoError, UpdateIntakeParams,
};
use crate::domain::entities::IntakeRecord;

use super::{PostgresRepositories, map_sqlx_error};

const INTAKE_COLUMNS: &str = "i.id, i.course_id, i.name, i.starts_on, i.ends_on, i.capacity, \
     i.enrollment_deadline, i.created_at, i.updated_at";

const INTAKE_RETURNING: &str = "id, course_id, name, starts_on, ends_on, capacity, \
     enrollment_deadline, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct IntakeRow {
    id: Uuid,
    course_id: Uuid,
    name: String,
    starts_on: Date,
    ends_on: Date,
    capacity: i32,
    enrollment_deadline: Date,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<IntakeRow> for IntakeRecord {
    fn from(row: IntakeRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            name: row.name,
            starts_on: row.starts_on,
            ends_on: row.ends_on,
            capacity: row.capacity,
            enrollment_deadline: row.enrollment_deadline,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl IntakesRepo for PostgresRepositories {
    async fn list_intakes(
        &self,
        query: &ValidatedListQuery,
    ) -> Result<Vec<IntakeRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {INTAKE_COLUMNS} FROM intakes i WHERE 1=1 "
        ));
        Self::apply_predicates(&mut qb, &query.predicates);
        Self::apply_order_and_page(&mut qb, query, "i.id");

        let rows = qb
            .build_query_as::<IntakeRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(IntakeRecord::from).collect())
    }

    async fn count_intakes(&self, predicates: &[Predicate]) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM intakes i WHERE 1=1 ");
        Self::apply_predicates(&mut qb, predicates);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn list_for_course(&self, course_id: Uuid) -> Result<Vec<IntakeRecord>, RepoError> {
        let rows = sqlx::query_as::<_, IntakeRow>(&format!(
            "SELECT {INTAKE_COLUMNS} FROM intakes i
             WHERE i.course_id = $1
             ORDER BY i.starts_on ASC, i.id DESC"
        ))
        .bind(course_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(IntakeRecord::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<IntakeRecord>, RepoError> {
        let row = sqlx::query_as::<_, IntakeRow>(&format!(
            "SELECT {INTAKE_COLUMNS} FROM intakes i WHERE i.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(IntakeRecord::from))
    }

    async fn count_active_enrollments(&self, id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM enrollments
             WHERE intake_id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}

#[async_trait]
impl IntakesWriteRepo for PostgresRepositories {
    async fn create_intake(&self, params: CreateIntakeParams) -> Result<IntakeRecord, RepoError> {
        let CreateIntakeParams {
            course_id,
            name,
            starts_on,
            ends_on,
            capacity,
            enrollment_deadline,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, IntakeRow>(&format!(
            "INSERT INTO intakes (
                id, course_id, name, starts_on, ends_on, capacity,
                enrollment_deadline, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {INTAKE_RETURNING}"
        ))
        .bind(id)
        .bind(course_id)
        .bind(name)
        .bind(starts_on)
        .bind(ends_on)
        .bind(capacity)
        .bind(enrollment_deadline)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(IntakeRecord::from(row))
    }

    async fn update_intake(&self, params: UpdateIntakeParams) -> Result<IntakeRecord, RepoError> {
        let UpdateIntakeParams {
            id,
            name,
            starts_on,
            ends_on,
            capacity,
            enrollment_deadline,
        } = params;

        let row = sqlx::query_as::<_, IntakeRow>(&format!(
            "UPDATE intakes
             SET name = $2,
                 starts_on = $3,
                 ends_on = $4,
                 capacity = $5,
                 enrollment_deadline = $6,
                 updated_at = now()
             WHERE id = $1
             RETURNING {INTAKE_RETURNING}"
        ))
        .bind(id)
        .bind(name)
        .bind(starts_on)
        .bind(ends_on)
        .bind(capacity)
        .bind(enrollment_deadline)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(IntakeRecord::from(row))
    }

    async fn delete_intake(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM intakes WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
