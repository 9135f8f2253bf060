use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::listing::{Predicate, ValidatedListQuery};
use crate::application::repos::{
    CoursesRepo, CoursesWriteRepo, CreateCourseParams, RepoError, UpdateCourseParams,
};
use crate::domain::entities::CourseRecord;
use crate::domain::types::CourseLevel;

use super::{PostgresRepositories, map_sqlx_error};

const COURSE_COLUMNS: &str = "c.id, c.slug, c.title, c.summary, c.description, c.category_id, \
     c.level, c.price_cents, c.duration_weeks, c.published, c.created_at, c.updated_at";

const COURSE_RETURNING: &str = "id, slug, title, summary, description, category_id, \
     level, price_cents, duration_weeks, published, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: Uuid,
    slug: String,
    title: String,
    summary: String,
    description: String,
    category_id: Uuid,
    level: CourseLevel,
    price_cents: i64,
    duration_weeks: i32,
    published: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CourseRow> for CourseRecord {
    fn from(row: CourseRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            summary: row.summary,
            description: row.description,
            category_id: row.category_id,
            level: row.level,
            price_cents: row.price_cents,
            duration_weeks: row.duration_weeks,
            published: row.published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CoursesRepo for PostgresRepositories {
    async fn list_courses(
        &self,
        query: &ValidatedListQuery,
    ) -> Result<Vec<CourseRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {COURSE_COLUMNS} FROM courses c WHERE 1=1 "
        ));
        Self::apply_predicates(&mut qb, &query.predicates);
        Self::apply_order_and_page(&mut qb, query, "c.id");

        let rows = qb
            .build_query_as::<CourseRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CourseRecord::from).collect())
    }

    async fn count_courses(&self, predicates: &[Predicate]) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM courses c WHERE 1=1 ");
        Self::apply_predicates(&mut qb, predicates);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CourseRecord>, RepoError> {
        let row = sqlx::query_as::<_, CourseRow>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CourseRecord::from))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CourseRecord>, RepoError> {
        let row = sqlx::query_as::<_, CourseRow>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses c WHERE c.slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CourseRecord::from))
    }

    async fn count_published(&self) -> Result<u64, RepoError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM courses c WHERE c.published = TRUE")
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}

#[async_trait]
impl CoursesWriteRepo for PostgresRepositories {
    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError> {
        let CreateCourseParams {
            slug,
            title,
            summary,
            description,
            category_id,
            level,
            price_cents,
            duration_weeks,
            published,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, CourseRow>(&format!(
            "INSERT INTO courses (
                id, slug, title, summary, description, category_id,
                level, price_cents, duration_weeks, published, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {COURSE_RETURNING}"
        ))
        .bind(id)
        .bind(slug)
        .bind(title)
        .bind(summary)
        .bind(description)
        .bind(category_id)
        .bind(level)
        .bind(price_cents)
        .bind(duration_weeks)
        .bind(published)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(CourseRecord::from(row))
    }

    async fn update_course(&self, params: UpdateCourseParams) -> Result<CourseRecord, RepoError> {
        let UpdateCourseParams {
            id,
            slug,
            title,
            summary,
            description,
            category_id,
            level,
            price_cents,
            duration_weeks,
            published,
        } = params;

        let row = sqlx::query_as::<_, CourseRow>(&format!(
            "UPDATE courses
             SET slug = $2,
                 title = $3,
                 summary = $4,
                 description = $5,
                 category_id = $6,
                 level = $7,
                 price_cents = $8,
                 duration_weeks = $9,
                 published = $10,
                 updated_at = now()
             WHERE id = $1
             RETURNING {COURSE_RETURNING}"
        ))
        .bind(id)
        .bind(slug)
        .bind(title)
        .bind(summary)
        .bind(description)
        .bind(category_id)
        .bind(level)
        .bind(price_cents)
        .bind(duration_weeks)
        .bind(published)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(CourseRecord::from(row))
    }

    async fn delete_course(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
