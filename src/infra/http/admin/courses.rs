use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::admin::courses::{
    AdminCourseError, COURSE_LIST_SPEC, CreateCourseCommand, UpdateCourseCommand,
};
use crate::domain::types::CourseLevel;
use crate::infra::http::error::ApiError;

use super::{AdminState, ListParams};

#[derive(Debug, Deserialize)]
pub struct CourseCreateRequest {
    pub title: String,
    pub summary: String,
    pub description: String,
    pub category_id: Uuid,
    pub level: CourseLevel,
    pub price_cents: i64,
    pub duration_weeks: i32,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Deserialize)]
pub struct CourseUpdateRequest {
    pub title: String,
    pub summary: String,
    pub description: String,
    pub category_id: Uuid,
    pub level: CourseLevel,
    pub price_cents: i64,
    pub duration_weeks: i32,
    pub published: bool,
}

#[derive(Debug, Deserialize)]
pub struct CoursePublishRequest {
    pub published: bool,
}

pub async fn list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&COURSE_LIST_SPEC)?;
    Ok(Json(state.courses.list(&query).await))
}

pub async fn detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.courses.detail(&id).await)
}

pub async fn create(
    State(state): State<AdminState>,
    Json(payload): Json<CourseCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state
        .courses
        .create(CreateCourseCommand {
            title: payload.title,
            summary: payload.summary,
            description: payload.description,
            category_id: payload.category_id,
            level: payload.level,
            price_cents: payload.price_cents,
            duration_weeks: payload.duration_weeks,
            published: payload.published,
        })
        .await
        .map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn update(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourseUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state
        .courses
        .update(UpdateCourseCommand {
            id,
            title: payload.title,
            summary: payload.summary,
            description: payload.description,
            category_id: payload.category_id,
            level: payload.level,
            price_cents: payload.price_cents,
            duration_weeks: payload.duration_weeks,
            published: payload.published,
        })
        .await
        .map_err(to_api)?;

    Ok(Json(course))
}

pub async fn set_published(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CoursePublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state
        .courses
        .set_published(id, payload.published)
        .await
        .map_err(to_api)?;

    Ok(Json(course))
}

pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.courses.delete(id).await.map_err(to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_api(err: AdminCourseError) -> ApiError {
    match err {
        AdminCourseError::ConstraintViolation(field) => {
            ApiError::bad_request("invalid field value", Some(field.to_string()))
        }
        AdminCourseError::NotFound => ApiError::not_found("course not found"),
        AdminCourseError::UnknownCategory => {
            ApiError::bad_request("category does not exist", None)
        }
        AdminCourseError::Repo(err) => ApiError::repo(Some(err.to_string())),
    }
}
