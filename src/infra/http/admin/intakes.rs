use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use time::Date;
use uuid::Uuid;

use crate::application::admin::intakes::{
    AdminIntakeError, CreateIntakeCommand, INTAKE_LIST_SPEC, UpdateIntakeCommand,
};
use crate::infra::http::error::ApiError;

use super::{AdminState, ListParams};

#[derive(Debug, Deserialize)]
pub struct IntakeCreateRequest {
    pub course_id: Uuid,
    pub name: String,
    pub starts_on: Date,
    pub ends_on: Date,
    pub capacity: i32,
    pub enrollment_deadline: Date,
}

#[derive(Debug, Deserialize)]
pub struct IntakeUpdateRequest {
    pub name: String,
    pub starts_on: Date,
    pub ends_on: Date,
    pub capacity: i32,
    pub enrollment_deadline: Date,
}

pub async fn list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&INTAKE_LIST_SPEC)?;
    Ok(Json(state.intakes.list(&query).await))
}

pub async fn detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.intakes.detail(&id).await)
}

pub async fn create(
    State(state): State<AdminState>,
    Json(payload): Json<IntakeCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let intake = state
        .intakes
        .create(CreateIntakeCommand {
            course_id: payload.course_id,
            name: payload.name,
            starts_on: payload.starts_on,
            ends_on: payload.ends_on,
            capacity: payload.capacity,
            enrollment_deadline: payload.enrollment_deadline,
        })
        .await
        .map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(intake)))
}

pub async fn update(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<IntakeUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let intake = state
        .intakes
        .update(UpdateIntakeCommand {
            id,
            name: payload.name,
            starts_on: payload.starts_on,
            ends_on: payload.ends_on,
            capacity: payload.capacity,
            enrollment_deadline: payload.enrollment_deadline,
        })
        .await
        .map_err(to_api)?;

    Ok(Json(intake))
}

pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.intakes.delete(id).await.map_err(to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_api(err: AdminIntakeError) -> ApiError {
    match err {
        AdminIntakeError::ConstraintViolation(field) => {
            ApiError::bad_request("invalid field value", Some(field.to_string()))
        }
        AdminIntakeError::NotFound => ApiError::not_found("intake not found"),
        AdminIntakeError::UnknownCourse => ApiError::bad_request("course does not exist", None),
        AdminIntakeError::Repo(err) => ApiError::repo(Some(err.to_string())),
    }
}
