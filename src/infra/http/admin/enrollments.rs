use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::admin::enrollments::{
    AdminEnrollmentError, CreateEnrollmentCommand, ENROLLMENT_LIST_SPEC,
};
use crate::infra::http::error::ApiError;

use super::{AdminState, ListParams};

#[derive(Debug, Deserialize)]
pub struct EnrollmentCreateRequest {
    pub intake_id: Uuid,
    pub user_id: Uuid,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnrollmentCancelRequest {
    pub note: Option<String>,
}

pub async fn list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&ENROLLMENT_LIST_SPEC)?;
    Ok(Json(state.enrollments.list(&query).await))
}

pub async fn detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.enrollments.detail(&id).await)
}

pub async fn create(
    State(state): State<AdminState>,
    Json(payload): Json<EnrollmentCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let enrollment = state
        .enrollments
        .create(CreateEnrollmentCommand {
            intake_id: payload.intake_id,
            user_id: payload.user_id,
            note: payload.note,
        })
        .await
        .map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn confirm(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let enrollment = state.enrollments.confirm(id).await.map_err(to_api)?;
    Ok(Json(enrollment))
}

pub async fn cancel(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EnrollmentCancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let enrollment = state
        .enrollments
        .cancel(id, payload.note)
        .await
        .map_err(to_api)?;
    Ok(Json(enrollment))
}

pub async fn complete(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let enrollment = state.enrollments.complete(id).await.map_err(to_api)?;
    Ok(Json(enrollment))
}

pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.enrollments.delete(id).await.map_err(to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_api(err: AdminEnrollmentError) -> ApiError {
    match err {
        AdminEnrollmentError::NotFound => ApiError::not_found("enrollment not found"),
        AdminEnrollmentError::UnknownIntake => ApiError::bad_request("intake does not exist", None),
        AdminEnrollmentError::UnknownUser => ApiError::bad_request("user does not exist", None),
        AdminEnrollmentError::DeadlinePassed => {
            ApiError::conflict("enrollment deadline has passed", None)
        }
        AdminEnrollmentError::AtCapacity { capacity } => ApiError::conflict(
            "intake is at capacity",
            Some(format!("capacity is {capacity}")),
        ),
        AdminEnrollmentError::NotPending => {
            ApiError::conflict("enrollment is not awaiting confirmation", None)
        }
        AdminEnrollmentError::Unpaid => ApiError::conflict(
            "enrollment is not fully paid",
            Some("record a paid payment covering the course price first".to_string()),
        ),
        AdminEnrollmentError::Repo(err) => ApiError::repo(Some(err.to_string())),
    }
}
