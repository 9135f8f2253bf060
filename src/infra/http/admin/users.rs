use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use time::Duration;
use uuid::Uuid;

use crate::application::admin::users::{
    AdminUserError, CreateUserCommand, USER_LIST_SPEC, UpdateUserCommand,
};
use crate::domain::types::UserRole;
use crate::infra::http::error::ApiError;

use super::{AdminState, ListParams};

#[derive(Debug, Deserialize)]
pub struct UserCreateRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(default = "default_role")]
    pub role: UserRole,
}

fn default_role() -> UserRole {
    UserRole::User
}

#[derive(Debug, Deserialize)]
pub struct UserUpdateRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct SessionIssueRequest {
    /// Session lifetime in hours; omit to use the configured default.
    pub ttl_hours: Option<i64>,
}

/// The plaintext token is surfaced exactly once, at issuance.
#[derive(Debug, Serialize)]
pub struct SessionIssuedResponse {
    pub token: String,
    pub expires_at: Option<time::OffsetDateTime>,
}

pub async fn list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&USER_LIST_SPEC)?;
    Ok(Json(state.users.list(&query).await))
}

pub async fn detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.users.detail(&id).await)
}

pub async fn create(
    State(state): State<AdminState>,
    Json(payload): Json<UserCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .users
        .create(CreateUserCommand {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            role: payload.role,
        })
        .await
        .map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .users
        .update(UpdateUserCommand {
            id,
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            role: payload.role,
        })
        .await
        .map_err(to_api)?;

    Ok(Json(user))
}

pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.users.delete(id).await.map_err(to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn issue_session(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SessionIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .users
        .find_by_id(id)
        .await
        .map_err(to_api)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let ttl = payload.ttl_hours.map(Duration::hours);
    let issued = state
        .auth
        .issue(&user, ttl)
        .await
        .map_err(|err| ApiError::repo(Some(err.to_string())))?;

    Ok((
        StatusCode::CREATED,
        Json(SessionIssuedResponse {
            token: issued.token,
            expires_at: issued.record.expires_at,
        }),
    ))
}

pub async fn revoke_sessions(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .auth
        .revoke_for_user(id)
        .await
        .map_err(|err| ApiError::repo(Some(err.to_string())))?;

    Ok(StatusCode::NO_CONTENT)
}

fn to_api(err: AdminUserError) -> ApiError {
    match err {
        AdminUserError::ConstraintViolation(field) => {
            ApiError::bad_request("invalid field value", Some(field.to_string()))
        }
        AdminUserError::NotFound => ApiError::not_found("user not found"),
        AdminUserError::DuplicateEmail => {
            ApiError::conflict("a user with this email already exists", None)
        }
        AdminUserError::Repo(err) => ApiError::repo(Some(err.to_string())),
    }
}
