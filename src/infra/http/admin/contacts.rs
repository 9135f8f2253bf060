use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::admin::contacts::{AdminContactError, CONTACT_LIST_SPEC};
use crate::infra::http::error::ApiError;

use super::{AdminState, ListParams};

pub async fn list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&CONTACT_LIST_SPEC)?;
    Ok(Json(state.contacts.list(&query).await))
}

pub async fn detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.contacts.detail(&id).await)
}

pub async fn mark_handled(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.contacts.mark_handled(id).await.map_err(to_api)?;
    Ok(Json(request))
}

pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.contacts.delete(id).await.map_err(to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_api(err: AdminContactError) -> ApiError {
    match err {
        AdminContactError::NotFound => ApiError::not_found("contact request not found"),
        AdminContactError::AlreadyHandled => {
            ApiError::conflict("contact request is already handled", None)
        }
        AdminContactError::Repo(err) => ApiError::repo(Some(err.to_string())),
    }
}
