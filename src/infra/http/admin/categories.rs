use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::admin::categories::{
    AdminCategoryError, CATEGORY_LIST_SPEC, CreateCategoryCommand, UpdateCategoryCommand,
};
use crate::infra::http::error::ApiError;

use super::{AdminState, ListParams};

#[derive(Debug, Deserialize)]
pub struct CategoryCreateRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryUpdateRequest {
    pub name: String,
    pub description: Option<String>,
}

pub async fn list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&CATEGORY_LIST_SPEC)?;
    Ok(Json(state.categories.list(&query).await))
}

pub async fn detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.categories.detail(&id).await)
}

pub async fn create(
    State(state): State<AdminState>,
    Json(payload): Json<CategoryCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .categories
        .create(CreateCategoryCommand {
            name: payload.name,
            description: payload.description,
        })
        .await
        .map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .categories
        .update(UpdateCategoryCommand {
            id,
            name: payload.name,
            description: payload.description,
        })
        .await
        .map_err(to_api)?;

    Ok(Json(category))
}

pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.categories.delete(id).await.map_err(to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_api(err: AdminCategoryError) -> ApiError {
    match err {
        AdminCategoryError::ConstraintViolation(field) => {
            ApiError::bad_request("invalid field value", Some(field.to_string()))
        }
        AdminCategoryError::NotFound => ApiError::not_found("category not found"),
        AdminCategoryError::InUse { count } => ApiError::conflict(
            "category is referenced by existing courses",
            Some(format!("{count} courses use this category")),
        ),
        AdminCategoryError::Repo(err) => ApiError::repo(Some(err.to_string())),
    }
}
