//! Public catalog endpoints consumed by the marketing site.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::catalog::{
    CatalogCourseQuery, CatalogError, CatalogService, SubmitContactCommand,
};
use crate::application::listing::{DetailResult, ListResult, codes};
use crate::domain::entities::{CourseRecord, IntakeRecord};
use crate::infra::db::PostgresRepositories;

use super::error::ApiError;
use super::middleware::{log_responses, set_request_context};
use super::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct PublicState {
    pub catalog: CatalogService,
    pub db: Arc<PostgresRepositories>,
    pub rate_limiter: Arc<RateLimiter>,
}

pub fn build_public_router(state: PublicState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/courses", get(list_courses))
        .route("/api/courses/{slug}", get(course_by_slug))
        .route("/api/categories", get(list_categories))
        .route("/api/contact", post(submit_contact))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn health(State(state): State<PublicState>) -> Result<StatusCode, ApiError> {
    state
        .db
        .health_check()
        .await
        .map_err(|err| ApiError::repo(Some(err.to_string())))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PublicCoursesParams {
    page: Option<u32>,
    page_size: Option<u32>,
    category_id: Option<Uuid>,
    level: Option<String>,
    q: Option<String>,
}

async fn list_courses(
    State(state): State<PublicState>,
    Query(params): Query<PublicCoursesParams>,
) -> impl IntoResponse {
    let query = CatalogCourseQuery {
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(0),
        category_id: params.category_id,
        level: params.level,
        search: params.q,
    };

    Json(state.catalog.published_courses(&query).await)
}

#[derive(Debug, Clone, Serialize)]
struct CourseDetailBody {
    #[serde(flatten)]
    course: CourseRecord,
    intakes: Vec<IntakeRecord>,
}

async fn course_by_slug(
    State(state): State<PublicState>,
    Path(slug): Path<String>,
) -> Response {
    match state.catalog.course_by_slug(&slug).await {
        Ok(Some((course, intakes))) => {
            Json(DetailResult::ok(Some(CourseDetailBody { course, intakes }))).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(DetailResult::<CourseDetailBody>::not_found("course")),
        )
            .into_response(),
        Err(err) => Json(DetailResult::<CourseDetailBody>::failure(
            codes::FETCH_ERROR,
            err.to_string(),
        ))
        .into_response(),
    }
}

async fn list_categories(State(state): State<PublicState>) -> impl IntoResponse {
    match state.catalog.categories_with_counts().await {
        Ok(categories) => {
            let total = categories.len() as u64;
            Json(ListResult::ok(categories, total))
        }
        Err(_) => Json(ListResult::failure(
            codes::FETCH_ERROR,
            "failed to load categories",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct ContactRequestBody {
    name: String,
    email: String,
    phone: Option<String>,
    message: String,
}

async fn submit_contact(
    State(state): State<PublicState>,
    Json(payload): Json<ContactRequestBody>,
) -> Response {
    // Keyed by submitter address: one address cannot flood the inbox.
    let limiter_key = payload.email.trim().to_ascii_lowercase();
    if !state.rate_limiter.allow(&limiter_key, "/api/contact") {
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    match state
        .catalog
        .submit_contact_request(SubmitContactCommand {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            message: payload.message,
        })
        .await
    {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(CatalogError::Validation(field)) => {
            ApiError::bad_request("invalid field value", Some(field.to_string())).into_response()
        }
        Err(CatalogError::Repo(err)) => ApiError::repo(Some(err.to_string())).into_response(),
    }
}
