//! Back-office JSON API: one router per deployment, every route behind the
//! admin session guard.

mod categories;
mod contacts;
mod courses;
mod enrollments;
mod intakes;
mod payments;
mod refunds;
mod users;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;

use crate::application::admin::dashboard::AdminDashboardService;
use crate::application::admin::{
    categories::AdminCategoryService, contacts::AdminContactService, courses::AdminCourseService,
    enrollments::AdminEnrollmentService, intakes::AdminIntakeService,
    payments::AdminPaymentService, refunds::AdminRefundService, users::AdminUserService,
};
use crate::application::auth::{AuthError, AuthService, GuardError, Session};
use crate::application::listing::{FieldFilter, FilterOp, ListQuery, ListSpec, SortOrder};

use super::error::ApiError;
use super::middleware::{log_responses, set_request_context};
use super::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AdminState {
    pub auth: AuthService,
    pub rate_limiter: Arc<RateLimiter>,
    pub dashboard: AdminDashboardService,
    pub categories: AdminCategoryService,
    pub courses: AdminCourseService,
    pub intakes: AdminIntakeService,
    pub users: AdminUserService,
    pub enrollments: AdminEnrollmentService,
    pub payments: AdminPaymentService,
    pub refunds: AdminRefundService,
    pub contacts: AdminContactService,
}

pub fn build_admin_router(state: AdminState) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(dashboard))
        .route(
            "/categories",
            get(categories::list).post(categories::create),
        )
        .route(
            "/categories/{id}",
            get(categories::detail)
                .put(categories::update)
                .delete(categories::remove),
        )
        .route("/courses", get(courses::list).post(courses::create))
        .route(
            "/courses/{id}",
            get(courses::detail)
                .put(courses::update)
                .delete(courses::remove),
        )
        .route("/courses/{id}/published", put(courses::set_published))
        .route("/intakes", get(intakes::list).post(intakes::create))
        .route(
            "/intakes/{id}",
            get(intakes::detail)
                .put(intakes::update)
                .delete(intakes::remove),
        )
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/{id}",
            get(users::detail).put(users::update).delete(users::remove),
        )
        .route(
            "/users/{id}/sessions",
            post(users::issue_session).delete(users::revoke_sessions),
        )
        .route(
            "/enrollments",
            get(enrollments::list).post(enrollments::create),
        )
        .route(
            "/enrollments/{id}",
            get(enrollments::detail).delete(enrollments::remove),
        )
        .route("/enrollments/{id}/confirm", post(enrollments::confirm))
        .route("/enrollments/{id}/cancel", post(enrollments::cancel))
        .route("/enrollments/{id}/complete", post(enrollments::complete))
        .route("/payments", get(payments::list).post(payments::create))
        .route(
            "/payments/{id}",
            get(payments::detail).delete(payments::remove),
        )
        .route("/payments/{id}/paid", post(payments::record_paid))
        .route("/payments/{id}/failed", post(payments::record_failed))
        .route("/refunds", get(refunds::list).post(refunds::create))
        .route(
            "/refunds/{id}",
            get(refunds::detail).delete(refunds::remove),
        )
        .route("/refunds/{id}/approve", post(refunds::approve))
        .route("/refunds/{id}/reject", post(refunds::reject))
        .route("/refunds/{id}/process", post(refunds::process))
        .route("/contact-requests", get(contacts::list))
        .route(
            "/contact-requests/{id}",
            get(contacts::detail).delete(contacts::remove),
        )
        .route("/contact-requests/{id}/handled", post(contacts::mark_handled))
        // Layers run top-down per request: auth resolves the session first,
        // then the limiter buckets by that session.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_rate_limit,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .nest("/admin/api", protected)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn dashboard(State(state): State<AdminState>) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .dashboard
        .summary()
        .await
        .map_err(|err| ApiError::repo(Some(err.to_string())))?;
    Ok(Json(summary))
}

/// Resolve the caller before any handler runs. A guard failure aborts the
/// request here, ahead of every executor.
pub async fn admin_auth(
    State(state): State<AdminState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = extract_token(request.headers());

    let session = match state.auth.require_admin(token.as_deref()).await {
        Ok(session) => session,
        Err(GuardError::Auth(AuthError::Expired)) => {
            return ApiError::unauthorized("session expired").into_response();
        }
        Err(GuardError::Auth(AuthError::Revoked)) => {
            return ApiError::unauthorized("session revoked").into_response();
        }
        Err(GuardError::Auth(_)) => {
            return ApiError::unauthorized("session token required").into_response();
        }
        Err(GuardError::Authz(_)) => return ApiError::forbidden().into_response(),
    };

    request.extensions_mut().insert(session);
    let mut response = next.run(request).await;
    response.extensions_mut().insert(session);
    response
}

/// Bucket admin traffic per authenticated session. Runs behind `admin_auth`,
/// so a missing session extension is a wiring fault, not a caller mistake.
pub async fn admin_rate_limit(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let key = match request.extensions().get::<Session>() {
        Some(session) => session
            .user_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "guest".to_string()),
        None => {
            warn!(
                target = "enrolla::admin::ratelimit",
                "missing session in rate limit middleware"
            );
            return ApiError::unauthorized("session token required").into_response();
        }
    };

    if !state.rate_limiter.allow(&key, &path) {
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    next.run(request).await
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.to_string());

    bearer.or_else(|| {
        headers
            .get("x-session-token")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
    })
}

/// Query-string shape shared by every admin list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    /// Comma-separated `field:op:value` triples, e.g.
    /// `status:eq:pending,amount_cents:gte:10000`.
    pub filters: Option<String>,
}

impl ListParams {
    pub fn into_query(self, spec: &ListSpec) -> Result<ListQuery, ApiError> {
        let mut query = spec.default_query();

        if let Some(page) = self.page {
            query.page = page;
        }
        if let Some(page_size) = self.page_size {
            query.page_size = page_size;
        }
        if let Some(sort_by) = self.sort_by {
            // Allow-list membership is checked by the executor's validation,
            // which reports it through the result envelope.
            query.sort_by = sort_by;
        }
        if let Some(order) = self.order {
            query.order = SortOrder::try_from(order.as_str())
                .map_err(|_| ApiError::bad_request("invalid order", Some(order)))?;
        }
        if let Some(raw) = self.filters {
            query.filters = parse_filters(&raw)?;
        }

        Ok(query)
    }
}

fn parse_filters(raw: &str) -> Result<Vec<FieldFilter>, ApiError> {
    raw.split(',')
        .filter(|triple| !triple.is_empty())
        .map(|triple| {
            let mut parts = triple.splitn(3, ':');
            let field = parts.next().unwrap_or_default();
            let op = parts.next().ok_or_else(|| {
                ApiError::bad_request("malformed filter", Some(triple.to_string()))
            })?;
            let value = parts.next().ok_or_else(|| {
                ApiError::bad_request("malformed filter", Some(triple.to_string()))
            })?;

            let op = FilterOp::try_from(op).map_err(|_| {
                ApiError::bad_request("unknown filter operator", Some(op.to_string()))
            })?;

            Ok(FieldFilter::new(field, op, value))
        })
        .collect()
}
