//! Router-level back-office tests over in-memory repositories: guard
//! ordering, list envelopes, the idempotent delete policy, and cache
//! invalidation after mutations.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use enrolla::application::auth::AuthService;
use enrolla::application::repos::SessionsRepo;
use enrolla::cache::{AppCaches, CacheConfig};
use enrolla::domain::types::UserRole;
use enrolla::infra::http::build_admin_router;

use common::{OPERATOR_TOKEN, StubRepositories, admin_state, sample_course, sample_user};

fn router(repos: &Arc<StubRepositories>, caches: Option<&AppCaches>) -> Router {
    build_admin_router(admin_state(repos, caches))
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn missing_token_is_rejected_before_any_data_access() {
    let repos = Arc::new(StubRepositories::default());
    let router = router(&repos, None);

    let (status, body) = send(&router, "GET", "/admin/api/courses", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
    assert_eq!(repos.data_calls(), 0);
}

#[tokio::test]
async fn non_admin_session_is_rejected_before_any_data_access() {
    let repos = Arc::new(StubRepositories::default());
    *repos.session_role.lock().unwrap() = Some(UserRole::User);

    let sessions: Arc<dyn SessionsRepo> = repos.clone();
    let issued = AuthService::new(sessions)
        .issue(&sample_user(UserRole::User), None)
        .await
        .expect("issued");

    let router = router(&repos, None);
    let (status, body) = send(
        &router,
        "GET",
        "/admin/api/courses",
        Some(&issued.token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");
    assert_eq!(repos.data_calls(), 0);
}

#[tokio::test]
async fn mutations_are_guarded_too() {
    let repos = Arc::new(StubRepositories::default());
    let router = router(&repos, None);

    let (status, _) = send(
        &router,
        "POST",
        "/admin/api/categories",
        None,
        Some(json!({ "name": "Programming" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(repos.data_calls(), 0);
}

#[tokio::test]
async fn course_list_pages_through_the_seeded_set() {
    let rows = (0..15)
        .map(|index| sample_course(&format!("course-{index}"), index, true))
        .collect();
    let repos = Arc::new(StubRepositories::with_courses(rows));
    let router = router(&repos, None);

    let (status, body) = send(
        &router,
        "GET",
        "/admin/api/courses?page=1&page_size=10&sort_by=created_at&order=desc",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().expect("data").len(), 10);
    assert_eq!(body["total"], 15);

    let (_, second) = send(
        &router,
        "GET",
        "/admin/api/courses?page=2&page_size=10&sort_by=created_at&order=desc",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(second["data"].as_array().expect("data").len(), 5);

    let (status, past_the_end) = send(
        &router,
        "GET",
        "/admin/api/courses?page=4&page_size=10",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(past_the_end["success"], true);
    assert!(past_the_end["data"].as_array().expect("data").is_empty());
    assert_eq!(past_the_end["total"], 15);
}

#[tokio::test]
async fn unlisted_sort_field_fails_in_the_envelope() {
    let repos = Arc::new(StubRepositories::default());
    let router = router(&repos, None);

    let (status, body) = send(
        &router,
        "GET",
        "/admin/api/courses?sort_by=sneaky_column",
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    // Validation must fire before the repository sees the query.
    assert_eq!(repos.data_calls(), 0);
}

#[tokio::test]
async fn deleting_an_absent_course_succeeds() {
    let repos = Arc::new(StubRepositories::default());
    let router = router(&repos, None);

    let (status, _) = send(
        &router,
        "DELETE",
        &format!("/admin/api/courses/{}", uuid::Uuid::new_v4()),
        Some(OPERATOR_TOKEN),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_traffic_is_rate_limited_per_session() {
    let repos = Arc::new(StubRepositories::default());
    let mut state = admin_state(&repos, None);
    state.rate_limiter = Arc::new(enrolla::infra::http::RateLimiter::new(
        std::time::Duration::from_secs(60),
        2,
    ));
    let router = build_admin_router(state);

    for _ in 0..2 {
        let (status, _) = send(&router, "GET", "/admin/api/courses", Some(OPERATOR_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&router, "GET", "/admin/api/courses", Some(OPERATOR_TOKEN), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn cached_lists_are_invalidated_by_writes() {
    let rows = (0..3)
        .map(|index| sample_course(&format!("course-{index}"), index, true))
        .collect();
    let repos = Arc::new(StubRepositories::with_courses(rows));
    let caches = AppCaches::new(&CacheConfig::default());
    let router = router(&repos, Some(&caches));

    let uri = "/admin/api/courses?page=1&page_size=10";
    let (_, first) = send(&router, "GET", uri, Some(OPERATOR_TOKEN), None).await;
    assert_eq!(first["total"], 3);
    let calls_after_first = repos.data_calls();

    // Within the freshness window the second read never touches storage.
    let (_, second) = send(&router, "GET", uri, Some(OPERATOR_TOKEN), None).await;
    assert_eq!(second["total"], 3);
    assert_eq!(repos.data_calls(), calls_after_first);

    // A write through the same namespace forces the next read to refetch.
    let category = {
        let (status, body) = send(
            &router,
            "POST",
            "/admin/api/categories",
            Some(OPERATOR_TOKEN),
            Some(json!({ "name": "Programming" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().expect("category id").to_string()
    };

    let (status, created) = send(
        &router,
        "POST",
        "/admin/api/courses",
        Some(OPERATOR_TOKEN),
        Some(json!({
            "title": "Intro to SQL",
            "summary": "Queries",
            "description": "Everything about queries",
            "category_id": category,
            "level": "beginner",
            "price_cents": 10000,
            "duration_weeks": 6
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["slug"], "intro-to-sql");

    let calls_before_refetch = repos.data_calls();
    let (_, third) = send(&router, "GET", uri, Some(OPERATOR_TOKEN), None).await;
    assert_eq!(third["total"], 4);
    assert!(repos.data_calls() > calls_before_refetch);
}
