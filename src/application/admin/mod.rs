//! Back-office executor services, one per resource.
//!
//! Every service implements the same read contract: `list` validates against
//! the resource's allow-lists and returns a [`ListResult`] envelope, `detail`
//! resolves an id string (empty string is the "new/unsaved" placeholder), and
//! both read through the resource's cache namespace when one is attached.
//! Storage failures never escape an executor; they are logged and folded
//! into the envelope as `FETCH_ERROR`.

pub mod categories;
pub mod contacts;
pub mod courses;
pub mod dashboard;
pub mod enrollments;
pub mod intakes;
pub mod payments;
pub mod refunds;
pub mod users;

use std::future::Future;
use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use crate::application::listing::{DetailResult, ListPage, ListResult, codes};
use crate::application::repos::RepoError;
use crate::cache::{QueryCache, QueryKey, QueryState};

/// Resolve a list read through the cache when attached, fetching otherwise.
pub(crate) async fn cached_list<R, F, Fut>(
    cache: Option<&Arc<QueryCache<ListPage<R>>>>,
    key: QueryKey,
    fetch: F,
) -> ListResult<R>
where
    R: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<ListPage<R>, String>> + Send + 'static,
{
    match cache {
        Some(cache) => match cache.read(key, fetch).await {
            QueryState::Ready(page) => page.into(),
            QueryState::Error(message) => ListResult::failure(codes::FETCH_ERROR, message),
            QueryState::Pending => {
                ListResult::failure(codes::FETCH_ERROR, "fetch did not complete")
            }
        },
        None => match fetch().await {
            Ok(page) => page.into(),
            Err(message) => ListResult::failure(codes::FETCH_ERROR, message),
        },
    }
}

/// Resolve a detail read through the cache when attached.
///
/// `entity` names the resource in the not-found message; a cached or fetched
/// `None` for a concrete id is reported as `NOT_FOUND`, distinct from a
/// storage failure.
pub(crate) async fn cached_detail<R, F, Fut>(
    cache: Option<&Arc<QueryCache<Option<R>>>>,
    key: QueryKey,
    entity: &'static str,
    fetch: F,
) -> DetailResult<R>
where
    R: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<R>, String>> + Send + 'static,
{
    let found = match cache {
        Some(cache) => match cache.read(key, fetch).await {
            QueryState::Ready(found) => found,
            QueryState::Error(message) => {
                return DetailResult::failure(codes::FETCH_ERROR, message);
            }
            QueryState::Pending => {
                return DetailResult::failure(codes::FETCH_ERROR, "fetch did not complete");
            }
        },
        None => match fetch().await {
            Ok(found) => found,
            Err(message) => return DetailResult::failure(codes::FETCH_ERROR, message),
        },
    };

    match found {
        Some(record) => DetailResult::ok(Some(record)),
        None => DetailResult::not_found(entity),
    }
}

/// Parse a detail-id string. `Ok(None)` is the reserved empty-string
/// placeholder; `Err` is a malformed id.
pub(crate) fn parse_detail_id(id: &str) -> Result<Option<Uuid>, String> {
    if id.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(id).map(Some).map_err(|_| {
        format!("`{id}` is not a valid identifier")
    })
}

/// Log a storage failure with operation context and produce the opaque
/// message carried by the result envelope. Raw SQL and connection details
/// stay in the logs.
pub(crate) fn report_fetch_error(resource: &'static str, op: &'static str, err: &RepoError) -> String {
    error!(
        target = "enrolla::admin",
        resource,
        op,
        error = %err,
        "executor query failed"
    );
    format!("failed to {op} {resource}")
}
