//! Read-through query cache.
//!
//! [`QueryCache::read`] is the suspend-until-ready contract every cached
//! lookup goes through: the first read for a key awaits the fetch, concurrent
//! readers of the same key join the single in-flight fetch, and reads past
//! the freshness window return the stale value while a background refresh
//! runs. Failed fetches are never stored; a generation counter discards
//! results that were in flight when the namespace was invalidated.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use lru::LruCache;
use metrics::counter;
use tokio::sync::watch;

use super::config::{CacheConfig, CachePolicy};
use super::keys::QueryKey;
use super::lock::{mutex_lock, rw_write};

const SOURCE: &str = "cache::store";

/// Observable outcome of a cached read.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// A fetch for this key is outstanding. Only ever observed through the
    /// in-flight channel; `read` resolves to `Ready` or `Error`.
    Pending,
    Ready(T),
    Error(String),
}

impl<T> QueryState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Pending)
    }
}

struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
    last_read: Instant,
}

enum FetchRole<T> {
    /// This reader runs the fetch and broadcasts the outcome.
    Lead(watch::Sender<QueryState<T>>),
    /// Another reader already owns the fetch; await its broadcast.
    Join(watch::Receiver<QueryState<T>>),
}

/// One cache namespace holding values of a single shape.
pub struct QueryCache<T> {
    name: &'static str,
    enabled: bool,
    policy: CachePolicy,
    entries: RwLock<LruCache<QueryKey, CacheEntry<T>>>,
    inflight: Mutex<HashMap<QueryKey, watch::Receiver<QueryState<T>>>>,
    generation: AtomicU64,
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, config: &CacheConfig, policy: CachePolicy) -> Self {
        Self {
            name,
            enabled: config.enabled,
            policy,
            entries: RwLock::new(LruCache::new(config.list_entry_limit_non_zero())),
            inflight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(
        name: &'static str,
        config: &CacheConfig,
        policy: CachePolicy,
        capacity: std::num::NonZeroUsize,
    ) -> Self {
        Self {
            name,
            enabled: config.enabled,
            policy,
            entries: RwLock::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve `key`, fetching on miss.
    ///
    /// Fresh hit: returns immediately. Stale hit: returns the cached value
    /// and refreshes in the background. Miss: suspends until the (single,
    /// shared) in-flight fetch resolves.
    pub async fn read<F, Fut>(self: &Arc<Self>, key: QueryKey, fetch: F) -> QueryState<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, String>> + Send + 'static,
    {
        if !self.enabled {
            return match fetch().await {
                Ok(value) => QueryState::Ready(value),
                Err(message) => QueryState::Error(message),
            };
        }

        let now = Instant::now();
        {
            let mut entries = rw_write(&self.entries, SOURCE, "read.lookup");
            if let Some(entry) = entries.get_mut(&key) {
                entry.last_read = now;
                if entry.fetched_at.elapsed() < self.policy.stale_time {
                    counter!("enrolla_cache_hit_total", "cache" => self.name).increment(1);
                    return QueryState::Ready(entry.value.clone());
                }
                let stale = entry.value.clone();
                drop(entries);
                counter!("enrolla_cache_stale_total", "cache" => self.name).increment(1);
                self.spawn_refresh(key, fetch);
                return QueryState::Ready(stale);
            }
        }

        counter!("enrolla_cache_miss_total", "cache" => self.name).increment(1);
        match self.claim(&key) {
            FetchRole::Lead(tx) => self.run_fetch(key, fetch, tx).await,
            FetchRole::Join(rx) => Self::wait(rx).await,
        }
    }

    /// Drop every entry in this namespace. Fetches already in flight will
    /// complete for their waiters but their results are discarded, not
    /// stored.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        rw_write(&self.entries, SOURCE, "invalidate_all").clear();
        counter!("enrolla_cache_invalidate_total", "cache" => self.name).increment(1);
    }

    /// Evict entries that have not been read within the eviction window.
    pub fn sweep_expired(&self) {
        let gc_time = self.policy.gc_time;
        let mut entries = rw_write(&self.entries, SOURCE, "sweep_expired");
        let expired: Vec<QueryKey> = entries
            .iter()
            .filter(|(_, entry)| entry.last_read.elapsed() >= gc_time)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        if !expired.is_empty() {
            counter!("enrolla_cache_evict_total", "cache" => self.name)
                .increment(expired.len() as u64);
        }
    }

    pub fn len(&self) -> usize {
        rw_write(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn claim(&self, key: &QueryKey) -> FetchRole<T> {
        let mut inflight = mutex_lock(&self.inflight, SOURCE, "claim");
        if let Some(rx) = inflight.get(key) {
            return FetchRole::Join(rx.clone());
        }
        let (tx, rx) = watch::channel(QueryState::Pending);
        inflight.insert(key.clone(), rx);
        FetchRole::Lead(tx)
    }

    fn spawn_refresh<F, Fut>(self: &Arc<Self>, key: QueryKey, fetch: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, String>> + Send + 'static,
    {
        let tx = {
            let mut inflight = mutex_lock(&self.inflight, SOURCE, "spawn_refresh");
            if inflight.contains_key(&key) {
                // A refresh for this key is already running.
                return;
            }
            let (tx, rx) = watch::channel(QueryState::Pending);
            inflight.insert(key.clone(), rx);
            tx
        };

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            cache.run_fetch(key, fetch, tx).await;
        });
    }

    async fn run_fetch<F, Fut>(
        self: &Arc<Self>,
        key: QueryKey,
        fetch: F,
        tx: watch::Sender<QueryState<T>>,
    ) -> QueryState<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, String>> + Send + 'static,
    {
        let generation = self.generation.load(Ordering::Acquire);
        let state = match fetch().await {
            Ok(value) => {
                self.store(&key, value.clone(), generation);
                QueryState::Ready(value)
            }
            Err(message) => QueryState::Error(message),
        };

        mutex_lock(&self.inflight, SOURCE, "run_fetch.release").remove(&key);
        let _ = tx.send(state.clone());
        state
    }

    fn store(&self, key: &QueryKey, value: T, generation: u64) {
        if self.generation.load(Ordering::Acquire) != generation {
            // The namespace was invalidated while this fetch was in flight;
            // discard the result wholesale rather than resurrecting it.
            counter!("enrolla_cache_discard_total", "cache" => self.name).increment(1);
            return;
        }

        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "store");
        let evicted = entries.push(
            key.clone(),
            CacheEntry {
                value,
                fetched_at: now,
                last_read: now,
            },
        );
        if let Some((evicted_key, _)) = evicted
            && evicted_key != *key
        {
            counter!("enrolla_cache_evict_total", "cache" => self.name).increment(1);
        }
    }

    async fn wait(mut rx: watch::Receiver<QueryState<T>>) -> QueryState<T> {
        loop {
            let state = rx.borrow_and_update().clone();
            if !state.is_pending() {
                return state;
            }
            if rx.changed().await.is_err() {
                // The leading fetch was abandoned mid-flight; surface an
                // error without touching stored state.
                return QueryState::Error("fetch was abandoned before completing".to_string());
            }
        }
    }
}
