//! Cache configuration.
//!
//! Freshness (`stale_time`) and eviction (`gc_time`) windows plus entry
//! limits, resolved from `config/default.toml` / environment overrides.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CATALOG_STALE_SECONDS: u64 = 60;
const DEFAULT_ADMIN_STALE_SECONDS: u64 = 5;
const DEFAULT_GC_SECONDS: u64 = 300;
const DEFAULT_LIST_ENTRY_LIMIT: usize = 64;
const DEFAULT_DETAIL_ENTRY_LIMIT: usize = 256;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Freshness and eviction windows for one cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age after which a cached value is served stale and refreshed in the
    /// background.
    pub stale_time: Duration,
    /// Idle age after which an unused entry is evicted entirely.
    pub gc_time: Duration,
}

/// Cache configuration resolved at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disable to fetch through on every read.
    pub enabled: bool,
    /// Freshness window for public catalog namespaces (courses, categories,
    /// intakes).
    pub catalog_stale_seconds: u64,
    /// Freshness window for back-office namespaces.
    pub admin_stale_seconds: u64,
    /// Idle eviction window shared by all namespaces.
    pub gc_seconds: u64,
    /// Maximum cached list pages per namespace.
    pub list_entry_limit: usize,
    /// Maximum cached detail lookups per namespace.
    pub detail_entry_limit: usize,
    /// Cadence of the background eviction sweep.
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            catalog_stale_seconds: DEFAULT_CATALOG_STALE_SECONDS,
            admin_stale_seconds: DEFAULT_ADMIN_STALE_SECONDS,
            gc_seconds: DEFAULT_GC_SECONDS,
            list_entry_limit: DEFAULT_LIST_ENTRY_LIMIT,
            detail_entry_limit: DEFAULT_DETAIL_ENTRY_LIMIT,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn catalog_policy(&self) -> CachePolicy {
        CachePolicy {
            stale_time: Duration::from_secs(self.catalog_stale_seconds),
            gc_time: Duration::from_secs(self.gc_seconds),
        }
    }

    pub fn admin_policy(&self) -> CachePolicy {
        CachePolicy {
            stale_time: Duration::from_secs(self.admin_stale_seconds),
            gc_time: Duration::from_secs(self.gc_seconds),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    /// Returns the list entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn list_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.list_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the detail entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn detail_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.detail_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            catalog_stale_seconds: settings.catalog_stale_seconds,
            admin_stale_seconds: settings.admin_stale_seconds,
            gc_seconds: settings.gc_seconds,
            list_entry_limit: settings.list_entry_limit,
            detail_entry_limit: settings.detail_entry_limit,
            sweep_interval_seconds: settings.sweep_interval_seconds,
        }
    }
}
