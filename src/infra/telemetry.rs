use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "enrolla_cache_hit_total",
            Unit::Count,
            "Total number of fresh query-cache hits."
        );
        describe_counter!(
            "enrolla_cache_miss_total",
            Unit::Count,
            "Total number of query-cache misses."
        );
        describe_counter!(
            "enrolla_cache_stale_total",
            Unit::Count,
            "Total number of stale reads served while a background refresh ran."
        );
        describe_counter!(
            "enrolla_cache_evict_total",
            Unit::Count,
            "Total number of query-cache evictions (capacity or idle sweep)."
        );
        describe_counter!(
            "enrolla_cache_invalidate_total",
            Unit::Count,
            "Total number of whole-namespace invalidations after mutations."
        );
        describe_counter!(
            "enrolla_cache_discard_total",
            Unit::Count,
            "Total number of in-flight fetch results discarded by invalidation."
        );
        describe_counter!(
            "enrolla_rate_limited_total",
            Unit::Count,
            "Total number of requests rejected by the rate limiter."
        );
    });
}
