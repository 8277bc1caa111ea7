use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "ogcache_store_hit_total",
            Unit::Count,
            "Total number of store lookups that returned a live entry."
        );
        describe_counter!(
            "ogcache_store_miss_total",
            Unit::Count,
            "Total number of store lookups that found no live entry."
        );
        describe_counter!(
            "ogcache_store_evict_total",
            Unit::Count,
            "Total number of entries evicted to honour the entry or byte budget."
        );
        describe_counter!(
            "ogcache_store_expired_total",
            Unit::Count,
            "Total number of entries purged lazily after their TTL elapsed."
        );
        describe_counter!(
            "ogcache_generate_total",
            Unit::Count,
            "Total number of generator runs, labelled by result."
        );
        describe_counter!(
            "ogcache_coalesced_total",
            Unit::Count,
            "Total number of misses that joined an in-flight generation."
        );
        describe_gauge!(
            "ogcache_store_entries",
            Unit::Count,
            "Current number of stored artifacts."
        );
        describe_gauge!(
            "ogcache_store_bytes",
            Unit::Bytes,
            "Current summed size of stored artifacts."
        );
        describe_histogram!(
            "ogcache_generate_ms",
            Unit::Milliseconds,
            "Generator latency in milliseconds."
        );
    });
}
