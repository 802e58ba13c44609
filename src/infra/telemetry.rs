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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "feedline_cache_hit_total",
            Unit::Count,
            "Total number of object cache hits, labelled by entry kind."
        );
        describe_counter!(
            "feedline_cache_miss_total",
            Unit::Count,
            "Total number of object cache misses, labelled by entry kind."
        );
        describe_counter!(
            "feedline_cache_invalidate_total",
            Unit::Count,
            "Total number of cache entries dropped by write invalidation."
        );
        describe_counter!(
            "feedline_fanout_jobs_total",
            Unit::Count,
            "Total number of fan-out jobs processed, labelled by kind and outcome."
        );
        describe_counter!(
            "feedline_fanout_entries_written_total",
            Unit::Count,
            "Total number of feed entries inserted or updated by fan-out."
        );
        describe_histogram!(
            "feedline_fanout_ms",
            Unit::Milliseconds,
            "Fan-out job latency in milliseconds."
        );
        describe_gauge!(
            "feedline_fanout_local_pending",
            Unit::Count,
            "Jobs accepted by the in-process fan-out queue and not yet finished."
        );
    });
}
