use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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

/// Register descriptions for every metric the preview engine emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "anteprima_cache_hit_total",
            Unit::Count,
            "Total number of block cache hits."
        );
        describe_counter!(
            "anteprima_cache_miss_total",
            Unit::Count,
            "Total number of block cache misses."
        );
        describe_counter!(
            "anteprima_cache_evict_total",
            Unit::Count,
            "Total number of block cache evictions due to capacity."
        );
        describe_histogram!(
            "anteprima_render_ms",
            Unit::Milliseconds,
            "Render pass latency in milliseconds, labelled by kind."
        );
        describe_counter!(
            "anteprima_render_stale_total",
            Unit::Count,
            "Total number of render results discarded because a newer edit existed."
        );
        describe_counter!(
            "anteprima_predictive_render_total",
            Unit::Count,
            "Total number of speculative block renders, labelled by result."
        );
    });
}
