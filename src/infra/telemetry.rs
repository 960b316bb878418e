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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vitrine_image_jobs_total",
            Unit::Count,
            "Image compression jobs finished, labelled by outcome."
        );
        describe_counter!(
            "vitrine_image_job_failures_total",
            Unit::Count,
            "Failed image compression jobs, labelled by the failing stage."
        );
        describe_histogram!(
            "vitrine_image_job_ms",
            Unit::Milliseconds,
            "Image compression job latency in milliseconds."
        );
        describe_counter!(
            "vitrine_image_job_retries_total",
            Unit::Count,
            "Retries of transient failures inside image compression jobs."
        );
        describe_counter!(
            "vitrine_product_cache_hit_total",
            Unit::Count,
            "Product reads served from the cache."
        );
        describe_counter!(
            "vitrine_product_cache_miss_total",
            Unit::Count,
            "Product reads that fell through to the store."
        );
        describe_counter!(
            "vitrine_product_cache_error_total",
            Unit::Count,
            "Product cache operations that failed and were ignored."
        );
    });
}
