use std::sync::Once;

use metrics::{describe_counter, describe_histogram, Unit};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::application::cache::METRIC_CACHE_PUT_RACE_TOTAL;
use crate::application::speak::{
    METRIC_GENERATE_MS, METRIC_SPEAK_HIT_TOTAL, METRIC_SPEAK_MISS_TOTAL,
    METRIC_USAGE_LOG_FAILURE_TOTAL,
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
            METRIC_SPEAK_HIT_TOTAL,
            Unit::Count,
            "Total number of speak requests resolved from the cache."
        );
        describe_counter!(
            METRIC_SPEAK_MISS_TOTAL,
            Unit::Count,
            "Total number of speak requests that invoked a generation provider."
        );
        describe_counter!(
            METRIC_CACHE_PUT_RACE_TOTAL,
            Unit::Count,
            "Total number of cache puts that lost the insert race and adopted the winner's record."
        );
        describe_counter!(
            METRIC_USAGE_LOG_FAILURE_TOTAL,
            Unit::Count,
            "Total number of swallowed usage-accounting failures."
        );
        describe_histogram!(
            METRIC_GENERATE_MS,
            Unit::Milliseconds,
            "Generation provider latency in milliseconds."
        );
    });
}
