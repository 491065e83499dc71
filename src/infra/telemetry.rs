use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "engblogs_page_cache_hit_total",
            Unit::Count,
            "Pages served from a session's page cache."
        );
        describe_counter!(
            "engblogs_page_cache_miss_total",
            Unit::Count,
            "Page cache lookups that found no usable entry."
        );
        describe_counter!(
            "engblogs_fetch_error_total",
            Unit::Count,
            "Remote page fetches that failed."
        );
        describe_counter!(
            "engblogs_stale_response_total",
            Unit::Count,
            "Fetch results discarded because a newer request superseded them."
        );
        describe_counter!(
            "engblogs_prefetch_total",
            Unit::Count,
            "Neighbour prefetch attempts by outcome (warmed, failed, bypassed)."
        );
        describe_gauge!(
            "engblogs_sessions_active",
            Unit::Count,
            "Browsing sessions currently held in memory."
        );
    });
}
