//! Tracing integration: subscriber setup and spans.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use tracing::{Level, Span, span};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "FORWARDER_LOG";

/// Install the global tracing subscriber.
///
/// The filter comes from `FORWARDER_LOG` when set, otherwise from
/// `config.level`. Returns `Ok(false)` if a subscriber was already
/// installed, which makes repeated calls harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            Error::Configuration(format!("invalid log level '{}': {e}", config.level))
        })?,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(config.ansi)
                .with_target(config.with_target),
        )
        .try_init()
        .is_ok();

    Ok(installed)
}

/// Create a span for a pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use forwarder::observability::span_pipeline;
///
/// let span = span_pipeline("forwarder");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_pipeline(name: &str) -> Span {
    span!(Level::INFO, "pipeline", name = %name)
}

/// Create a span for the tasks of one stage.
#[inline]
pub fn span_stage(pipeline: &str, stage: &str, role: &str) -> Span {
    span!(
        Level::DEBUG,
        "stage",
        pipeline = %pipeline,
        stage = %stage,
        role = %role
    )
}

/// Log a stage lifecycle transition.
#[inline]
pub fn trace_state_change(stage: &str, from: &str, to: &str) {
    tracing::debug!(stage = %stage, from = %from, to = %to, "stage state changed");
}
