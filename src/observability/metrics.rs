//! Metrics collection using metrics-rs.

use metrics::{Counter, Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const RECORDS_RECEIVED: &str = "forwarder_records_received";
const RECORDS_FORWARDED: &str = "forwarder_records_forwarded";
const RECORDS_WRITTEN: &str = "forwarder_records_written";
const RECORDS_DISCARDED: &str = "forwarder_records_discarded";
const WRITE_ERRORS: &str = "forwarder_write_errors";
const FEED_ERRORS: &str = "forwarder_feed_errors";
const POOL_HIT_RATIO: &str = "forwarder_pool_hit_ratio";
const EDGE_DEPTH: &str = "forwarder_edge_depth";

/// Initialize metrics descriptions.
///
/// Call this once at application startup. Safe to call multiple times.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        RECORDS_RECEIVED,
        Unit::Count,
        "Messages taken from the feed by sources"
    );
    metrics::describe_counter!(
        RECORDS_FORWARDED,
        Unit::Count,
        "Records passed downstream by transforms"
    );
    metrics::describe_counter!(
        RECORDS_WRITTEN,
        Unit::Count,
        "Records accepted by the time-series client"
    );
    metrics::describe_counter!(
        RECORDS_DISCARDED,
        Unit::Count,
        "Records dropped because they were oversize or malformed"
    );
    metrics::describe_counter!(WRITE_ERRORS, Unit::Count, "Failed sink writes");
    metrics::describe_counter!(
        FEED_ERRORS,
        Unit::Count,
        "Errors reported by the message feed"
    );
    metrics::describe_gauge!(
        POOL_HIT_RATIO,
        "Fraction of record acquisitions served by reuse, from 0 to 1"
    );
    metrics::describe_gauge!(EDGE_DEPTH, Unit::Count, "Records waiting in an edge");
}

/// Record the current record pool hit ratio.
#[inline]
pub fn record_pool_hit_ratio(ratio: f64) {
    gauge!(POOL_HIT_RATIO).set(ratio);
}

/// Record the number of records waiting in an edge.
#[inline]
pub fn record_edge_depth(edge: &str, depth: usize) {
    gauge!(EDGE_DEPTH, "edge" => edge.to_string()).set(depth as f64);
}

/// Counters for one pipeline stage, labelled once at construction.
#[derive(Clone)]
pub struct StageMetrics {
    pipeline: String,
    stage: String,
    received: Counter,
    forwarded: Counter,
    written: Counter,
    discarded: Counter,
    write_errors: Counter,
    feed_errors: Counter,
}

impl StageMetrics {
    /// Create a metrics collector for `stage` in `pipeline`.
    pub fn new(pipeline: &str, stage: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            stage: stage.to_string(),
            received: counter!(
                RECORDS_RECEIVED,
                "pipeline" => pipeline.to_string(),
                "stage" => stage.to_string()
            ),
            forwarded: counter!(
                RECORDS_FORWARDED,
                "pipeline" => pipeline.to_string(),
                "stage" => stage.to_string()
            ),
            written: counter!(
                RECORDS_WRITTEN,
                "pipeline" => pipeline.to_string(),
                "stage" => stage.to_string()
            ),
            discarded: counter!(
                RECORDS_DISCARDED,
                "pipeline" => pipeline.to_string(),
                "stage" => stage.to_string()
            ),
            write_errors: counter!(
                WRITE_ERRORS,
                "pipeline" => pipeline.to_string(),
                "stage" => stage.to_string()
            ),
            feed_errors: counter!(
                FEED_ERRORS,
                "pipeline" => pipeline.to_string(),
                "stage" => stage.to_string()
            ),
        }
    }

    /// A message was taken from the feed.
    #[inline]
    pub fn record_received(&self) {
        self.received.increment(1);
    }

    /// A record was passed to the next stage.
    #[inline]
    pub fn record_forwarded(&self) {
        self.forwarded.increment(1);
    }

    /// A record was accepted by the sink client.
    #[inline]
    pub fn record_written(&self) {
        self.written.increment(1);
    }

    /// A record was dropped without reaching the sink.
    #[inline]
    pub fn record_discarded(&self) {
        self.discarded.increment(1);
    }

    /// A sink write failed.
    #[inline]
    pub fn record_write_error(&self) {
        self.write_errors.increment(1);
    }

    /// The feed reported an error.
    #[inline]
    pub fn record_feed_error(&self) {
        self.feed_errors.increment(1);
    }

    /// Get the pipeline name.
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Get the stage name.
    pub fn stage(&self) -> &str {
        &self.stage
    }
}

impl std::fmt::Debug for StageMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageMetrics")
            .field("pipeline", &self.pipeline)
            .field("stage", &self.stage)
            .finish()
    }
}
