//! Observability: logging setup, spans and metrics.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `forwarder_records_received` | Counter | Messages taken from the feed |
//! | `forwarder_records_forwarded` | Counter | Records passed on by transforms |
//! | `forwarder_records_written` | Counter | Records accepted by the sink client |
//! | `forwarder_records_discarded` | Counter | Oversize or malformed records |
//! | `forwarder_write_errors` | Counter | Failed sink writes |
//! | `forwarder_feed_errors` | Counter | Errors reported by the feed |
//! | `forwarder_pool_hit_ratio` | Gauge | Record pool reuse ratio |
//! | `forwarder_edge_depth` | Gauge | Records waiting in an edge |
//!
//! No exporter is installed here; the embedding application picks one.
//!
//! ## Tracing
//!
//! Stage tasks run inside a `stage` span carrying the pipeline name, stage
//! name and role, so every event they log is attributed.

mod metrics;
mod tracing_support;

pub use metrics::{StageMetrics, init_metrics, record_edge_depth, record_pool_hit_ratio};
pub use tracing_support::{LOG_ENV, init_logging, span_pipeline, span_stage, trace_state_change};
