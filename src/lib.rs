//! # Forwarder
//!
//! A data-forwarding pipeline: records flow from a message-queue source,
//! through a transform, into a time-series sink.
//!
//! A pipeline is exactly one [`Source`](element::Source), one
//! [`Transform`](element::Transform) and one [`Sink`](element::Sink),
//! chained by two bounded [`Edge`](link::Edge)s. Stages are looked up by
//! name in a [`PluginRegistry`](plugin::PluginRegistry) from the sections
//! of a TOML [`Config`](config::Config).
//!
//! ## Features
//!
//! - **At-least-once delivery**: the feed offset is committed only when
//!   the sink acknowledges the record
//! - **Backpressure**: bounded edges and an in-flight limit on the source
//! - **Record recycling**: a shared [`RecordPool`](memory::RecordPool)
//! - **Observability**: `tracing` spans per stage, `metrics` counters
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use forwarder::prelude::*;
//! use forwarder::elements::kafka::KafkaSource;
//!
//! let config = Config::from_file("forwarder.toml")?;
//! init_logging(&config.logging)?;
//! init_metrics();
//!
//! let mut registry = PluginRegistry::with_builtins();
//! registry.register_source(KafkaSource::NAME, KafkaSource::factory(my_kafka_client));
//!
//! let mut pipeline = Pipeline::from_config_with_new_pool(&config, &registry)?;
//! pipeline.run_until(shutdown_signal()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod element;
pub mod elements;
pub mod error;
pub mod link;
pub mod memory;
pub mod metadata;
pub mod observability;
pub mod pipeline;
pub mod plugin;
pub mod record;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::element::{Node, Role, Sink, Source, StageContext, Transform};
    pub use crate::error::{Error, Result};
    pub use crate::link::{Edge, EdgeReceiver, EdgeSender};
    pub use crate::memory::RecordPool;
    pub use crate::metadata::Metadata;
    pub use crate::observability::{init_logging, init_metrics};
    pub use crate::pipeline::Pipeline;
    pub use crate::plugin::PluginRegistry;
    pub use crate::record::{Ack, Record};
}

pub use error::{Error, Result};
