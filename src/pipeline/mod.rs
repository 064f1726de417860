//! Pipeline assembly and lifecycle.
//!
//! - [`Pipeline`]: a source, a transform and a sink joined by two edges
//! - [`StageState`]: per-stage lifecycle state tracked by the pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use forwarder::config::Config;
//! use forwarder::pipeline::Pipeline;
//! use forwarder::plugin::PluginRegistry;
//!
//! let config = Config::from_file("forwarder.toml")?;
//! let registry = PluginRegistry::with_builtins();
//! let mut pipeline = Pipeline::from_config_with_new_pool(&config, &registry)?;
//!
//! pipeline.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```

mod factory;
mod graph;

pub use graph::{Pipeline, StageState};
