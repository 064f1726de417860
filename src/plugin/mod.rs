//! Plugin registration.
//!
//! Plugins are stage factories registered by name, one namespace per role,
//! mirroring the `inputs`, `parsers` and `outputs` sections of the
//! configuration file. The pipeline looks names up here when it is built
//! from a [`Config`](crate::config::Config).

mod registry;

pub use registry::{PluginRegistry, SinkFactory, SourceFactory, TransformFactory};
