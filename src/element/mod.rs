//! Stage system for forwarder pipelines.
//!
//! This module defines the stage traits and the types every stage uses:
//!
//! - [`Source`]: produces records (e.g. a message-queue consumer)
//! - [`Transform`]: passes records on, possibly changed or filtered
//! - [`Sink`]: consumes records (e.g. a time-series writer)
//! - [`Node`]: a stage of any role, as held by the pipeline
//!
//! # Design
//!
//! Stages follow "async lifecycle, owned tasks": `start()` spawns the
//! stage's loops into a [`TaskGroup`] and returns at once; `stop()` cancels
//! the group's token and joins its tasks. Loops only suspend on edge
//! operations or the feed, and select on the token at each of those points.

mod context;
mod task;
mod traits;

pub use context::StageContext;
pub use task::TaskGroup;
pub use traits::{Node, Role, Sink, Source, Transform};
