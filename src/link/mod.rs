//! Links between pipeline stages.
//!
//! Stages of one pipeline run as tasks of the same process, so the only
//! link type is [`Edge`]: a bounded kanal channel that moves records from
//! one stage to the next.
//!
//! ## Semantics
//!
//! - **FIFO**: records come out in the order they went in, per producer
//! - **Backpressure**: a send waits while all slots are taken
//! - **Cancellation**: `send_or_cancel`/`recv_or_cancel` return as soon as
//!   the stage's token fires, even while waiting

mod edge;

pub use edge::{DEFAULT_EDGE_CAPACITY, Edge, EdgeReceiver, EdgeSender};
