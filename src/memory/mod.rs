//! Memory management for the forwarder.
//!
//! - [`RecordPool`]: recycles record wrappers between the source, which
//!   acquires them, and the sink, which releases them
//! - [`PoolStats`]: a snapshot of its counters

mod record_pool;

pub use record_pool::{DEFAULT_MAX_IDLE, PoolStats, RecordPool};
