//! Stage runtime context.
//!
//! The context is handed to plugin factories and gives stages access to
//! services shared across the pipeline.

use crate::memory::RecordPool;
use std::sync::Arc;

/// Shared services for the stages of one pipeline.
#[derive(Clone)]
pub struct StageContext {
    /// Name of the pipeline the stage belongs to.
    pipeline: Arc<str>,
    /// Record pool shared by the source and the sink.
    pool: Arc<RecordPool>,
}

impl StageContext {
    /// Create a context for `pipeline` sharing `pool`.
    pub fn new(pipeline: impl Into<Arc<str>>, pool: Arc<RecordPool>) -> Self {
        Self {
            pipeline: pipeline.into(),
            pool,
        }
    }

    /// Get the pipeline name.
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Get the shared record pool.
    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.pool
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("pipeline", &self.pipeline)
            .field("pool", &self.pool.stats())
            .finish()
    }
}
