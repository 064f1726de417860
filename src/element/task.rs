//! Task ownership for a running stage.

use crate::error::{Error, Result};
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// The tasks a stage spawned, plus the token that stops them.
///
/// Every loop spawned through the group should observe [`token`](Self::token)
/// around its suspension points. [`shutdown`](Self::shutdown) cancels the
/// token and awaits every task. Dropping the group cancels the token too,
/// so a stage that is never stopped does not leak running loops.
pub struct TaskGroup {
    stage: String,
    span: Span,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    /// Create an empty group for `stage`; spawned tasks run in `span`.
    pub fn new(stage: impl Into<String>, span: Span) -> Self {
        Self {
            stage: stage.into(),
            span,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Cancellation token shared by every task of the group.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn `task` on the current tokio runtime.
    ///
    /// Fails with a resource error when called outside a runtime.
    pub fn spawn<F>(&mut self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::Resource(format!("stage '{}' needs a tokio runtime: {e}", self.stage))
        })?;
        let handle = runtime.spawn(task.instrument(self.span.clone()));
        self.handles.push(handle);
        Ok(())
    }

    /// Number of tasks spawned and not yet joined.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no tasks are held.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel every task and wait for all of them to exit.
    ///
    /// A panicked task is reported as a resource error after the remaining
    /// tasks have been joined.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();

        let mut first_error = None;
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!(stage = %self.stage, "stage task panicked");
                    first_error.get_or_insert_with(|| {
                        Error::Resource(format!("stage '{}' task panicked", self.stage))
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("stage", &self.stage)
            .field("tasks", &self.handles.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
