//! Turns feed messages into records on the source's output edge.

use super::consumer::{FeedMessage, MessageHandler};
use crate::error::{Error, Result};
use crate::link::EdgeSender;
use crate::memory::RecordPool;
use crate::metadata::Metadata;
use crate::observability::StageMetrics;
use crate::record::Ack;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Handler shared by every session of one source.
///
/// Each accepted message becomes a pooled record whose acknowledgment
/// commits the message. At most `max_undelivered` records are in flight;
/// a permit is returned when the record is acknowledged or dropped.
pub struct ConsumerHandler {
    output: EdgeSender,
    pool: Arc<RecordPool>,
    max_message_len: usize,
    max_undelivered: usize,
    in_flight: Arc<Semaphore>,
    cancel: CancellationToken,
    metrics: StageMetrics,
    sequence: AtomicU64,
}

impl ConsumerHandler {
    /// Create a handler sending to `output`.
    pub fn new(
        output: EdgeSender,
        pool: Arc<RecordPool>,
        max_message_len: usize,
        max_undelivered: usize,
        cancel: CancellationToken,
        metrics: StageMetrics,
    ) -> Self {
        let max_undelivered = max_undelivered.max(1);
        Self {
            output,
            pool,
            max_message_len,
            max_undelivered,
            in_flight: Arc::new(Semaphore::new(max_undelivered)),
            cancel,
            metrics,
            sequence: AtomicU64::new(0),
        }
    }

    /// Records handed downstream and not yet acknowledged or dropped.
    pub fn in_flight(&self) -> usize {
        self.max_undelivered - self.in_flight.available_permits()
    }
}

#[async_trait]
impl MessageHandler for ConsumerHandler {
    async fn handle(&self, message: FeedMessage) -> Result<()> {
        self.metrics.record_received();

        if self.max_message_len != 0 && message.len() > self.max_message_len {
            let len = message.len();
            message.mark();
            self.metrics.record_discarded();
            return Err(Error::Delivery(format!(
                "message exceeds max_message_len (actual {len}, max {})",
                self.max_message_len
            )));
        }

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            permit = self.in_flight.clone().acquire_owned() => permit
                .map_err(|_| Error::Transport("in-flight limiter closed".into()))?,
        };

        let metadata = Metadata::with_sequence(self.sequence.fetch_add(1, Ordering::Relaxed))
            .with_position(message.topic.clone(), message.partition, message.offset);
        let (payload, commit) = message.into_commit();

        let mut record = self.pool.acquire();
        record.set_payload(payload);
        *record.metadata_mut() = metadata;
        record.set_ack(Ack::new(move || {
            commit.invoke();
            drop(permit);
        }));

        if !self.output.send_or_cancel(record, &self.cancel).await? {
            tracing::debug!("source cancelled with a record in hand");
        }
        Ok(())
    }
}
