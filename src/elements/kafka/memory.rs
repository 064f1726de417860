//! In-process consumer group.
//!
//! Messages produced with [`MemoryConsumerGroup::produce`] are delivered to
//! whichever session is consuming, in production order. Commits are
//! recorded so callers can see what was acknowledged. Failures can be
//! injected for the connect, consume and error-stream paths.

use super::consumer::{ConsumerGroup, ConsumerGroupCreator, FeedMessage, MessageHandler};
use super::settings::ConsumerConfig;
use crate::error::{Error, Result};
use crate::record::Ack;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

struct Pending {
    topic: Arc<str>,
    offset: i64,
    payload: Bytes,
}

/// A committed message position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Topic of the message.
    pub topic: String,
    /// Partition of the message.
    pub partition: i32,
    /// Offset of the message.
    pub offset: i64,
}

/// In-memory consumer group with a single partition per topic.
pub struct MemoryConsumerGroup {
    queue_tx: kanal::AsyncSender<Pending>,
    queue_rx: kanal::AsyncReceiver<Pending>,
    errors_tx: kanal::AsyncSender<Error>,
    errors_rx: Mutex<Option<kanal::AsyncReceiver<Error>>>,
    next_offsets: Mutex<HashMap<Arc<str>, i64>>,
    commits: Arc<Mutex<Vec<Commit>>>,
    consume_failures: AtomicUsize,
    consume_calls: AtomicUsize,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryConsumerGroup {
    /// Create an empty group.
    pub fn new() -> Arc<Self> {
        let (queue_tx, queue_rx) = kanal::unbounded_async();
        let (errors_tx, errors_rx) = kanal::unbounded_async();
        Arc::new(Self {
            queue_tx,
            queue_rx,
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            next_offsets: Mutex::new(HashMap::new()),
            commits: Arc::new(Mutex::new(Vec::new())),
            consume_failures: AtomicUsize::new(0),
            consume_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Append a message to `topic` and return its offset.
    pub fn produce(&self, topic: &str, payload: impl Into<Bytes>) -> i64 {
        let (topic, offset) = {
            let mut offsets = lock(&self.next_offsets);
            let topic: Arc<str> = match offsets.get_key_value(topic) {
                Some((key, _)) => key.clone(),
                None => Arc::from(topic),
            };
            let next = offsets.entry(topic.clone()).or_insert(0);
            let offset = *next;
            *next += 1;
            (topic, offset)
        };
        // Unbounded; fails only if the receiver is gone, which it never is.
        let _ = self.queue_tx.try_send(Pending {
            topic,
            offset,
            payload: payload.into(),
        });
        offset
    }

    /// Make the next `n` calls to `consume` fail.
    pub fn fail_next_consumes(&self, n: usize) {
        self.consume_failures.store(n, Ordering::SeqCst);
    }

    /// Report an asynchronous client error.
    pub fn push_error(&self, error: Error) {
        let _ = self.errors_tx.try_send(error);
    }

    /// Messages produced but not yet delivered.
    pub fn pending(&self) -> usize {
        self.queue_rx.len()
    }

    /// Reported errors nobody has read yet.
    pub fn pending_errors(&self) -> usize {
        self.errors_tx.len()
    }

    /// Positions committed so far, in commit order.
    pub fn commits(&self) -> Vec<Commit> {
        lock(&self.commits).clone()
    }

    /// Number of commits so far.
    pub fn commit_count(&self) -> usize {
        lock(&self.commits).len()
    }

    /// Number of times `consume` was called.
    pub fn consume_calls(&self) -> usize {
        self.consume_calls.load(Ordering::SeqCst)
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn commit_for(&self, topic: &Arc<str>, offset: i64) -> Ack {
        let commits = self.commits.clone();
        let commit = Commit {
            topic: topic.to_string(),
            partition: 0,
            offset,
        };
        Ack::new(move || lock(&commits).push(commit))
    }
}

#[async_trait]
impl ConsumerGroup for MemoryConsumerGroup {
    async fn consume(
        &self,
        topics: &[String],
        handler: &dyn MessageHandler,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.consume_calls.fetch_add(1, Ordering::SeqCst);

        if self.is_closed() {
            return Err(Error::Transport("consumer group is closed".into()));
        }
        let injected = self
            .consume_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::Transport("injected consume failure".into()));
        }

        loop {
            let pending = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                pending = self.queue_rx.recv() => pending
                    .map_err(|_| Error::Transport("message queue closed".into()))?,
            };

            if !topics.iter().any(|t| **t == *pending.topic) {
                tracing::debug!(topic = %pending.topic, "skipping message of unsubscribed topic");
                continue;
            }

            let commit = self.commit_for(&pending.topic, pending.offset);
            let message = FeedMessage::new(pending.topic, 0, pending.offset, pending.payload, commit);
            if let Err(e) = handler.handle(message).await {
                tracing::error!(error = %e, "handle message failed");
            }
        }
    }

    fn take_errors(&self) -> Option<kanal::AsyncReceiver<Error>> {
        lock(&self.errors_rx).take()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Creator handing out one shared [`MemoryConsumerGroup`].
pub struct MemoryConsumerCreator {
    group: Arc<MemoryConsumerGroup>,
    connect_failures: AtomicUsize,
    connects: AtomicUsize,
    last_request: Mutex<Option<(Vec<String>, String, ConsumerConfig)>>,
}

impl MemoryConsumerCreator {
    /// Create a creator for `group`.
    pub fn new(group: Arc<MemoryConsumerGroup>) -> Arc<Self> {
        Arc::new(Self {
            group,
            connect_failures: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Number of connection attempts, failed ones included.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Brokers, group and options of the latest connection attempt.
    pub fn last_request(&self) -> Option<(Vec<String>, String, ConsumerConfig)> {
        lock(&self.last_request).clone()
    }
}

#[async_trait]
impl ConsumerGroupCreator for MemoryConsumerCreator {
    async fn create(
        &self,
        brokers: &[String],
        group: &str,
        config: &ConsumerConfig,
    ) -> Result<Arc<dyn ConsumerGroup>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_request) = Some((brokers.to_vec(), group.to_string(), config.clone()));

        let injected = self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::Resource(format!("cannot reach brokers {brokers:?}")));
        }
        Ok(self.group.clone())
    }
}
