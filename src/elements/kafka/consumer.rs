//! Consumer-group client interface.
//!
//! The source does not talk to brokers itself. It asks a
//! [`ConsumerGroupCreator`] for a [`ConsumerGroup`] and lets the group
//! push messages into a [`MessageHandler`]. Implementations wrap a real
//! client library; [`MemoryConsumerGroup`](super::MemoryConsumerGroup) is
//! an in-process one.

use super::settings::ConsumerConfig;
use crate::error::{Error, Result};
use crate::record::Ack;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One message delivered by the consumer group.
#[derive(Debug)]
pub struct FeedMessage {
    /// Topic the message was read from.
    pub topic: Arc<str>,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Message value.
    pub payload: Bytes,
    commit: Ack,
}

impl FeedMessage {
    /// Create a message; `commit` marks its offset as consumed.
    pub fn new(
        topic: Arc<str>,
        partition: i32,
        offset: i64,
        payload: impl Into<Bytes>,
        commit: Ack,
    ) -> Self {
        Self {
            topic,
            partition,
            offset,
            payload: payload.into(),
            commit,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Mark the message consumed right away.
    pub fn mark(self) {
        self.commit.invoke();
    }

    /// Split into the payload and the commit capability.
    pub fn into_commit(self) -> (Bytes, Ack) {
        (self.payload, self.commit)
    }
}

/// Receives the messages of a consumer-group session.
///
/// An error concerns that one message only; the group logs it and keeps
/// delivering.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Take ownership of one message.
    async fn handle(&self, message: FeedMessage) -> Result<()>;
}

/// A joined consumer group.
#[async_trait]
pub trait ConsumerGroup: Send + Sync {
    /// Run one session: deliver messages of `topics` to `handler`.
    ///
    /// Returns `Ok(())` when `cancel` fires or the session ends normally
    /// (e.g. a rebalance), and an error when the session failed. The
    /// caller decides whether to call again.
    async fn consume(
        &self,
        topics: &[String],
        handler: &dyn MessageHandler,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Take the stream of asynchronous client errors.
    ///
    /// Returns `None` if the stream was already taken or is not supported.
    fn take_errors(&self) -> Option<kanal::AsyncReceiver<Error>>;

    /// Leave the group and release the client.
    async fn close(&self) -> Result<()>;
}

/// Connects consumer groups.
#[async_trait]
pub trait ConsumerGroupCreator: Send + Sync {
    /// Join `group` on `brokers`.
    async fn create(
        &self,
        brokers: &[String],
        group: &str,
        config: &ConsumerConfig,
    ) -> Result<Arc<dyn ConsumerGroup>>;
}
