//! The `kafka_consumer` source stage.

use super::consumer::{ConsumerGroup, ConsumerGroupCreator};
use super::handler::ConsumerHandler;
use super::settings::{ConnectionStrategy, KafkaSettings, ResolvedSettings};
use crate::config::parse_settings;
use crate::element::{Source, StageContext, TaskGroup};
use crate::error::{Error, Result};
use crate::link::EdgeSender;
use crate::memory::RecordPool;
use crate::observability::{StageMetrics, span_stage};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Source that consumes a Kafka consumer group.
///
/// Records carry the message's commit capability; the offset is committed
/// only when the sink acknowledges the record (at-least-once). Messages
/// longer than `max_message_len` are committed at once and dropped.
///
/// The consume loop re-joins the group whenever a session ends and waits
/// `reconnect_delay_ms` after a failed one. The client's asynchronous
/// error stream is drained to the log alongside it.
pub struct KafkaSource {
    settings: KafkaSettings,
    resolved: Option<ResolvedSettings>,
    creator: Arc<dyn ConsumerGroupCreator>,
    pool: Arc<RecordPool>,
    metrics: StageMetrics,
    tasks: TaskGroup,
}

impl KafkaSource {
    /// Plugin name.
    pub const NAME: &'static str = "kafka_consumer";

    /// Create a source using `creator` to reach the brokers.
    pub fn new(
        settings: KafkaSettings,
        creator: Arc<dyn ConsumerGroupCreator>,
        ctx: &StageContext,
    ) -> Self {
        Self {
            settings,
            resolved: None,
            creator,
            pool: ctx.pool().clone(),
            metrics: StageMetrics::new(ctx.pipeline(), Self::NAME),
            tasks: TaskGroup::new(Self::NAME, span_stage(ctx.pipeline(), Self::NAME, "source")),
        }
    }

    /// Factory for the plugin registry.
    pub fn factory(
        creator: Arc<dyn ConsumerGroupCreator>,
    ) -> impl Fn(&toml::Table, &StageContext) -> Result<Box<dyn Source>> + Send + Sync + 'static
    {
        move |settings: &toml::Table, ctx: &StageContext| {
            let settings: KafkaSettings = parse_settings(Self::NAME, settings)?;
            Ok(Box::new(Self::new(settings, creator.clone(), ctx)) as Box<dyn Source>)
        }
    }
}

#[async_trait]
impl Source for KafkaSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn init(&mut self) -> Result<()> {
        let resolved = self.settings.resolve()?;
        tracing::info!(
            brokers = ?resolved.brokers,
            group = %resolved.group,
            topics = ?resolved.topics,
            "kafka consumer configured"
        );
        self.resolved = Some(resolved);
        Ok(())
    }

    async fn start(&mut self, output: EdgeSender) -> Result<()> {
        let settings = self.resolved.clone().ok_or_else(|| Error::InvalidState {
            stage: Self::NAME.to_string(),
            operation: "start",
            state: "constructed",
        })?;

        let consumer = match settings.connection_strategy {
            ConnectionStrategy::Startup => Some(
                self.creator
                    .create(&settings.brokers, &settings.group, &settings.consumer)
                    .await
                    .map_err(|e| Error::Resource(format!("create consumer: {e}")))?,
            ),
            ConnectionStrategy::Defer => None,
        };

        let cancel = self.tasks.token();
        let handler = ConsumerHandler::new(
            output,
            self.pool.clone(),
            settings.max_message_len,
            settings.max_undelivered_messages,
            cancel.clone(),
            self.metrics.clone(),
        );
        let run = ConsumeLoop {
            settings,
            creator: self.creator.clone(),
            metrics: self.metrics.clone(),
            cancel,
        };

        self.tasks.spawn(run.run(consumer, handler))
    }

    async fn stop(&mut self) -> Result<()> {
        self.tasks.shutdown().await
    }
}

struct ConsumeLoop {
    settings: ResolvedSettings,
    creator: Arc<dyn ConsumerGroupCreator>,
    metrics: StageMetrics,
    cancel: CancellationToken,
}

impl ConsumeLoop {
    async fn run(self, consumer: Option<Arc<dyn ConsumerGroup>>, handler: ConsumerHandler) {
        let consumer = match consumer {
            Some(consumer) => consumer,
            None => match self.connect().await {
                Some(consumer) => consumer,
                None => return,
            },
        };

        tokio::join!(
            self.drain_errors(consumer.as_ref()),
            self.consume(consumer.as_ref(), &handler)
        );

        if let Err(e) = consumer.close().await {
            tracing::error!(error = %e, "closing consumer failed");
        }
        tracing::debug!("consume loop exited");
    }

    /// Connect in the background, retrying until connected or cancelled.
    async fn connect(&self) -> Option<Arc<dyn ConsumerGroup>> {
        let s = &self.settings;
        loop {
            match self.creator.create(&s.brokers, &s.group, &s.consumer).await {
                Ok(consumer) => return Some(consumer),
                Err(e) => {
                    tracing::error!(error = %e, "create consumer failed");
                    self.metrics.record_feed_error();
                }
            }
            if !self.backoff().await {
                return None;
            }
        }
    }

    async fn consume(&self, consumer: &dyn ConsumerGroup, handler: &ConsumerHandler) {
        while !self.cancel.is_cancelled() {
            match consumer
                .consume(&self.settings.topics, handler, &self.cancel)
                .await
            {
                // Session ended normally, e.g. a rebalance. Rejoin, but let
                // other tasks run first.
                Ok(()) => tokio::task::yield_now().await,
                Err(e) => {
                    tracing::error!(error = %e, "consume failed");
                    self.metrics.record_feed_error();
                    if !self.backoff().await {
                        break;
                    }
                }
            }
        }
    }

    async fn drain_errors(&self, consumer: &dyn ConsumerGroup) {
        let Some(errors) = consumer.take_errors() else {
            return;
        };
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                err = errors.recv() => match err {
                    Ok(e) => {
                        tracing::error!(error = %e, "consumer error");
                        self.metrics.record_feed_error();
                    }
                    Err(_) => break,
                },
            }
        }
    }

    /// Wait the reconnect delay. Returns `false` if cancelled meanwhile.
    async fn backoff(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.settings.reconnect_delay) => true,
        }
    }
}
