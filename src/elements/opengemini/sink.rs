//! The `openGemini` sink stage.

use super::client::{WriteClient, WriteClientCreator};
use super::settings::{OpenGeminiSettings, WriteErrorPolicy};
use crate::config::parse_settings;
use crate::element::{Sink, StageContext, TaskGroup};
use crate::error::{Error, Result};
use crate::link::EdgeReceiver;
use crate::memory::RecordPool;
use crate::observability::{StageMetrics, span_stage};
use crate::record::Record;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Sink that writes line protocol to openGemini servers.
///
/// Each record is written to the first server that accepts it; the others
/// are tried in configuration order. A written record is acknowledged. A
/// record no server accepted is acknowledged or left unacknowledged
/// according to `on_write_error`; an unacknowledged record is not
/// guaranteed to be read again, since a later acknowledgment commits past
/// it. Either way the wrapper goes back to the pool.
pub struct OpenGeminiSink {
    settings: OpenGeminiSettings,
    creator: Arc<dyn WriteClientCreator>,
    clients: Vec<Arc<dyn WriteClient>>,
    policy: WriteErrorPolicy,
    pool: Arc<RecordPool>,
    metrics: StageMetrics,
    tasks: TaskGroup,
}

impl OpenGeminiSink {
    /// Plugin name.
    pub const NAME: &'static str = "openGemini";

    /// Create a sink whose clients come from `creator`.
    pub fn new(
        settings: OpenGeminiSettings,
        creator: Arc<dyn WriteClientCreator>,
        ctx: &StageContext,
    ) -> Self {
        Self {
            settings,
            creator,
            clients: Vec::new(),
            policy: WriteErrorPolicy::default(),
            pool: ctx.pool().clone(),
            metrics: StageMetrics::new(ctx.pipeline(), Self::NAME),
            tasks: TaskGroup::new(Self::NAME, span_stage(ctx.pipeline(), Self::NAME, "sink")),
        }
    }

    /// Factory for the plugin registry.
    pub fn factory(
        creator: Arc<dyn WriteClientCreator>,
    ) -> impl Fn(&toml::Table, &StageContext) -> Result<Box<dyn Sink>> + Send + Sync + 'static {
        move |settings: &toml::Table, ctx: &StageContext| {
            let settings: OpenGeminiSettings = parse_settings(Self::NAME, settings)?;
            Ok(Box::new(Self::new(settings, creator.clone(), ctx)) as Box<dyn Sink>)
        }
    }

    /// Servers the sink writes to, in failover order. Empty before `init`.
    pub fn servers(&self) -> Vec<&url::Url> {
        self.clients.iter().map(|c| c.url()).collect()
    }
}

#[async_trait]
impl Sink for OpenGeminiSink {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn init(&mut self) -> Result<()> {
        let urls = self.settings.server_urls()?;
        self.policy = self.settings.write_error_policy()?;
        let client_settings = self.settings.client_settings();

        let mut clients = Vec::with_capacity(urls.len());
        for url in &urls {
            let client = self
                .creator
                .create(url, &client_settings, &self.metrics)
                .map_err(|e| Error::Resource(format!("openGemini: create client for {url}: {e}")))?;
            clients.push(client);
        }
        tracing::info!(
            servers = ?urls.iter().map(url::Url::as_str).collect::<Vec<_>>(),
            bucket = %client_settings.bucket(),
            policy = ?self.policy,
            "openGemini output configured"
        );
        self.clients = clients;
        Ok(())
    }

    async fn start(&mut self, input: EdgeReceiver) -> Result<()> {
        if self.clients.is_empty() {
            return Err(Error::InvalidState {
                stage: Self::NAME.to_string(),
                operation: "start",
                state: "constructed",
            });
        }

        let writer = Writer {
            clients: self.clients.clone(),
            policy: self.policy,
            pool: self.pool.clone(),
            metrics: self.metrics.clone(),
        };
        let cancel = self.tasks.token();

        self.tasks.spawn(async move {
            loop {
                let record = match input.recv_or_cancel(&cancel).await {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "input edge failed");
                        break;
                    }
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    () = writer.deliver(record) => {}
                }
            }
            tracing::debug!("openGemini write loop exited");
        })
    }

    async fn stop(&mut self) -> Result<()> {
        let result = self.tasks.shutdown().await;
        for client in &self.clients {
            if let Err(e) = client.close().await {
                tracing::error!(url = %client.url(), error = %e, "closing openGemini client failed");
            }
        }
        result
    }
}

struct Writer {
    clients: Vec<Arc<dyn WriteClient>>,
    policy: WriteErrorPolicy,
    pool: Arc<RecordPool>,
    metrics: StageMetrics,
}

impl Writer {
    async fn deliver(&self, mut record: Record) {
        match self.write_any(record.payload().clone()).await {
            Ok(()) => {
                self.metrics.record_written();
                record.acknowledge();
            }
            Err(e) => {
                self.metrics.record_write_error();
                tracing::warn!(
                    error = %e,
                    offset = record.metadata().offset,
                    policy = ?self.policy,
                    "writing record failed"
                );
                if self.policy == WriteErrorPolicy::Ack {
                    record.acknowledge();
                }
            }
        }
        self.pool.release(record);
    }

    /// Try each server in order until one accepts the payload.
    async fn write_any(&self, payload: Bytes) -> Result<()> {
        let mut last = None;
        for client in &self.clients {
            match client.write(payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(url = %client.url(), error = %e, "write failed, trying next server");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| Error::Transport("no openGemini server configured".into())))
    }
}
