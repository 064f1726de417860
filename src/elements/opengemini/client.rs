//! Time-series write clients.
//!
//! The sink writes through the [`WriteClient`] interface. [`HttpWriteClient`]
//! speaks the line-protocol HTTP write API; writes are buffered and a
//! background task sends them in batches.

use super::settings::ClientSettings;
use crate::error::{Error, Result};
use crate::observability::StageMetrics;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

/// A connection to one time-series server.
#[async_trait]
pub trait WriteClient: Send + Sync {
    /// Server this client writes to.
    fn url(&self) -> &Url;

    /// Hand over one payload of line protocol.
    async fn write(&self, payload: Bytes) -> Result<()>;

    /// Send everything buffered so far.
    async fn flush(&self) -> Result<()>;

    /// Flush and release the connection.
    async fn close(&self) -> Result<()>;
}

/// Builds write clients for the sink.
pub trait WriteClientCreator: Send + Sync {
    /// Create a client for `url`. Flush failures are counted on `metrics`.
    fn create(
        &self,
        url: &Url,
        settings: &ClientSettings,
        metrics: &StageMetrics,
    ) -> Result<Arc<dyn WriteClient>>;
}

/// Creates [`HttpWriteClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientCreator;

impl WriteClientCreator for HttpClientCreator {
    fn create(
        &self,
        url: &Url,
        settings: &ClientSettings,
        metrics: &StageMetrics,
    ) -> Result<Arc<dyn WriteClient>> {
        Ok(Arc::new(HttpWriteClient::spawn(url, settings, metrics.clone())?))
    }
}

/// Counters of an [`HttpWriteClient`].
#[derive(Debug, Default)]
pub struct HttpClientStats {
    lines_sent: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
}

impl HttpClientStats {
    /// Lines delivered to the server.
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent.load(Ordering::Relaxed)
    }

    /// Successful requests.
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    /// Failed requests; their lines are dropped.
    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }
}

type FlushReply = oneshot::Sender<Result<()>>;

/// Buffered client for the `/api/v2/write` endpoint.
///
/// `write` only enqueues; it waits when the buffer holds two batches. A
/// background task posts a batch once `batch_size` lines are buffered or
/// `flush_interval` has passed. A failed batch is logged, counted and
/// dropped.
pub struct HttpWriteClient {
    url: Url,
    queue: kanal::AsyncSender<Bytes>,
    flushes: kanal::AsyncSender<FlushReply>,
    stats: Arc<HttpClientStats>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpWriteClient {
    /// Create the client and start its flush task on the current runtime.
    pub fn spawn(url: &Url, settings: &ClientSettings, metrics: StageMetrics) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Resource(format!("write client for {url} needs a tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Resource(format!("create http client for {url}: {e}")))?;

        let batch_size = settings.batch_size.max(1);
        let (queue, queue_rx) = kanal::bounded_async(batch_size * 2);
        let (flushes, flush_rx) = kanal::bounded_async(1);
        let stats = Arc::new(HttpClientStats::default());
        let cancel = CancellationToken::new();

        let batcher = Batcher {
            http,
            endpoint: write_endpoint(url, settings)?,
            token: settings.token(),
            batch_size,
            flush_interval: settings.flush_interval,
            lines: Vec::with_capacity(batch_size),
            stats: stats.clone(),
            metrics,
        };
        let span = tracing::debug_span!("write_client", url = %url);
        let task = runtime.spawn(
            batcher
                .run(queue_rx, flush_rx, cancel.clone())
                .instrument(span),
        );

        Ok(Self {
            url: url.clone(),
            queue,
            flushes,
            stats,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Request counters.
    pub fn stats(&self) -> &HttpClientStats {
        &self.stats
    }

    fn closed(&self) -> Error {
        Error::Transport(format!("write client for {} is closed", self.url))
    }
}

#[async_trait]
impl WriteClient for HttpWriteClient {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn write(&self, payload: Bytes) -> Result<()> {
        self.queue.send(payload).await.map_err(|_| self.closed())
    }

    async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.flushes.send(reply).await.map_err(|_| self.closed())?;
        done.await.map_err(|_| self.closed())?
    }

    async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.await
                .map_err(|e| Error::Resource(format!("write client for {}: {e}", self.url)))?;
        }
        Ok(())
    }
}

impl Drop for HttpWriteClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// `{url}/api/v2/write?bucket={db}/{rp}&precision=ns`
fn write_endpoint(url: &Url, settings: &ClientSettings) -> Result<Url> {
    let mut endpoint = url.clone();
    endpoint
        .path_segments_mut()
        .map_err(|_| Error::Configuration(format!("url {url} cannot take a path")))?
        .pop_if_empty()
        .extend(["api", "v2", "write"]);
    endpoint
        .query_pairs_mut()
        .append_pair("bucket", &settings.bucket())
        .append_pair("precision", "ns");
    Ok(endpoint)
}

struct Batcher {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
    batch_size: usize,
    flush_interval: Duration,
    lines: Vec<Bytes>,
    stats: Arc<HttpClientStats>,
    metrics: StageMetrics,
}

impl Batcher {
    async fn run(
        mut self,
        queue: kanal::AsyncReceiver<Bytes>,
        flushes: kanal::AsyncReceiver<FlushReply>,
        cancel: CancellationToken,
    ) {
        let start = tokio::time::Instant::now() + self.flush_interval;
        let mut ticker = tokio::time::interval_at(start, self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                reply = flushes.recv() => match reply {
                    Ok(reply) => {
                        self.drain(&queue);
                        let result = self.flush().await;
                        let _ = reply.send(result);
                    }
                    Err(_) => break,
                },
                line = queue.recv() => match line {
                    Ok(line) => {
                        self.lines.push(line);
                        if self.lines.len() >= self.batch_size {
                            self.flush_logged().await;
                        }
                    }
                    Err(_) => break,
                },
                _ = ticker.tick() => self.flush_logged().await,
            }
        }

        self.drain(&queue);
        self.flush_logged().await;
        tracing::debug!("write client stopped");
    }

    /// Move every queued line into the batch.
    fn drain(&mut self, queue: &kanal::AsyncReceiver<Bytes>) {
        while let Ok(Some(line)) = queue.try_recv() {
            self.lines.push(line);
        }
    }

    async fn flush_logged(&mut self) {
        if let Err(e) = self.flush().await {
            tracing::error!(error = %e, "flushing batch failed");
        }
    }

    async fn flush(&mut self) -> Result<()> {
        if self.lines.is_empty() {
            return Ok(());
        }
        let lines = std::mem::take(&mut self.lines);
        let count = lines.len() as u64;

        let mut body = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in &lines {
            let line: &[u8] = line;
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            body.extend_from_slice(line);
            body.push(b'\n');
        }

        let result = self
            .http
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, &self.token)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                self.stats.lines_sent.fetch_add(count, Ordering::Relaxed);
                self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(lines = count, "batch written");
                Ok(())
            }
            Err(e) => {
                self.stats.batches_failed.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_write_error();
                Err(Error::Transport(format!(
                    "write {count} line(s) to {}: {e}",
                    self.endpoint
                )))
            }
        }
    }
}
