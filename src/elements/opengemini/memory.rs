//! In-process write client.
//!
//! [`MemoryWriteClient`] keeps every accepted line so callers can see what
//! the sink wrote. Failures can be injected per client.

use super::client::{WriteClient, WriteClientCreator};
use super::settings::ClientSettings;
use crate::error::{Error, Result};
use crate::observability::StageMetrics;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write client that stores lines in memory.
pub struct MemoryWriteClient {
    url: Url,
    lines: Mutex<Vec<Bytes>>,
    writes: AtomicUsize,
    flushes: AtomicUsize,
    fail_next: AtomicUsize,
    fail_all: AtomicBool,
    closed: AtomicBool,
}

impl MemoryWriteClient {
    /// Create a client reporting `url`.
    pub fn new(url: Url) -> Arc<Self> {
        Arc::new(Self {
            url,
            lines: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            fail_all: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make every write fail until turned off again.
    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Lines accepted so far, in write order.
    pub fn lines(&self) -> Vec<Bytes> {
        lock(&self.lines).clone()
    }

    /// Number of write calls, failed ones included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of flush calls.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl WriteClient for MemoryWriteClient {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn write(&self, payload: Bytes) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(Error::Transport(format!("write client for {} is closed", self.url)));
        }
        if self.should_fail() {
            return Err(Error::Transport(format!("write to {} failed", self.url)));
        }
        lock(&self.lines).push(payload);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates [`MemoryWriteClient`]s and remembers them.
#[derive(Default)]
pub struct MemoryClientCreator {
    clients: Mutex<Vec<Arc<MemoryWriteClient>>>,
    settings: Mutex<Option<ClientSettings>>,
    fail_creates: AtomicBool,
}

impl MemoryClientCreator {
    /// Create a creator with no clients yet.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every `create` call fail.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Clients created so far, in server order.
    pub fn clients(&self) -> Vec<Arc<MemoryWriteClient>> {
        lock(&self.clients).clone()
    }

    /// Lines accepted by all clients.
    pub fn lines(&self) -> Vec<Bytes> {
        self.clients().iter().flat_map(|c| c.lines()).collect()
    }

    /// Settings passed to the last `create` call.
    pub fn last_settings(&self) -> Option<ClientSettings> {
        lock(&self.settings).clone()
    }
}

impl WriteClientCreator for MemoryClientCreator {
    fn create(
        &self,
        url: &Url,
        settings: &ClientSettings,
        _metrics: &StageMetrics,
    ) -> Result<Arc<dyn WriteClient>> {
        *lock(&self.settings) = Some(settings.clone());
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Error::Resource(format!("cannot create client for {url}")));
        }
        let client = MemoryWriteClient::new(url.clone());
        lock(&self.clients).push(client.clone());
        Ok(client as Arc<dyn WriteClient>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failures() {
        let client = MemoryWriteClient::new(Url::parse("http://a:8086").unwrap());
        client.fail_next_writes(1);

        assert!(client.write(Bytes::from_static(b"x v=1")).await.is_err());
        client.write(Bytes::from_static(b"x v=2")).await.unwrap();
        assert_eq!(client.lines(), vec![Bytes::from_static(b"x v=2")]);
        assert_eq!(client.writes(), 2);

        client.close().await.unwrap();
        assert!(client.write(Bytes::from_static(b"x v=3")).await.is_err());
    }
}
