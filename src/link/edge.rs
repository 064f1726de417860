//! Bounded in-process edges between pipeline stages, using kanal channels.

use crate::error::{Error, Result};
use crate::record::Record;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Slot count of an edge when the configuration does not override it.
pub const DEFAULT_EDGE_CAPACITY: usize = 10;

/// A bounded FIFO transport from one producing stage to one consuming stage.
///
/// The edge keeps both halves of a kanal channel alive for as long as it
/// exists, so it never reports "closed" while the pipeline owns it. Stages
/// stop through their own cancellation, not by closing edges.
///
/// # Example
///
/// ```rust,ignore
/// use forwarder::link::Edge;
/// use forwarder::record::Record;
///
/// let edge = Edge::bounded("kafka_consumer", 4);
/// let (tx, rx) = (edge.sender(), edge.receiver());
///
/// tx.send(Record::from_bytes("a")).await?;
/// tx.send(Record::from_bytes("b")).await?;
///
/// assert_eq!(rx.recv().await?.as_bytes(), b"a");
/// assert_eq!(rx.recv().await?.as_bytes(), b"b");
/// ```
#[derive(Clone)]
pub struct Edge {
    name: Arc<str>,
    capacity: usize,
    tx: kanal::AsyncSender<Record>,
    rx: kanal::AsyncReceiver<Record>,
}

impl Edge {
    /// Create an edge with a fixed number of slots.
    ///
    /// `name` is a diagnostic label, conventionally the upstream stage name.
    pub fn bounded(name: impl Into<Arc<str>>, capacity: usize) -> Self {
        let (tx, rx) = kanal::bounded_async(capacity);
        Self {
            name: name.into(),
            capacity,
            tx,
            rx,
        }
    }

    /// Diagnostic name of this edge.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots, fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records waiting in the edge.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no records are waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Producer half. May be cloned for additional producers.
    pub fn sender(&self) -> EdgeSender {
        EdgeSender {
            name: self.name.clone(),
            inner: self.tx.clone(),
        }
    }

    /// Consumer half.
    pub fn receiver(&self) -> EdgeReceiver {
        EdgeReceiver {
            name: self.name.clone(),
            inner: self.rx.clone(),
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// Producer half of an [`Edge`].
#[derive(Clone)]
pub struct EdgeSender {
    name: Arc<str>,
    inner: kanal::AsyncSender<Record>,
}

impl EdgeSender {
    /// Enqueue a record, waiting while the edge is full.
    pub async fn send(&self, record: Record) -> Result<()> {
        self.inner
            .send(record)
            .await
            .map_err(|_| Error::Transport(format!("edge '{}' closed", self.name)))
    }

    /// Enqueue a record unless `cancel` fires first.
    ///
    /// Returns `Ok(false)` when cancelled; the record is dropped and its
    /// pending acknowledgment with it.
    pub async fn send_or_cancel(&self, record: Record, cancel: &CancellationToken) -> Result<bool> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(false),
            res = self.send(record) => res.map(|()| true),
        }
    }

    /// Name of the edge.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records waiting in the edge.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no records are waiting.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Consumer half of an [`Edge`].
#[derive(Clone)]
pub struct EdgeReceiver {
    name: Arc<str>,
    inner: kanal::AsyncReceiver<Record>,
}

impl EdgeReceiver {
    /// Dequeue the oldest record, waiting while the edge is empty.
    pub async fn recv(&self) -> Result<Record> {
        self.inner
            .recv()
            .await
            .map_err(|_| Error::Transport(format!("edge '{}' closed", self.name)))
    }

    /// Dequeue the oldest record unless `cancel` fires first.
    ///
    /// Returns `Ok(None)` when cancelled.
    pub async fn recv_or_cancel(&self, cancel: &CancellationToken) -> Result<Option<Record>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            res = self.recv() => res.map(Some),
        }
    }

    /// Dequeue without waiting.
    pub fn try_recv(&self) -> Option<Record> {
        match self.inner.try_recv() {
            Ok(Some(record)) => Some(record),
            _ => None,
        }
    }

    /// Name of the edge.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records waiting in the edge.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no records are waiting.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn record(seq: u64) -> Record {
        let mut record = Record::from_bytes(seq.to_le_bytes().to_vec());
        record.metadata_mut().sequence = seq;
        record
    }

    #[tokio::test]
    async fn test_edge_fifo() {
        let edge = Edge::bounded("src", 16);
        let (tx, rx) = (edge.sender(), edge.receiver());

        for payload in ["A", "B", "C"] {
            tx.send(Record::from_bytes(payload)).await.unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().await.unwrap().as_bytes().to_vec());
        }
        assert_eq!(received, vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]);
    }

    #[tokio::test]
    async fn test_edge_backpressure() {
        let k = 3;
        let edge = Edge::bounded("src", k);
        let (tx, rx) = (edge.sender(), edge.receiver());

        for i in 0..k as u64 {
            tx.send(record(i)).await.unwrap();
        }
        assert_eq!(edge.len(), k);

        // The (k+1)-th send cannot complete while the edge is full.
        let blocked = timeout(Duration::from_millis(50), tx.send(record(k as u64))).await;
        assert!(blocked.is_err());

        let producer = tokio::spawn(async move { tx.send(record(k as u64)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(rx.recv().await.unwrap().metadata().sequence, 0);
        timeout(Duration::from_secs(1), producer)
            .await
            .expect("send should complete after a receive")
            .unwrap()
            .unwrap();
        assert_eq!(edge.len(), k);
    }

    #[tokio::test]
    async fn test_edge_multiple_producers_keep_own_order() {
        let edge = Edge::bounded("src", 4);
        let rx = edge.receiver();

        let mut producers = Vec::new();
        for p in 0..3u64 {
            let tx = edge.sender();
            producers.push(tokio::spawn(async move {
                for i in 0..50u64 {
                    tx.send(record(p * 1000 + i)).await.unwrap();
                }
            }));
        }

        let mut last = [None::<u64>; 3];
        for _ in 0..150 {
            let seq = rx.recv().await.unwrap().metadata().sequence;
            let producer = (seq / 1000) as usize;
            let i = seq % 1000;
            if let Some(prev) = last[producer] {
                assert!(i > prev, "producer {producer} out of order");
            }
            last[producer] = Some(i);
        }

        for p in producers {
            p.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_send_or_cancel_unblocks_full_edge() {
        let edge = Edge::bounded("src", 1);
        let tx = edge.sender();
        tx.send(record(0)).await.unwrap();

        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { tx.send_or_cancel(record(1), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let sent = timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
        assert!(!sent);
        assert_eq!(edge.len(), 1);
    }

    #[tokio::test]
    async fn test_recv_or_cancel() {
        let edge = Edge::bounded("src", 2);
        let rx = edge.receiver();
        let cancel = CancellationToken::new();

        edge.sender().send(record(5)).await.unwrap();
        let got = rx.recv_or_cancel(&cancel).await.unwrap();
        assert_eq!(got.unwrap().metadata().sequence, 5);

        cancel.cancel();
        assert!(rx.recv_or_cancel(&cancel).await.unwrap().is_none());
    }

    #[test]
    fn test_edge_properties() {
        let edge = Edge::bounded("kafka_consumer", 10);
        assert_eq!(edge.name(), "kafka_consumer");
        assert_eq!(edge.capacity(), 10);
        assert!(edge.is_empty());
        assert_eq!(edge.sender().name(), "kafka_consumer");
        assert!(edge.receiver().try_recv().is_none());
    }
}
