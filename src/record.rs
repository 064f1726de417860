//! Record types passed between pipeline stages.

use crate::metadata::Metadata;
use bytes::Bytes;

/// Acknowledge capability bound to one feed delivery.
///
/// Invoking it tells the upstream feed that the message has been durably
/// handed on (for Kafka: the offset is marked for commit). Consuming `self`
/// makes a second invocation impossible.
pub struct Ack(Box<dyn FnOnce() + Send + Sync + 'static>);

impl Ack {
    /// Wrap a commit callback.
    pub fn new(commit: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Box::new(commit))
    }

    /// An acknowledgment that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Run the commit callback.
    pub fn invoke(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Ack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Ack")
    }
}

/// One unit of payload in transit.
///
/// A record is owned by exactly one stage at a time; sending it through an
/// [`Edge`](crate::link::Edge) moves it. The wrapper is boxed so moves are
/// a pointer copy and the [`RecordPool`](crate::memory::RecordPool) can
/// recycle the allocation.
///
/// # Example
///
/// ```rust
/// use forwarder::record::{Ack, Record};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let committed = Arc::new(AtomicBool::new(false));
/// let flag = committed.clone();
///
/// let mut record = Record::from_bytes("cpu,host=a usage=0.5");
/// record.set_ack(Ack::new(move || flag.store(true, Ordering::SeqCst)));
///
/// assert!(record.acknowledge());
/// assert!(!record.acknowledge());
/// assert!(committed.load(Ordering::SeqCst));
/// ```
pub struct Record {
    inner: Box<RecordInner>,
}

#[derive(Default)]
struct RecordInner {
    payload: Bytes,
    ack: Option<Ack>,
    metadata: Metadata,
}

impl Record {
    /// Create an empty record with no payload and no acknowledgment.
    pub fn new() -> Self {
        Self {
            inner: Box::default(),
        }
    }

    /// Create a record holding `payload`.
    pub fn from_bytes(payload: impl Into<Bytes>) -> Self {
        let mut record = Self::new();
        record.set_payload(payload);
        record
    }

    /// Get the payload.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.inner.payload
    }

    /// Get the payload as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner.payload
    }

    /// Replace the payload.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.inner.payload = payload.into();
    }

    /// Take the payload, leaving the record empty.
    pub fn take_payload(&mut self) -> Bytes {
        std::mem::take(&mut self.inner.payload)
    }

    /// Length of the payload in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.payload.len()
    }

    /// Whether the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.payload.is_empty()
    }

    /// Get a reference to the metadata.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Get a mutable reference to the metadata.
    #[inline]
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.inner.metadata
    }

    /// Attach the acknowledge capability, replacing any previous one.
    pub fn set_ack(&mut self, ack: Ack) {
        self.inner.ack = Some(ack);
    }

    /// Whether an acknowledgment is still pending on this record.
    pub fn has_ack(&self) -> bool {
        self.inner.ack.is_some()
    }

    /// Detach the acknowledge capability without invoking it.
    pub fn take_ack(&mut self) -> Option<Ack> {
        self.inner.ack.take()
    }

    /// Invoke the acknowledge capability.
    ///
    /// Returns `false` if there was nothing to acknowledge, so repeated
    /// calls are harmless.
    pub fn acknowledge(&mut self) -> bool {
        match self.inner.ack.take() {
            Some(ack) => {
                ack.invoke();
                true
            }
            None => false,
        }
    }

    /// Drop payload, pending acknowledgment and metadata.
    ///
    /// A pending acknowledgment is discarded, not invoked: the feed may
    /// redeliver that message.
    pub(crate) fn reset(&mut self) {
        let inner = &mut *self.inner;
        inner.payload = Bytes::new();
        inner.ack = None;
        inner.metadata.clear();
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("len", &self.len())
            .field("has_ack", &self.has_ack())
            .field("metadata", self.metadata())
            .finish()
    }
}
