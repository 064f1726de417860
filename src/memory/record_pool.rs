//! Process-wide recycling pool for record wrappers.
//!
//! Under sustained throughput every message would otherwise cost one heap
//! allocation for its [`Record`] wrapper. The pool keeps released wrappers
//! on a free list and hands them back out:
//! - `acquire()` never fails; it reuses a wrapper or allocates a new one
//! - `release()` scrubs a wrapper and puts it back on the free list
//! - hit/total counters expose how well reuse is working
//!
//! # Design
//!
//! One pool is constructed at startup and shared by `Arc` with every stage
//! that acquires or releases records (normally the source and the sink).
//! The free list is a bounded kanal channel, so both operations are safe
//! from any number of threads without external locking. Releases beyond
//! `max_idle` simply drop the wrapper.
//!
//! # Example
//!
//! ```rust
//! use forwarder::memory::RecordPool;
//!
//! let pool = RecordPool::new();
//!
//! let mut record = pool.acquire();
//! record.set_payload("cpu,host=a usage=0.5");
//! pool.release(record);
//!
//! // The second acquisition reuses the wrapper, but never its payload.
//! let record = pool.acquire();
//! assert!(record.is_empty());
//! assert_eq!(pool.hit_ratio(), 0.5);
//! ```

use crate::record::Record;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default bound on the number of idle wrappers kept on the free list.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Statistics about pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquisitions served from the free list.
    pub hits: u64,
    /// Total number of acquisitions.
    pub total: u64,
    /// Wrappers currently idle on the free list.
    pub idle: usize,
}

/// A free list of reusable [`Record`] wrappers.
pub struct RecordPool {
    free_tx: kanal::Sender<Record>,
    free_rx: kanal::Receiver<Record>,
    max_idle: usize,
    hits: AtomicU64,
    total: AtomicU64,
}

impl RecordPool {
    /// Create a pool keeping at most [`DEFAULT_MAX_IDLE`] idle wrappers.
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Create a pool keeping at most `max_idle` idle wrappers.
    pub fn with_max_idle(max_idle: usize) -> Self {
        let max_idle = max_idle.max(1);
        let (free_tx, free_rx) = kanal::bounded(max_idle);
        Self {
            free_tx,
            free_rx,
            max_idle,
            hits: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Get an empty record, reusing a released one when available.
    pub fn acquire(&self) -> Record {
        self.total.fetch_add(1, Ordering::Relaxed);

        match self.free_rx.try_recv() {
            Ok(Some(record)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                record
            }
            _ => Record::new(),
        }
    }

    /// Return a record to the free list.
    ///
    /// The pending acknowledgment (if any) is dropped without being invoked
    /// and the payload reference is released before the wrapper becomes
    /// visible to another `acquire()`.
    pub fn release(&self, mut record: Record) {
        if record.has_ack() {
            tracing::trace!("releasing record with an unacknowledged delivery");
        }
        record.reset();
        // A full free list drops the wrapper.
        let _ = self.free_tx.try_send(record);
    }

    /// Fraction of acquisitions served by reuse.
    ///
    /// Returns `0.0` before the first acquisition.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Number of acquisitions served from the free list.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total number of acquisitions.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Number of wrappers currently idle on the free list.
    pub fn idle(&self) -> usize {
        self.free_rx.len()
    }

    /// Upper bound on idle wrappers.
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits(),
            total: self.total(),
            idle: self.idle(),
        }
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordPool")
            .field("max_idle", &self.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Ack;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_pool_starts_empty() {
        let pool = RecordPool::new();
        assert_eq!(pool.stats(), PoolStats::default());
        assert_eq!(pool.hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio_after_reuse() {
        let pool = RecordPool::new();

        let mut record = pool.acquire();
        record.set_payload(vec![0u8; 16]);
        assert_eq!(record.len(), 16);

        pool.release(record);
        let record = pool.acquire();
        assert!(record.is_empty());

        assert_eq!((pool.hit_ratio() * 1000.0) as i64, 500);
    }

    #[test]
    fn test_hit_ratio_sequential_pairs() {
        let pool = RecordPool::new();
        let n = 10u64;

        for _ in 0..n {
            let record = pool.acquire();
            pool.release(record);
        }

        assert_eq!(pool.total(), n);
        assert_eq!(pool.hits(), n - 1);
        assert!((pool.hit_ratio() - (n - 1) as f64 / n as f64).abs() < f64::EPSILON);
    }

    #[test]
    fn test_release_clears_ack_without_invoking() {
        let pool = RecordPool::new();
        let invoked = Arc::new(AtomicBool::new(false));

        let mut record = pool.acquire();
        let flag = invoked.clone();
        record.set_ack(Ack::new(move || flag.store(true, Ordering::SeqCst)));
        record.set_payload("stale");
        record.metadata_mut().sequence = 77;
        pool.release(record);

        let record = pool.acquire();
        assert!(!record.has_ack());
        assert!(record.is_empty());
        assert_eq!(record.metadata().sequence, 0);
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_free_list_is_bounded() {
        let pool = RecordPool::with_max_idle(2);

        let records: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        for record in records {
            pool.release(record);
        }

        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.max_idle(), 2);
    }

    #[test]
    fn test_pool_concurrent() {
        let pool = Arc::new(RecordPool::with_max_idle(64));
        let mut handles = vec![];

        for t in 0..4u8 {
            let pool = pool.clone();
            handles.push(thread::spawn(move || {
                for i in 0..250u8 {
                    let mut record = pool.acquire();
                    assert!(record.is_empty());
                    record.set_payload(vec![t, i]);
                    pool.release(record);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.total, 1000);
        assert!(stats.hits <= stats.total);
        assert!(stats.idle <= 64);
    }
}
