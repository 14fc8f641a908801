//! Operation counters for the item store.
//!
//! All counters use `Ordering::Relaxed`: each is independent and
//! monotonically increasing, so atomicity of the individual `fetch_add` is
//! all that is required. A [`snapshot`](Metrics::snapshot) reads the
//! counters sequentially and may observe them slightly out of step with one
//! another, which is acceptable for telemetry aggregated over time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters covering the store's public operations.
///
/// Attach to a store via
/// [`ItemStore::with_metrics`](crate::ItemStore::with_metrics); share the
/// same `Arc<Metrics>` across stores to aggregate.
#[derive(Debug, Default)]
pub struct Metrics {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    sweeps: AtomicU64,
    items_reclaimed: AtomicU64,
    not_found: AtomicU64,
    not_modified: AtomicU64,
    precondition_failures: AtomicU64,
    suppressed_cleanups: AtomicU64,
}

impl Metrics {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaimed(&self, count: u64) {
        self.items_reclaimed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_not_modified(&self) {
        self.not_modified.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_precondition_failure(&self) {
        self.precondition_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.suppressed_cleanups.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            items_reclaimed: self.items_reclaimed.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            not_modified: self.not_modified.load(Ordering::Relaxed),
            precondition_failures: self.precondition_failures.load(Ordering::Relaxed),
            suppressed_cleanups: self.suppressed_cleanups.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Read operations started.
    pub reads: u64,
    /// Write operations started.
    pub writes: u64,
    /// Delete operations started.
    pub deletes: u64,
    /// Sweep passes started.
    pub sweeps: u64,
    /// Expired items physically reclaimed, by sweeps and by opportunistic
    /// deletes during reads.
    pub items_reclaimed: u64,
    /// Reads that resolved to absent or logically expired items.
    pub not_found: u64,
    /// Reads short-circuited by a matching conditional.
    pub not_modified: u64,
    /// Writes and deletes that lost an optimistic-concurrency race.
    pub precondition_failures: u64,
    /// Cleanup failures swallowed via the suppressed-error channel.
    pub suppressed_cleanups: u64,
}
