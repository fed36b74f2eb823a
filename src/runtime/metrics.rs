//! Scheduling counters for runtime observability.
//!
//! ## Design
//!
//! - **Per-worker slots**: each counter block is written only by its owning
//!   worker, so increments are relaxed atomic adds with no contention.
//! - **Cache-padded**: worker slots live in one contiguous table inside the
//!   pool's shared state; padding keeps neighboring workers off each
//!   other's cache lines.
//! - **Live aggregation**: unlike run-scoped executors that merge local
//!   counters at join time, this pool persists across many operations, so
//!   [`MetricsSnapshot`] is built from relaxed loads at any point. Counts
//!   for in-flight operations may be mid-update; totals for completed
//!   operations are exact.

use std::sync::atomic::{AtomicU64, Ordering};

/// One worker's counters. Written only by the owning worker.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Jobs executed through the scheduler (popped, stolen, or injected).
    pub tasks_executed: AtomicU64,
    /// Steal rounds attempted (injector + victims).
    pub steal_attempts: AtomicU64,
    /// Steal rounds that yielded a job.
    pub steal_successes: AtomicU64,
    /// Stealable jobs published by `fork2`.
    pub forks: AtomicU64,
    /// Joins resolved by popping the un-stolen job back off the local
    /// queue, skipping synchronization entirely.
    pub inline_joins: AtomicU64,
    /// Granularity decisions that chose the sequential fallback.
    pub seq_leaves: AtomicU64,
}

/// Relaxed increment for owner-written counters.
#[inline]
pub(crate) fn inc(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Aggregated counters across all workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_executed: u64,
    pub steal_attempts: u64,
    pub steal_successes: u64,
    pub forks: u64,
    pub inline_joins: u64,
    pub seq_leaves: u64,
}

impl MetricsSnapshot {
    /// Fold one worker's counters into the snapshot.
    pub fn merge_worker(&mut self, w: &WorkerMetrics) {
        self.tasks_executed += w.tasks_executed.load(Ordering::Relaxed);
        self.steal_attempts += w.steal_attempts.load(Ordering::Relaxed);
        self.steal_successes += w.steal_successes.load(Ordering::Relaxed);
        self.forks += w.forks.load(Ordering::Relaxed);
        self.inline_joins += w.inline_joins.load(Ordering::Relaxed);
        self.seq_leaves += w.seq_leaves.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_counters() {
        let a = WorkerMetrics::default();
        let b = WorkerMetrics::default();
        a.tasks_executed.store(3, Ordering::Relaxed);
        a.forks.store(1, Ordering::Relaxed);
        b.tasks_executed.store(4, Ordering::Relaxed);
        b.seq_leaves.store(2, Ordering::Relaxed);

        let mut snap = MetricsSnapshot::default();
        snap.merge_worker(&a);
        snap.merge_worker(&b);

        assert_eq!(snap.tasks_executed, 7);
        assert_eq!(snap.forks, 1);
        assert_eq!(snap.seq_leaves, 2);
        assert_eq!(snap.steal_attempts, 0);
    }
}
