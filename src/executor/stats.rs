//! Executor counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one executor, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    units_executed: AtomicU64,
    units_skipped: AtomicU64,
    high_priority_executed: AtomicU64,
    failures_reported: AtomicU64,
    failures_suppressed: AtomicU64,
    flushes_completed: AtomicU64,
}

impl ExecutorStats {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_unit_executed(&self) {
        self.units_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unit_skipped(&self) {
        self.units_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_high_priority_executed(&self) {
        self.high_priority_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure_reported(&self) {
        self.failures_reported.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure_suppressed(&self) {
        self.failures_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_completed(&self) {
        self.flushes_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            units_executed: self.units_executed.load(Ordering::Relaxed),
            units_skipped: self.units_skipped.load(Ordering::Relaxed),
            high_priority_executed: self.high_priority_executed.load(Ordering::Relaxed),
            failures_reported: self.failures_reported.load(Ordering::Relaxed),
            failures_suppressed: self.failures_suppressed.load(Ordering::Relaxed),
            flushes_completed: self.flushes_completed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ExecutorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Scheduled units that got past the cancellation check, flush and
    /// release units included.
    pub units_executed: u64,
    /// Ordinary units dropped on the worker because cancellation was set.
    pub units_skipped: u64,
    /// High-priority tasks that ran to completion.
    pub high_priority_executed: u64,
    /// Failures handed to the listener, release timeouts included.
    pub failures_reported: u64,
    /// Failures swallowed because cancellation was already in effect.
    pub failures_suppressed: u64,
    /// Flush sentinels that ran.
    pub flushes_completed: u64,
}
