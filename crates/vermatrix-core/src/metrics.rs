//! Global atomic counters for vermatrix runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event, e.g. at the end of a verification or release run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    tasks_executed: AtomicU64,
    tasks_failed: AtomicU64,
    stages_completed: AtomicU64,
    tags_forced: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tasks_executed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            stages_completed: AtomicU64::new(0),
            tags_forced: AtomicU64::new(0),
        }
    }

    /// Count one finished verification task; `failed` also bumps the failure counter.
    pub fn record_task(&self, failed: bool) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "tasks_executed", failed, "counter incremented");
    }

    pub fn inc_stages_completed(&self) {
        self.stages_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stages_completed", "counter incremented");
    }

    pub fn inc_tags_forced(&self) {
        self.tags_forced.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tags_forced", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            tasks_executed = self.tasks_executed(),
            tasks_failed = self.tasks_failed(),
            stages_completed = self.stages_completed(),
            tags_forced = self.tags_forced(),
        );
    }

    pub fn tasks_executed(&self) -> u64 {
        self.tasks_executed.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn stages_completed(&self) -> u64 {
        self.stages_completed.load(Ordering::Relaxed)
    }

    pub fn tags_forced(&self) -> u64 {
        self.tags_forced.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.tasks_executed.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.stages_completed.store(0, Ordering::Relaxed);
        self.tags_forced.store(0, Ordering::Relaxed);
    }
}
