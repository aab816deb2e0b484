//! Counters for summary runs.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::pipeline::ItemStatus;

/// Thread-safe counters describing one summarization run.
#[derive(Default)]
pub struct RunMetrics {
    completed: AtomicU64,
    no_attachment: AtomicU64,
    errors: AtomicU64,
    failed_to_persist: AtomicU64,
}

impl RunMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal status of a processed unit. Non-terminal statuses are ignored.
    pub fn record(&self, status: ItemStatus) {
        let counter = match status {
            ItemStatus::Completed => &self.completed,
            ItemStatus::NoAttachment => &self.no_attachment,
            ItemStatus::Error => &self.errors,
            ItemStatus::FailedToPersist => &self.failed_to_persist,
            ItemStatus::Queued | ItemStatus::InProgress => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters for a run over `total` units.
    pub fn snapshot(&self, total: usize) -> RunSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let no_attachment = self.no_attachment.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let failed_to_persist = self.failed_to_persist.load(Ordering::Relaxed);
        let processed = completed + no_attachment + errors + failed_to_persist;
        RunSnapshot {
            total: total as u64,
            completed,
            no_attachment,
            errors,
            failed_to_persist,
            skipped: (total as u64).saturating_sub(processed),
        }
    }
}

/// Immutable view of run counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RunSnapshot {
    /// Units handed to the run.
    pub total: u64,
    /// Units whose note was created.
    pub completed: u64,
    /// Units without a PDF attachment.
    pub no_attachment: u64,
    /// Units that failed while fetching, generating, or writing.
    pub errors: u64,
    /// Units whose note write was rejected.
    pub failed_to_persist: u64,
    /// Units never started because the run was stopped.
    pub skipped: u64,
}

impl RunSnapshot {
    /// Units that reached a terminal status.
    pub fn processed(&self) -> u64 {
        self.total - self.skipped
    }
}
