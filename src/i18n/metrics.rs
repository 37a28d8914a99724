//! Replication metrics.
//!
//! Counters are owned by a `ReplicationEngine` (shared through `Arc`) rather
//! than a process global, so two engines over different databases report
//! independently.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replication counters.
#[derive(Debug, Default)]
pub struct ReplicationMetrics {
    /// Rows created for missing languages
    rows_created: AtomicUsize,

    /// Unique-index collisions resolved through the suffix ladder
    conflicts_resolved: AtomicUsize,

    /// Collisions that exhausted the ladder and used a random suffix
    random_fallbacks: AtomicUsize,

    /// Inserts skipped because the `(row_id, iso)` pair already existed
    duplicates_ignored: AtomicUsize,

    /// Languages that could not be created
    failures: AtomicUsize,

    /// Replications skipped (table not provisioned, record gone)
    skipped: AtomicUsize,

    /// Queued tasks that finished (successfully or not) within their attempts
    tasks_completed: AtomicUsize,

    /// Queued tasks abandoned after exhausting their attempts
    tasks_abandoned: AtomicUsize,
}

impl ReplicationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_row_created(&self) {
        self.rows_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict_resolved(&self) {
        self.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_random_fallback(&self) {
        self.random_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_ignored(&self) {
        self.duplicates_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_abandoned(&self) {
        self.tasks_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows_created(&self) -> usize {
        self.rows_created.load(Ordering::Relaxed)
    }

    pub fn conflicts_resolved(&self) -> usize {
        self.conflicts_resolved.load(Ordering::Relaxed)
    }

    pub fn random_fallbacks(&self) -> usize {
        self.random_fallbacks.load(Ordering::Relaxed)
    }

    pub fn duplicates_ignored(&self) -> usize {
        self.duplicates_ignored.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn tasks_completed(&self) -> usize {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    pub fn tasks_abandoned(&self) -> usize {
        self.tasks_abandoned.load(Ordering::Relaxed)
    }

    /// Generate a metrics report.
    pub fn report(&self) -> MetricsReport {
        let created = self.rows_created();
        let failures = self.failures();
        let attempts = created + failures;
        let success_rate = if attempts > 0 {
            (created as f64 / attempts as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            rows_created: created,
            conflicts_resolved: self.conflicts_resolved(),
            random_fallbacks: self.random_fallbacks(),
            duplicates_ignored: self.duplicates_ignored(),
            failures,
            skipped: self.skipped(),
            success_rate,
            tasks_completed: self.tasks_completed(),
            tasks_abandoned: self.tasks_abandoned(),
        }
    }
}

/// Snapshot of the replication counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub rows_created: usize,
    pub conflicts_resolved: usize,
    pub random_fallbacks: usize,
    pub duplicates_ignored: usize,
    pub failures: usize,
    pub skipped: usize,

    /// Created rows as a percentage (0-100) of all attempted languages
    pub success_rate: f64,

    pub tasks_completed: usize,
    pub tasks_abandoned: usize,
}
