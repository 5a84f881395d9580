//! Bookkeeping for the places where the relational store and the media
//! store can drift apart.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// A destroy call that failed. Never fatal to the operation that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestroyFailure {
    pub object_id: String,
    pub reason: String,
}

/// Outcome of a best-effort remote cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Destroy calls issued.
    pub attempted: usize,
    pub destroyed: usize,
    /// The host answered that it had no such object.
    pub missing: usize,
    pub failures: Vec<DestroyFailure>,
}

impl CleanupReport {
    /// Object ids that are no longer on the host.
    pub fn removed_count(&self) -> usize {
        self.destroyed + self.missing
    }
}

/// Process-wide counters, exported on the health endpoint.
#[derive(Debug, Default)]
pub struct ConsistencyMetrics {
    destroy_failures: AtomicU64,
    orphaned_uploads: AtomicU64,
    dangling_references: AtomicU64,
    inconsistent_commits: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencySnapshot {
    pub destroy_failures: u64,
    pub orphaned_uploads: u64,
    pub dangling_references: u64,
    pub inconsistent_commits: u64,
}

impl ConsistencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cleanup(&self, report: &CleanupReport) {
        self.add_destroy_failures(report.failures.len() as u64);
    }

    pub fn add_destroy_failures(&self, count: u64) {
        if count > 0 {
            self.destroy_failures.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn add_orphaned_uploads(&self, count: u64) {
        if count > 0 {
            self.orphaned_uploads.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn add_dangling_reference(&self) {
        self.dangling_references.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_inconsistent_commit(&self) {
        self.inconsistent_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsistencySnapshot {
        ConsistencySnapshot {
            destroy_failures: self.destroy_failures.load(Ordering::Relaxed),
            orphaned_uploads: self.orphaned_uploads.load(Ordering::Relaxed),
            dangling_references: self.dangling_references.load(Ordering::Relaxed),
            inconsistent_commits: self.inconsistent_commits.load(Ordering::Relaxed),
        }
    }
}
