//! Scan progress tracking.

use std::sync::atomic::{AtomicU64, Ordering};

use livedu_core::ScanProgress;

/// Live progress counters shared by every branch of a walk.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    dirs_found: AtomicU64,
    dirs_completed: AtomicU64,
}

impl ProgressCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly discovered directory.
    pub fn record_found(&self) {
        self.dirs_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a directory as listed, estimated, or failed.
    pub fn record_completed(&self) {
        self.dirs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counts.
    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            dirs_found: self.dirs_found.load(Ordering::Relaxed),
            dirs_completed: self.dirs_completed.load(Ordering::Relaxed),
        }
    }
}
