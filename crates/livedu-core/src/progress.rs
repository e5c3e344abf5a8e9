//! Scan progress reporting.

use serde::{Deserialize, Serialize};

/// Point-in-time progress counters for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Directories discovered so far, including the root.
    pub dirs_found: u64,
    /// Directories fully processed (listed, estimated, or failed).
    pub dirs_completed: u64,
}

impl ScanProgress {
    /// Create progress with the given counts.
    pub fn new(dirs_found: u64, dirs_completed: u64) -> Self {
        Self {
            dirs_found,
            dirs_completed,
        }
    }

    /// Directories found but not yet completed.
    pub fn pending(&self) -> u64 {
        self.dirs_found.saturating_sub(self.dirs_completed)
    }

    /// Completed fraction in `0.0..=1.0`.
    ///
    /// This only reflects what has been discovered so far; it can go down
    /// when a large directory is listed.
    pub fn fraction(&self) -> f64 {
        if self.dirs_found == 0 {
            0.0
        } else {
            (self.dirs_completed as f64 / self.dirs_found as f64).min(1.0)
        }
    }
}
