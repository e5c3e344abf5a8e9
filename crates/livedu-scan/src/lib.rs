//! Streaming directory scanner for livedu.
//!
//! This crate walks a directory tree with bounded concurrency and publishes
//! progressively refined snapshots while the walk is still running.
//!
//! # Overview
//!
//! - **[`ConcurrencyLimiter`]** bounds `readdir`/`stat`/estimation calls in
//!   flight, shared by every scan of a coordinator
//! - **[`SizeEstimator`]** sizes directories past the depth limit without
//!   expanding them ([`DuEstimator`] shells out to `du`)
//! - **[`TreeWalker`]** expands directories, either to completion
//!   ([`TreeWalker::walk`]) or in place while snapshots are taken
//!   ([`TreeWalker::fill`])
//! - **[`Snapshotter`]** turns the in-progress tree into a settled,
//!   independent [`Node`]
//! - **[`ScanCoordinator`]** runs at most one scan at a time and fans its
//!   events out to any number of subscribers
//!
//! # Example
//!
//! ```rust,no_run
//! use livedu_scan::{ScanConfig, ScanCoordinator, ScanEvent};
//!
//! # async fn run() -> Result<(), livedu_scan::ScanError> {
//! let coordinator = ScanCoordinator::new(ScanConfig::default())?;
//! let handle = coordinator.request_scan("/path/to/scan").await?;
//! let mut events = handle.subscribe();
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ScanEvent::Progress { tree, dirs_found, dirs_completed } => {
//!             println!("{dirs_completed}/{dirs_found} dirs, {} bytes so far", tree.size);
//!         }
//!         ScanEvent::Done { tree } => println!("Total size: {} bytes", tree.size),
//!         ScanEvent::Error { message } => eprintln!("Scan failed: {message}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod estimate;
mod limiter;
mod progress;
mod snapshot;
mod walker;
mod working;

pub use coordinator::{ScanCoordinator, ScanHandle, Subscription};
pub use estimate::{DuEstimator, FixedEstimator, SizeEstimator};
pub use limiter::ConcurrencyLimiter;
pub use progress::ProgressCounters;
pub use snapshot::Snapshotter;
pub use walker::{FillContext, TreeWalker, resolve_root};
pub use working::{NodeId, WorkingTree};

// Re-export core types for convenience
pub use livedu_core::{
    EntryFilter, Node, NodeKind, ScanConfig, ScanConfigBuilder, ScanError, ScanEvent,
    ScanProgress,
};
