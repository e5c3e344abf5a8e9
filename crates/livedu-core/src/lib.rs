//! Core types for livedu.
//!
//! This crate provides the data structures shared by the scanner and its
//! hosts: the [`Node`] wire shape, scan events, progress counters,
//! configuration and errors.

mod config;
mod error;
mod event;
mod node;
mod progress;

pub use config::{
    DEFAULT_CAP_DEPTH, DEFAULT_CONCURRENCY, DEFAULT_ESTIMATE_TIMEOUT, DEFAULT_MAX_CHILDREN,
    DEFAULT_MAX_DEPTH, DEFAULT_TICK_INTERVAL, EntryFilter, ScanConfig, ScanConfigBuilder,
};
pub use error::ScanError;
pub use event::ScanEvent;
pub use node::{Node, NodeKind, aggregate_name, display_name};
pub use progress::ScanProgress;
