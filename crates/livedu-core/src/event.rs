//! Events delivered to scan subscribers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::progress::ScanProgress;

/// One event in a scan's stream.
///
/// A stream carries any number of `Progress` events followed by exactly one
/// `Done` or `Error`. Trees are shared between subscribers behind an `Arc`;
/// they never alias the scan's working tree, so use [`Arc::unwrap_or_clone`]
/// to get an owned copy that is safe to mutate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScanEvent {
    /// A refined partial tree.
    Progress {
        tree: Arc<Node>,
        dirs_found: u64,
        dirs_completed: u64,
    },
    /// The fully settled tree.
    Done { tree: Arc<Node> },
    /// The scan failed.
    Error { message: String },
}

impl ScanEvent {
    /// Create a progress event.
    pub fn progress(tree: Arc<Node>, progress: ScanProgress) -> Self {
        Self::Progress {
            tree,
            dirs_found: progress.dirs_found,
            dirs_completed: progress.dirs_completed,
        }
    }

    /// Check if this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Tree carried by this event, if any.
    pub fn tree(&self) -> Option<&Arc<Node>> {
        match self {
            Self::Progress { tree, .. } | Self::Done { tree } => Some(tree),
            Self::Error { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        let tree = Arc::new(Node::new_directory("r", "/r"));
        assert!(!ScanEvent::progress(tree.clone(), ScanProgress::new(1, 0)).is_terminal());
        assert!(ScanEvent::Done { tree }.is_terminal());
        assert!(
            ScanEvent::Error {
                message: "boom".into()
            }
            .is_terminal()
        );
    }
}
