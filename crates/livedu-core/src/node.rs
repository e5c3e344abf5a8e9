//! File and directory node types.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Type of file system node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Regular file (also used for aggregate nodes).
    File,
    /// Directory.
    Directory,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }
}

/// A single file or directory in a scanned tree.
///
/// This is also the wire shape handed to subscribers. Optional fields are
/// omitted from the serialized form when they do not apply, so a directory
/// whose `children` is absent (unexpanded) stays distinguishable from one
/// whose `children` is an empty list (expanded and empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Base name (not full path).
    pub name: CompactString,

    /// Absolute path, unique within a scan.
    pub path: PathBuf,

    /// Size in bytes (aggregate for directories).
    pub size: u64,

    /// File or directory.
    pub kind: NodeKind,

    /// Lowercase extension, files only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<CompactString>,

    /// Children, sorted by size descending once snapshotted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,

    /// Expansion was skipped at the depth limit.
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Node {
    /// Create a new file node.
    pub fn new_file(name: impl Into<CompactString>, path: impl Into<PathBuf>, size: u64) -> Self {
        let name = name.into();
        let extension = extension_of(&name);
        Self {
            name,
            path: path.into(),
            size,
            kind: NodeKind::File,
            extension,
            children: None,
            truncated: false,
        }
    }

    /// Create a new, not yet expanded, directory node.
    pub fn new_directory(name: impl Into<CompactString>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size: 0,
            kind: NodeKind::Directory,
            extension: None,
            children: None,
            truncated: false,
        }
    }

    /// Create the root directory node for a scan of `path`.
    pub fn root(path: &Path) -> Self {
        Self::new_directory(display_name(path), path)
    }

    /// Create an aggregate node standing in for `count` folded siblings.
    ///
    /// The path is synthetic: it never exists on disk.
    pub fn aggregate(parent: &Path, count: usize, size: u64) -> Self {
        let name = aggregate_name(count);
        let path = parent.join(name.as_str());
        Self {
            name,
            path,
            size,
            kind: NodeKind::File,
            extension: None,
            children: None,
            truncated: false,
        }
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Check if this node's children have been listed.
    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.as_ref().map_or(0, Vec::len)
    }

    /// Direct children, empty when not expanded.
    pub fn children(&self) -> &[Node] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Find a descendant (or this node) by path.
    pub fn find(&self, path: &Path) -> Option<&Node> {
        if self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children().iter().find_map(|child| child.find(path))
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children().iter().find(|c| c.name == name)
    }

    /// Recompute directory sizes bottom-up from children.
    ///
    /// Files and unexpanded directories (including truncated ones) keep the
    /// size they carry. Returns the new size of this node.
    pub fn recompute_size(&mut self) -> u64 {
        if let Some(children) = self.children.as_mut() {
            self.size = children.iter_mut().map(Node::recompute_size).sum();
        }
        self.size
    }

    /// Sort children by size in descending order, recursively.
    pub fn sort_children_by_size(&mut self) {
        if let Some(children) = self.children.as_mut() {
            children.sort_by(|a, b| b.size.cmp(&a.size));
            for child in children {
                child.sort_children_by_size();
            }
        }
    }

    /// Count this node and all its descendants.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(Node::node_count).sum::<usize>()
    }
}

/// Name used for an aggregate node folding `count` items.
pub fn aggregate_name(count: usize) -> CompactString {
    compact_str::format_compact!("({count} smaller items)")
}

/// Base name of a path, falling back to the whole path for roots like `/`.
pub fn display_name(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(path.to_string_lossy()))
}

fn extension_of(name: &str) -> Option<CompactString> {
    Path::new(name)
        .extension()
        .map(|ext| CompactString::new(ext.to_string_lossy().to_lowercase()))
}
