//! Concurrency-bounded recursive directory walker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use compact_str::CompactString;
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use livedu_core::{EntryFilter, Node, ScanConfig, ScanError};

use crate::estimate::SizeEstimator;
use crate::limiter::ConcurrencyLimiter;
use crate::progress::ProgressCounters;
use crate::snapshot::Snapshotter;
use crate::working::{NodeId, WorkingTree};

/// Everything an incremental walk shares across its recursive steps.
pub struct FillContext<'a> {
    /// Tree being filled in place.
    pub tree: &'a Mutex<WorkingTree>,
    /// Directories at this depth are estimated instead of expanded.
    pub max_depth: u32,
    /// Called whenever a directory finishes.
    pub on_change: &'a (dyn Fn() + Send + Sync),
    /// Shared directory counters.
    pub progress: &'a ProgressCounters,
    /// Stops the walk at the next check.
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
}

/// A listed directory entry that will become a node.
#[derive(Debug)]
struct ListedEntry {
    name: CompactString,
    path: PathBuf,
    kind: EntryKind,
}

/// Recursively expands directories into [`Node`] trees.
///
/// Every `readdir`, `stat` and estimation goes through the shared
/// [`ConcurrencyLimiter`]; it is the only throttle, so the fan-out of a
/// single directory is unbounded but the I/O in flight is not.
#[derive(Clone)]
pub struct TreeWalker {
    config: ScanConfig,
    filter: EntryFilter,
    limiter: Arc<ConcurrencyLimiter>,
    estimator: Arc<dyn SizeEstimator>,
}

impl std::fmt::Debug for TreeWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWalker")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl TreeWalker {
    /// Create a walker.
    pub fn new(
        config: ScanConfig,
        limiter: Arc<ConcurrencyLimiter>,
        estimator: Arc<dyn SizeEstimator>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        let filter = EntryFilter::new(&config)?;
        Ok(Self {
            config,
            filter,
            limiter,
            estimator,
        })
    }

    /// Configuration this walker was built with.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Snapshotter matching this walker's cap policy.
    pub fn snapshotter(&self) -> Snapshotter {
        Snapshotter::from_config(&self.config)
    }

    /// Walk `path` to completion and return the settled tree.
    ///
    /// Directories that can't be listed come back with no children and
    /// size zero; files that can't be statted are left out.
    pub async fn walk(&self, path: &Path, max_depth: u32) -> Node {
        let tree = Mutex::new(WorkingTree::new(Node::root(path)));
        let progress = ProgressCounters::new();
        let cancel = CancellationToken::new();
        let cx = FillContext {
            tree: &tree,
            max_depth,
            on_change: &|| {},
            progress: &progress,
            cancel: &cancel,
        };

        progress.record_found();
        self.fill(&cx, WorkingTree::root_id(), path.to_path_buf(), 0)
            .await;

        self.snapshotter().snapshot_owned(&tree.into_inner())
    }

    /// Expand the directory `node` at `path` in place.
    ///
    /// Subdirectories appear as empty placeholders as soon as their parent
    /// is listed and fill in as their own listings resolve. Returns early,
    /// leaving a partial tree, once `cx.cancel` fires.
    pub fn fill<'a>(
        &'a self,
        cx: &'a FillContext<'_>,
        node: NodeId,
        path: PathBuf,
        depth: u32,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if cx.cancel.is_cancelled() {
                return;
            }

            if depth >= cx.max_depth {
                let size = self.estimate(&path, cx.cancel).await;
                if cx.cancel.is_cancelled() {
                    return;
                }
                cx.tree.lock().set_truncated(node, size);
                cx.progress.record_completed();
                (cx.on_change)();
                return;
            }

            let entries = match self.list_dir(&path).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "failed to list directory");
                    cx.progress.record_completed();
                    return;
                }
            };

            if cx.cancel.is_cancelled() {
                return;
            }
            cx.tree.lock().expand(node);

            for entry in &entries {
                if entry.kind == EntryKind::Directory {
                    cx.progress.record_found();
                }
            }

            join_all(
                entries
                    .into_iter()
                    .map(|entry| self.visit(cx, node, entry, depth)),
            )
            .await;

            cx.progress.record_completed();
            (cx.on_change)();
        })
    }

    async fn visit(&self, cx: &FillContext<'_>, parent: NodeId, entry: ListedEntry, depth: u32) {
        match entry.kind {
            EntryKind::Directory => {
                let child = cx
                    .tree
                    .lock()
                    .push_child(parent, Node::new_directory(entry.name, entry.path.clone()));
                self.fill(cx, child, entry.path, depth + 1).await;
            }
            EntryKind::File => {
                if cx.cancel.is_cancelled() {
                    return;
                }
                let stat = self
                    .limiter
                    .scoped(tokio::fs::symlink_metadata(&entry.path))
                    .await;
                match stat {
                    Ok(Ok(metadata)) => {
                        let file = Node::new_file(entry.name, entry.path, metadata.len());
                        cx.tree.lock().push_child(parent, file);
                    }
                    Ok(Err(err)) => {
                        tracing::trace!(path = %entry.path.display(), error = %err, "failed to stat file");
                    }
                    Err(_) => {}
                }
            }
        }
    }

    /// Resolve a scan root through the limiter.
    ///
    /// See [`resolve_root`] for the checks performed.
    pub async fn check_root(&self, path: &Path) -> Result<PathBuf, ScanError> {
        self.limiter.scoped(resolve_root(path)).await?
    }

    async fn estimate(&self, path: &Path, cancel: &CancellationToken) -> u64 {
        match self
            .limiter
            .scoped(self.estimator.estimate(path, cancel))
            .await
        {
            Ok(size) => size,
            Err(_) => 0,
        }
    }

    /// List `path`, dropping symlinks and filtered names.
    async fn list_dir(&self, path: &Path) -> Result<Vec<ListedEntry>, ScanError> {
        let _slot = self.limiter.acquire().await?;

        let mut read_dir = tokio::fs::read_dir(path)
            .await
            .map_err(|e| ScanError::io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| ScanError::io(path, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if self.filter.is_excluded(&name) {
                continue;
            }

            // `file_type` does not follow links.
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(err) => {
                    tracing::trace!(path = %entry.path().display(), error = %err, "failed to read file type");
                    continue;
                }
            };

            let kind = if file_type.is_symlink() {
                continue;
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            entries.push(ListedEntry {
                name: CompactString::new(&name),
                path: entry.path(),
                kind,
            });
        }

        Ok(entries)
    }
}

/// Resolve a requested scan root to an existing, listable directory.
///
/// A root that exists but can't be opened fails with
/// [`ScanError::AccessDenied`] instead of scanning as an empty tree.
pub async fn resolve_root(path: &Path) -> Result<PathBuf, ScanError> {
    let resolved = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| ScanError::io(path, e))?;
    let metadata = tokio::fs::metadata(&resolved)
        .await
        .map_err(|e| ScanError::io(&resolved, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory { path: resolved });
    }
    tokio::fs::read_dir(&resolved)
        .await
        .map_err(|e| ScanError::io(&resolved, e))?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::FixedEstimator;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn walker(config: ScanConfig, estimate: u64) -> TreeWalker {
        TreeWalker::new(
            config,
            Arc::new(ConcurrencyLimiter::new(4)),
            Arc::new(FixedEstimator(estimate)),
        )
        .unwrap()
    }

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::write(root.join("a.txt"), vec![b'a'; 10]).unwrap();
        fs::create_dir(root.join("b")).unwrap();
        fs::write(root.join("b/c.txt"), vec![b'c'; 20]).unwrap();
        fs::write(root.join("b/d.txt"), vec![b'd'; 5]).unwrap();

        temp
    }

    #[tokio::test]
    async fn test_walk_sums_and_orders() {
        let temp = create_test_tree();
        let root = resolve_root(temp.path()).await.unwrap();
        let tree = walker(ScanConfig::default(), 0).walk(&root, 8).await;

        assert_eq!(tree.size, 35);
        let names: Vec<_> = tree.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a.txt"]);

        let b = tree.child("b").unwrap();
        assert_eq!(b.size, 25);
        assert_eq!(b.path, root.join("b"));
        assert_eq!(b.child("c.txt").unwrap().extension.as_deref(), Some("txt"));
    }

    #[tokio::test]
    async fn test_empty_directory_has_empty_children() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("empty")).unwrap();

        let tree = walker(ScanConfig::default(), 0).walk(temp.path(), 8).await;
        assert_eq!(tree.child("empty").unwrap().children, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_depth_limit_truncates_with_estimate() {
        let temp = create_test_tree();
        let tree = walker(ScanConfig::default(), 4096).walk(temp.path(), 1).await;

        let b = tree.child("b").unwrap();
        assert!(b.truncated);
        assert!(b.children.is_none());
        assert_eq!(b.size, 4096);
        assert_eq!(tree.size, 4096 + 10);
        assert!(!tree.truncated);
    }

    #[tokio::test]
    async fn test_depth_zero_truncates_root() {
        let temp = create_test_tree();
        let tree = walker(ScanConfig::default(), 99).walk(temp.path(), 0).await;

        assert!(tree.truncated);
        assert!(tree.children.is_none());
        assert_eq!(tree.size, 99);
    }

    #[tokio::test]
    async fn test_cap_applies_to_walked_tree() {
        let temp = TempDir::new().unwrap();
        for size in 1..=40usize {
            fs::write(temp.path().join(format!("f{size:02}")), vec![0u8; size]).unwrap();
        }
        let config = ScanConfig::builder()
            .cap_depth(0u32)
            .max_children(30usize)
            .build()
            .unwrap();

        let tree = walker(config, 0).walk(temp.path(), 8).await;

        assert_eq!(tree.child_count(), 31);
        // The aggregate outweighs every explicit child and sorts first.
        assert_eq!(tree.children()[0].name, "(10 smaller items)");
        assert_eq!(tree.children()[0].size, 55);
        assert_eq!(tree.children()[1].size, 40);
        assert_eq!(tree.children()[30].size, 11);
        assert_eq!(tree.size, 820);
    }

    #[tokio::test]
    async fn test_ignore_patterns_and_hidden() {
        let temp = create_test_tree();
        fs::write(temp.path().join(".hidden"), b"secret").unwrap();
        fs::write(temp.path().join("debug.log"), b"log").unwrap();
        let config = ScanConfig::builder()
            .include_hidden(false)
            .ignore_patterns(vec!["*.log".to_string(), "b".to_string()])
            .build()
            .unwrap();

        let tree = walker(config, 0).walk(temp.path(), 8).await;

        let names: Vec<_> = tree.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_missing_directory_yields_empty_node() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");
        let tree = walker(ScanConfig::default(), 0).walk(&missing, 8).await;

        assert_eq!(tree.size, 0);
        assert!(tree.children.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_never_appear() {
        use std::os::unix::fs::symlink;

        let temp = create_test_tree();
        let root = temp.path();
        symlink(root.join("a.txt"), root.join("link.txt")).unwrap();
        symlink(root.join("b"), root.join("b-link")).unwrap();
        // Cycle back to the root.
        symlink(root, root.join("b/loop")).unwrap();
        symlink(root.join("nowhere"), root.join("broken")).unwrap();

        let tree = walker(ScanConfig::default(), 0).walk(root, 8).await;

        fn assert_no_links(node: &Node) {
            assert!(!node.name.contains("link"), "symlink {} in tree", node.name);
            assert_ne!(node.name, "loop");
            assert_ne!(node.name, "broken");
            node.children().iter().for_each(assert_no_links);
        }
        assert_no_links(&tree);
        assert_eq!(tree.size, 35);
    }

    #[tokio::test]
    async fn test_fill_counts_progress_and_notifies() {
        let temp = create_test_tree();
        fs::create_dir(temp.path().join("b/e")).unwrap();
        let walker = walker(ScanConfig::default(), 0);

        let tree = Mutex::new(WorkingTree::new(Node::root(temp.path())));
        let progress = ProgressCounters::new();
        let cancel = CancellationToken::new();
        let changes = AtomicUsize::new(0);
        let on_change = || {
            changes.fetch_add(1, Ordering::Relaxed);
        };
        let cx = FillContext {
            tree: &tree,
            max_depth: 8,
            on_change: &on_change,
            progress: &progress,
            cancel: &cancel,
        };

        progress.record_found();
        walker
            .fill(&cx, WorkingTree::root_id(), temp.path().to_path_buf(), 0)
            .await;

        let counts = progress.snapshot();
        assert_eq!(counts.dirs_found, 3);
        assert_eq!(counts.dirs_completed, 3);
        assert_eq!(changes.load(Ordering::Relaxed), 3);
        assert_eq!(tree.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_cancelled_fill_leaves_node_untouched() {
        let temp = create_test_tree();
        let walker = walker(ScanConfig::default(), 0);

        let tree = Mutex::new(WorkingTree::new(Node::root(temp.path())));
        let progress = ProgressCounters::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cx = FillContext {
            tree: &tree,
            max_depth: 8,
            on_change: &|| {},
            progress: &progress,
            cancel: &cancel,
        };

        walker
            .fill(&cx, WorkingTree::root_id(), temp.path().to_path_buf(), 0)
            .await;

        let tree = tree.lock();
        assert!(tree.children(tree.root()).is_none());
        assert_eq!(progress.snapshot().dirs_completed, 0);
    }

    #[tokio::test]
    async fn test_resolve_root_errors() {
        let temp = create_test_tree();

        let err = resolve_root(&temp.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidPath { .. }));

        let err = resolve_root(&temp.path().join("a.txt")).await.unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_root_rejects_unreadable_directory() {
        use std::os::unix::fs::PermissionsExt;

        let temp = create_test_tree();
        let locked = temp.path().join("b");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let readable = fs::read_dir(&locked).is_ok();

        let result = resolve_root(&locked).await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Privileged users can list anything.
        if readable {
            return;
        }
        assert!(matches!(result, Err(ScanError::AccessDenied { .. })));
    }
}
