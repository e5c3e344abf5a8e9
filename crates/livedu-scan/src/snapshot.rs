//! Consistent, publishable copies of an in-progress tree.

use parking_lot::Mutex;

use livedu_core::{Node, ScanConfig};

use crate::working::WorkingTree;

/// Produces settled snapshots of a [`WorkingTree`].
///
/// A settled tree has every directory size equal to the sum of its
/// children, children sorted by size descending, and directories at or
/// below `cap_depth` limited to `max_children` explicit children plus an
/// aggregate node for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshotter {
    cap_depth: u32,
    max_children: usize,
}

impl Snapshotter {
    /// Create a snapshotter with an explicit cap policy.
    pub fn new(cap_depth: u32, max_children: usize) -> Self {
        Self {
            cap_depth,
            max_children: max_children.max(1),
        }
    }

    /// Create a snapshotter using the cap policy of `config`.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.cap_depth, config.max_children)
    }

    /// Copy and settle the shared tree.
    ///
    /// The lock is held only while copying; settling works on the copy.
    pub fn snapshot(&self, tree: &Mutex<WorkingTree>) -> Node {
        let mut copy = {
            let tree = tree.lock();
            tree.to_node(tree.root())
        };
        self.settle(&mut copy);
        copy
    }

    /// Copy and settle a tree that is not shared.
    pub fn snapshot_owned(&self, tree: &WorkingTree) -> Node {
        let mut copy = tree.to_node(tree.root());
        self.settle(&mut copy);
        copy
    }

    /// Recompute sizes, sort, cap, then recompute and sort again.
    ///
    /// The cap is evaluated against the sizes of this pass, so which
    /// children end up in the aggregate may change from one snapshot to the
    /// next while sizes are still arriving.
    pub fn settle(&self, root: &mut Node) {
        root.recompute_size();
        root.sort_children_by_size();
        self.apply_cap(root, 0);
        root.recompute_size();
        root.sort_children_by_size();
    }

    fn apply_cap(&self, node: &mut Node, depth: u32) {
        let Some(children) = node.children.as_mut() else {
            return;
        };

        if depth >= self.cap_depth && children.len() > self.max_children {
            let folded = children.split_off(self.max_children);
            let folded_size: u64 = folded.iter().map(|c| c.size).sum();
            if folded_size > 0 {
                children.push(Node::aggregate(&node.path, folded.len(), folded_size));
            }
        }

        for child in children.iter_mut() {
            self.apply_cap(child, depth + 1);
        }
    }
}

impl Default for Snapshotter {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_dir(count: u64) -> Node {
        let mut root = Node::new_directory("r", "/r");
        root.children = Some(
            (1..=count)
                .map(|size| Node::new_file(format!("f{size}"), format!("/r/f{size}"), size))
                .collect(),
        );
        root
    }

    #[test]
    fn test_cap_folds_smallest_into_aggregate() {
        let mut root = flat_dir(40);
        Snapshotter::new(0, 30).settle(&mut root);

        let children = root.children();
        assert_eq!(children.len(), 31);
        let explicit: Vec<u64> = children
            .iter()
            .filter(|c| !c.name.starts_with('('))
            .map(|c| c.size)
            .collect();
        assert_eq!(explicit, (11..=40).rev().collect::<Vec<_>>());

        let aggregate = root.child("(10 smaller items)").unwrap();
        assert_eq!(aggregate.size, 55);
        assert!(aggregate.is_file());
        assert_eq!(root.size, (1..=40).sum::<u64>());
    }

    #[test]
    fn test_no_cap_above_cap_depth() {
        let mut root = flat_dir(40);
        Snapshotter::new(1, 30).settle(&mut root);
        assert_eq!(root.child_count(), 40);
    }

    #[test]
    fn test_zero_size_remainder_is_dropped() {
        let mut root = Node::new_directory("r", "/r");
        let mut children = vec![Node::new_file("big", "/r/big", 10)];
        children.extend((0..5).map(|i| Node::new_file(format!("e{i}"), format!("/r/e{i}"), 0)));
        root.children = Some(children);

        Snapshotter::new(0, 2).settle(&mut root);

        assert_eq!(root.child_count(), 2);
        assert!(root.children().iter().all(|c| !c.name.starts_with('(')));
        assert_eq!(root.size, 10);
    }

    #[test]
    fn test_aggregate_sorted_among_siblings() {
        let mut root = Node::new_directory("r", "/r");
        root.children = Some(vec![
            Node::new_file("a", "/r/a", 100),
            Node::new_file("b", "/r/b", 5),
            Node::new_file("c", "/r/c", 4),
            Node::new_file("d", "/r/d", 3),
        ]);

        Snapshotter::new(0, 2).settle(&mut root);

        let sizes: Vec<u64> = root.children().iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![100, 7, 5]);
    }

    #[test]
    fn test_nested_cap_only_below_cap_depth() {
        let mut inner = flat_dir(5);
        inner.name = "inner".into();
        inner.path = "/r/inner".into();
        let mut root = Node::new_directory("top", "/top");
        let mut children = vec![inner];
        children.extend((1..=5).map(|s| Node::new_file(format!("t{s}"), format!("/top/t{s}"), s)));
        root.children = Some(children);

        Snapshotter::new(1, 2).settle(&mut root);

        // Root is above the cap depth and keeps all six children.
        assert_eq!(root.child_count(), 6);
        let inner = root.child("inner").unwrap();
        assert_eq!(inner.child_count(), 3);
        assert_eq!(inner.child("(3 smaller items)").unwrap().size, 6);
        assert_eq!(inner.size, 15);
    }
}
