//! In-progress tree mutated by the walker while snapshots observe it.

use livedu_core::Node;

/// Index of a node inside a [`WorkingTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Slot {
    /// Node metadata; `children` is always `None` here.
    node: Node,
    children: Option<Vec<NodeId>>,
}

/// Arena-backed tree owned by one scan.
///
/// Nodes are only ever appended, each exactly once, so a `NodeId` stays
/// valid for the lifetime of the tree. Directory sizes are not maintained
/// here; [`crate::Snapshotter`] recomputes them from the leaves.
#[derive(Debug)]
pub struct WorkingTree {
    slots: Vec<Slot>,
}

impl WorkingTree {
    /// Create a tree holding only `root`.
    pub fn new(mut root: Node) -> Self {
        let children = root.children.take().map(|_| Vec::new());
        Self {
            slots: vec![Slot {
                node: root,
                children,
            }],
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        Self::root_id()
    }

    /// Id of the root in any tree.
    pub const fn root_id() -> NodeId {
        NodeId(0)
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the tree is only its root.
    pub fn is_empty(&self) -> bool {
        self.slots.len() <= 1
    }

    /// Metadata of a node, without its children.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.slots[id.0].node
    }

    /// Children of a node, `None` while unexpanded.
    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.slots[id.0].children.as_deref()
    }

    /// Mark a directory as expanded with no children yet.
    pub fn expand(&mut self, id: NodeId) {
        self.slots[id.0].children.get_or_insert_with(Vec::new);
    }

    /// Append `child` to `parent`, expanding `parent` if needed.
    pub fn push_child(&mut self, parent: NodeId, mut child: Node) -> NodeId {
        let id = NodeId(self.slots.len());
        let children = child.children.take().map(|_| Vec::new());
        self.slots.push(Slot {
            node: child,
            children,
        });
        self.slots[parent.0]
            .children
            .get_or_insert_with(Vec::new)
            .push(id);
        id
    }

    /// Mark a directory as truncated with an estimated size.
    pub fn set_truncated(&mut self, id: NodeId, size: u64) {
        let slot = &mut self.slots[id.0];
        slot.node.truncated = true;
        slot.node.size = size;
        slot.children = None;
    }

    /// Deep copy of the subtree at `id` as an owned [`Node`].
    ///
    /// The copy shares nothing with the working tree. Sizes are copied as
    /// stored, so directories still need settling.
    pub fn to_node(&self, id: NodeId) -> Node {
        let slot = &self.slots[id.0];
        let mut node = slot.node.clone();
        node.children = slot
            .children
            .as_ref()
            .map(|ids| ids.iter().map(|&child| self.to_node(child)).collect());
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_copy() {
        let mut tree = WorkingTree::new(Node::new_directory("r", "/r"));
        let root = tree.root();
        assert!(tree.children(root).is_none());

        let dir = tree.push_child(root, Node::new_directory("d", "/r/d"));
        tree.push_child(dir, Node::new_file("f", "/r/d/f", 7));
        tree.push_child(root, Node::new_file("g", "/r/g", 3));

        assert_eq!(tree.len(), 4);
        let copy = tree.to_node(root);
        assert_eq!(copy.child_count(), 2);
        assert_eq!(copy.child("d").unwrap().child("f").unwrap().size, 7);
        // Sizes are not rolled up by the working tree.
        assert_eq!(copy.size, 0);
    }

    #[test]
    fn test_expand_without_children() {
        let mut tree = WorkingTree::new(Node::new_directory("r", "/r"));
        let root = tree.root();
        tree.expand(root);
        assert_eq!(tree.children(root), Some(&[][..]));
        assert_eq!(tree.to_node(root).children, Some(Vec::new()));
    }

    #[test]
    fn test_set_truncated() {
        let mut tree = WorkingTree::new(Node::new_directory("r", "/r"));
        let root = tree.root();
        let deep = tree.push_child(root, Node::new_directory("deep", "/r/deep"));
        tree.set_truncated(deep, 2048);

        let node = tree.to_node(deep);
        assert!(node.truncated);
        assert_eq!(node.size, 2048);
        assert!(node.children.is_none());
    }

    #[test]
    fn test_copy_is_independent() {
        let mut tree = WorkingTree::new(Node::new_directory("r", "/r"));
        let root = tree.root();
        tree.push_child(root, Node::new_file("a", "/r/a", 1));

        let mut copy = tree.to_node(root);
        copy.children.as_mut().unwrap().clear();

        assert_eq!(tree.children(root).map(<[NodeId]>::len), Some(1));
    }
}
