//! Slot arena owning every node of a B+-tree.
//!
//! Nodes refer to each other by [`NodeId`], an index into the arena. Parent
//! to child ids express ownership; leaf sibling ids are navigation only. The
//! arena alone decides when a node's storage is reused.

use crate::bplus::node::{InternalNode, LeafNode, Node};

/// Stable identifier of a node within its arena.
pub type NodeId = usize;

/// Owns the nodes of one tree.
#[derive(Debug, Clone)]
pub struct NodeArena<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<NodeId>,
}

impl<K, V> Default for NodeArena<K, V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<K, V> NodeArena<K, V> {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node, reusing a released slot when one is available.
    pub fn alloc(&mut self, node: Node<K, V>) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.slots[id] = Some(node);
            id
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    /// Remove a node from the arena and hand it back.
    pub fn release(&mut self, id: NodeId) -> Node<K, V> {
        let Some(node) = self.slots.get_mut(id).and_then(Option::take) else {
            panic!("release of dead node {id}");
        };
        self.free.push(id);
        node
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Borrow a live node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> &Node<K, V> {
        match self.slots.get(id) {
            Some(Some(node)) => node,
            _ => panic!("access to dead node {id}"),
        }
    }

    /// Mutably borrow a live node.
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
        match self.slots.get_mut(id) {
            Some(Some(node)) => node,
            _ => panic!("access to dead node {id}"),
        }
    }

    /// Mutably borrow two distinct live nodes at once.
    pub fn pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut Node<K, V>, &mut Node<K, V>) {
        assert_ne!(a, b, "pair_mut on a single node");
        let (first, second) = if a < b {
            let (low, high) = self.slots.split_at_mut(b);
            (&mut low[a], &mut high[0])
        } else {
            let (low, high) = self.slots.split_at_mut(a);
            (&mut high[0], &mut low[b])
        };
        match (first, second) {
            (Some(first), Some(second)) => (first, second),
            _ => panic!("access to dead node {a} or {b}"),
        }
    }

    /// Borrow a node that must be internal.
    #[must_use]
    pub fn internal(&self, id: NodeId) -> &InternalNode<K> {
        match self.get(id) {
            Node::Internal(node) => node,
            Node::Leaf(_) => panic!("node {id} is a leaf"),
        }
    }

    /// Mutably borrow a node that must be internal.
    pub fn internal_mut(&mut self, id: NodeId) -> &mut InternalNode<K> {
        match self.get_mut(id) {
            Node::Internal(node) => node,
            Node::Leaf(_) => panic!("node {id} is a leaf"),
        }
    }

    /// Borrow a node that must be a leaf.
    #[must_use]
    pub fn leaf(&self, id: NodeId) -> &LeafNode<K, V> {
        match self.get(id) {
            Node::Leaf(node) => node,
            Node::Internal(_) => panic!("node {id} is internal"),
        }
    }

    /// Mutably borrow a node that must be a leaf.
    pub fn leaf_mut(&mut self, id: NodeId) -> &mut LeafNode<K, V> {
        match self.get_mut(id) {
            Node::Leaf(node) => node,
            Node::Internal(_) => panic!("node {id} is internal"),
        }
    }
}
