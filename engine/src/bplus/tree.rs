//! B+-tree orchestrator.
//!
//! Insertion splits full nodes on the way down and deletion fills minimal
//! nodes on the way down, so neither ever walks back up. Entries live only
//! in leaves; internal keys are routing copies.

use std::convert::Infallible;

use crate::bplus::arena::{NodeArena, NodeId};
use crate::bplus::node::{InternalNode, LeafNode, Node, buffer_capacity, max_keys, min_keys};
use crate::index::{KeyValueIndex, OrderError, check_order};
use crate::invariants::{
    InvariantViolation, ensure, ensure_strictly_ascending, ensure_within_bounds,
};

/// An in-memory B+-tree with buffered leaves and a doubly linked leaf chain.
#[derive(Debug, Clone)]
pub struct BPlusTree<K, V> {
    arena: NodeArena<K, V>,
    root: NodeId,
    order: usize,
    len: usize,
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Create an empty tree whose nodes hold at most `2 * order - 1` keys.
    pub fn new(order: usize) -> Result<Self, OrderError> {
        let order = check_order(order)?;
        let mut arena = NodeArena::new();
        let root = arena.alloc(Node::Leaf(LeafNode::new(order)));
        Ok(Self {
            arena,
            root,
            order,
            len: 0,
        })
    }

    /// The order the tree was built with.
    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Id of the root node.
    #[must_use]
    pub const fn root_id(&self) -> NodeId {
        self.root
    }

    /// Borrow a node by id, for inspection.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node<K, V> {
        self.arena.get(id)
    }

    /// Number of levels, counting the leaves.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while let Node::Internal(node) = self.arena.get(id) {
            id = node.children[0];
            height += 1;
        }
        height
    }

    /// Look up a value by key.
    #[must_use]
    pub fn search(&self, key: &K) -> Option<&V> {
        self.arena.leaf(self.find_leaf(key)).get(key)
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.search(key).is_some()
    }

    /// Insert or update a key-value pair.
    ///
    /// Returns the old value if updating, None if inserting.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let leaf = self.find_leaf(&key);
        if let Some(slot) = self.arena.leaf_mut(leaf).get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }

        if self.arena.get(self.root).is_full(self.order) {
            self.grow_root();
        }

        let mut id = self.root;
        loop {
            let (mut index, child) = match self.arena.get(id) {
                Node::Leaf(_) => break,
                Node::Internal(node) => {
                    let index = node.child_index(&key);
                    (index, node.children[index])
                }
            };

            if self.arena.get(child).is_full(self.order) {
                self.split_child(id, index);
                if key >= self.arena.internal(id).keys[index] {
                    index += 1;
                }
            }
            id = self.arena.internal(id).children[index];
        }

        self.arena.leaf_mut(id).insert(key, value, self.order);
        self.len += 1;
        None
    }

    /// Remove a key. Returns `false` if it was absent.
    pub fn remove(&mut self, key: &K) -> bool {
        self.take(key).is_some()
    }

    /// Remove a key and return its value.
    pub fn take(&mut self, key: &K) -> Option<V> {
        if !self.contains(key) {
            return None;
        }

        self.shrink_sparse_root();

        let mut id = self.root;
        loop {
            let (index, child) = match self.arena.get(id) {
                Node::Leaf(_) => break,
                Node::Internal(node) => {
                    let index = node.child_index(key);
                    (index, node.children[index])
                }
            };

            id = if self.arena.get(child).key_count() <= min_keys(self.order) {
                self.fill_child(id, index)
            } else {
                child
            };
        }

        let value = self.arena.leaf_mut(id).remove(key);
        if value.is_some() {
            self.len -= 1;
        }
        self.collapse_root();
        value
    }

    /// Fold every leaf's overflow buffer into its main page.
    pub fn flush_all(&mut self) {
        let mut next = Some(self.leftmost_leaf());
        while let Some(id) = next {
            let leaf = self.arena.leaf_mut(id);
            leaf.flush();
            next = leaf.next;
        }
    }

    /// Iterate over all entries in key order by walking the leaf chain.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            arena: &self.arena,
            next_leaf: Some(self.leftmost_leaf()),
            pending: Vec::new().into_iter(),
        }
    }

    fn find_leaf(&self, key: &K) -> NodeId {
        let mut id = self.root;
        while let Node::Internal(node) = self.arena.get(id) {
            id = node.children[node.child_index(key)];
        }
        id
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut id = self.root;
        while let Node::Internal(node) = self.arena.get(id) {
            id = node.children[0];
        }
        id
    }

    /// Wrap the full root in a new internal root and split it.
    fn grow_root(&mut self) {
        let old_root = self.root;
        let root = InternalNode::with_child(old_root, self.order);
        self.root = self.arena.alloc(Node::Internal(root));
        self.split_child(self.root, 0);
        tracing::debug!(
            root = self.root,
            height = self.height(),
            "promoted new B+-tree root"
        );
    }

    /// Split `children[index]` of `parent`, which must be full.
    fn split_child(&mut self, parent: NodeId, index: usize) {
        let child = self.arena.internal(parent).children[index];
        let (separator, sibling) = self.arena.get_mut(child).split(self.order);
        let is_leaf = sibling.is_leaf();
        let sibling = self.arena.alloc(sibling);

        if is_leaf {
            let next = self.arena.leaf(child).next;
            let new_leaf = self.arena.leaf_mut(sibling);
            new_leaf.prev = Some(child);
            new_leaf.next = next;
            self.arena.leaf_mut(child).next = Some(sibling);
            if let Some(next) = next {
                self.arena.leaf_mut(next).prev = Some(sibling);
            }
        }

        tracing::trace!(parent, child, sibling, is_leaf, "split node");
        self.arena
            .internal_mut(parent)
            .insert_child(index, separator, sibling);
    }

    /// Give `children[index]` of `parent` a spare key before descending.
    ///
    /// Returns the id of the node that now covers the child's key range.
    fn fill_child(&mut self, parent: NodeId, index: usize) -> NodeId {
        let node = self.arena.internal(parent);
        let left = index.checked_sub(1).map(|i| node.children[i]);
        let right = node.children.get(index + 1).copied();
        let spare = |id: &NodeId| self.arena.get(*id).key_count() > min_keys(self.order);

        if left.as_ref().is_some_and(spare) {
            self.rotate_from_left(parent, index);
            self.arena.internal(parent).children[index]
        } else if right.as_ref().is_some_and(spare) {
            self.rotate_from_right(parent, index);
            self.arena.internal(parent).children[index]
        } else if left.is_some() {
            self.merge_children(parent, index - 1);
            self.arena.internal(parent).children[index - 1]
        } else {
            self.merge_children(parent, index);
            self.arena.internal(parent).children[index]
        }
    }

    fn rotate_from_left(&mut self, parent: NodeId, index: usize) {
        let node = self.arena.internal(parent);
        let (left, child) = (node.children[index - 1], node.children[index]);
        let separator = node.keys[index - 1].clone();

        let (child_node, left_node) = self.arena.pair_mut(child, left);
        let separator = child_node.borrow_from_left(separator, left_node);
        self.arena.internal_mut(parent).keys[index - 1] = separator;
        tracing::trace!(parent, child, left, "borrowed from left sibling");
    }

    fn rotate_from_right(&mut self, parent: NodeId, index: usize) {
        let node = self.arena.internal(parent);
        let (child, right) = (node.children[index], node.children[index + 1]);
        let separator = node.keys[index].clone();

        let (child_node, right_node) = self.arena.pair_mut(child, right);
        let separator = child_node.borrow_from_right(separator, right_node);
        self.arena.internal_mut(parent).keys[index] = separator;
        tracing::trace!(parent, child, right, "borrowed from right sibling");
    }

    /// Merge `children[index + 1]` of `parent` into `children[index]`.
    fn merge_children(&mut self, parent: NodeId, index: usize) {
        let (separator, right) = self.arena.internal_mut(parent).remove_child(index);
        let left = self.arena.internal(parent).children[index];
        let right_node = self.arena.release(right);
        self.arena.get_mut(left).merge(separator, right_node);

        if let Node::Leaf(leaf) = self.arena.get(left)
            && let Some(next) = leaf.next
        {
            self.arena.leaf_mut(next).prev = Some(left);
        }
        tracing::trace!(parent, left, right, "merged siblings");
    }

    /// Merge the two children of a one-key root when both are minimal.
    fn shrink_sparse_root(&mut self) {
        let Node::Internal(root) = self.arena.get(self.root) else {
            return;
        };
        if root.keys.len() != 1 {
            return;
        }
        let minimal = |id: NodeId| self.arena.get(id).key_count() == min_keys(self.order);
        if minimal(root.children[0]) && minimal(root.children[1]) {
            self.merge_children(self.root, 0);
            self.collapse_root();
        }
    }

    /// Replace a key-less internal root with its only child.
    fn collapse_root(&mut self) {
        while let Node::Internal(root) = self.arena.get(self.root) {
            if !root.keys.is_empty() {
                break;
            }
            let child = root.children[0];
            self.arena.release(self.root);
            self.root = child;
            tracing::debug!(root = self.root, "demoted B+-tree root");
        }
    }

    /// Verify ordering, occupancy, depth and leaf-chain invariants.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut walk = Walk {
            leaf_depth: None,
            leaves: Vec::new(),
            entries: 0,
            nodes: 0,
        };
        self.check_node(self.root, None, None, 0, &mut walk)?;

        ensure(walk.entries == self.len, "entry count mismatch", || {
            format!("counted {}, recorded {}", walk.entries, self.len)
        })?;
        ensure(
            walk.nodes == self.arena.live_count(),
            "arena holds unreachable nodes",
            || format!("reachable {}, live {}", walk.nodes, self.arena.live_count()),
        )?;
        self.check_leaf_chain(&walk.leaves)
    }

    fn check_node<'a>(
        &'a self,
        id: NodeId,
        lower: Option<&'a K>,
        upper: Option<&'a K>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<(), InvariantViolation> {
        let order = self.order;
        let is_root = id == self.root;
        let context = || format!("node {id} at depth {depth}");
        walk.nodes += 1;

        let count = self.arena.get(id).key_count();
        ensure(count <= max_keys(order), "node holds too many keys", context)?;
        ensure(
            is_root || count >= min_keys(order),
            "non-root node holds too few keys",
            context,
        )?;

        match self.arena.get(id) {
            Node::Leaf(leaf) => {
                ensure_strictly_ascending(&leaf.keys, context)?;
                ensure(
                    leaf.keys.len() == leaf.values.len(),
                    "leaf keys and values differ in length",
                    context,
                )?;
                ensure(
                    leaf.overflow.len() <= buffer_capacity(order),
                    "overflow buffer over capacity",
                    context,
                )?;
                let keys: Vec<&K> = leaf.entries().into_iter().map(|(k, _)| k).collect();
                ensure_strictly_ascending(&keys, context)?;
                ensure_within_bounds(&keys, lower.as_ref(), upper.as_ref(), context)?;

                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(expected) => {
                        ensure(expected == depth, "leaves at different depths", context)?;
                    }
                }
                walk.leaves.push(id);
                walk.entries += keys.len();
            }
            Node::Internal(node) => {
                ensure_strictly_ascending(&node.keys, context)?;
                ensure_within_bounds(&node.keys, lower, upper, context)?;
                ensure(
                    node.children.len() == node.keys.len() + 1,
                    "internal node child count is not key count plus one",
                    context,
                )?;
                ensure(!node.keys.is_empty(), "internal node without keys", context)?;

                for (i, &child) in node.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
                    let child_upper = node.keys.get(i).or(upper);
                    self.check_node(child, child_lower, child_upper, depth + 1, walk)?;
                }
            }
        }
        Ok(())
    }

    fn check_leaf_chain(&self, in_order: &[NodeId]) -> Result<(), InvariantViolation> {
        let mut chain = Vec::with_capacity(in_order.len());
        let mut prev = None;
        let mut next = in_order.first().copied();
        while let Some(id) = next {
            let leaf = self.arena.leaf(id);
            ensure(leaf.prev == prev, "leaf back link is inconsistent", || {
                format!("leaf {id}")
            })?;
            ensure(chain.len() < in_order.len(), "leaf chain is too long", || {
                format!("leaf {id}")
            })?;
            chain.push(id);
            prev = Some(id);
            next = leaf.next;
        }
        ensure(
            chain == in_order,
            "leaf chain does not match in-order leaves",
            || format!("chain {chain:?}, tree {in_order:?}"),
        )?;

        let keys: Vec<&K> = self.iter().map(|(k, _)| k).collect();
        ensure_strictly_ascending(&keys, || "leaf chain walk".to_string())
    }
}

/// Accumulated state of an invariant walk.
struct Walk {
    leaf_depth: Option<usize>,
    leaves: Vec<NodeId>,
    entries: usize,
    nodes: usize,
}

/// Ordered iterator over the entries of a [`BPlusTree`].
pub struct Iter<'a, K, V> {
    arena: &'a NodeArena<K, V>,
    next_leaf: Option<NodeId>,
    pending: std::vec::IntoIter<(&'a K, &'a V)>,
}

impl<'a, K: Ord + Clone, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.next() {
                return Some(entry);
            }
            let leaf = self.arena.leaf(self.next_leaf?);
            self.pending = leaf.entries().into_iter();
            self.next_leaf = leaf.next;
        }
    }
}

impl<K: Ord + Clone, V: Clone> KeyValueIndex<K, V> for BPlusTree<K, V> {
    type Error = Infallible;

    fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Self::Error> {
        Ok(Self::insert(self, key, value))
    }

    fn remove(&mut self, key: &K) -> Result<bool, Self::Error> {
        Ok(Self::remove(self, key))
    }

    fn search(&mut self, key: &K) -> Result<Option<V>, Self::Error> {
        Ok(Self::search(self, key).cloned())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn check_invariants(&mut self) -> Result<(), InvariantViolation> {
        Self::check_invariants(self)
    }
}
