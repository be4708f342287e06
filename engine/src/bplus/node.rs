//! B+-tree node types.
//!
//! The tree has two node kinds:
//! - Internal nodes: store separator keys and child ids
//! - Leaf nodes: store key-value pairs in a sorted main page, plus a small
//!   unsorted overflow buffer, doubly linked to their neighbours
//!
//! Both kinds implement [`NodeRole`], the structural operations the
//! orchestrator needs. [`Node`] dispatches to them by matching on the kind.

use crate::bplus::arena::NodeId;

/// Maximum number of keys in any node of the given order.
#[must_use]
pub const fn max_keys(order: usize) -> usize {
    2 * order - 1
}

/// Minimum number of keys in a non-root node of the given order.
#[must_use]
pub const fn min_keys(order: usize) -> usize {
    order - 1
}

/// Capacity of a leaf's overflow buffer.
#[must_use]
pub const fn buffer_capacity(order: usize) -> usize {
    order / 2
}

/// Lower bound of `key` in `keys`, clamped to the last index.
fn clamped_lower_bound<K: Ord>(keys: &[K], key: &K) -> usize {
    keys.partition_point(|k| k < key).min(keys.len().saturating_sub(1))
}

/// Structural operations shared by both node kinds.
///
/// Sibling-pair operations take the separator from the parent by value and
/// return the separator the parent should hold afterwards.
pub trait NodeRole<K>: Sized {
    /// Number of keys logically held by the node.
    fn key_count(&self) -> usize;

    /// Index of the first key not less than `key`, clamped to the last key.
    fn key_index(&self, key: &K) -> usize;

    /// Whether the node holds the maximum number of keys.
    fn is_full(&self, order: usize) -> bool {
        self.key_count() >= max_keys(order)
    }

    /// Split a full node in two.
    ///
    /// Returns the separator to insert in the parent and the new right
    /// sibling.
    fn split(&mut self, order: usize) -> (K, Self);

    /// Absorb `right`, which sat after `separator` in the parent.
    fn merge(&mut self, separator: K, right: Self);

    /// Take the last entry of `left` through the parent separator.
    fn borrow_from_left(&mut self, separator: K, left: &mut Self) -> K;

    /// Take the first entry of `right` through the parent separator.
    fn borrow_from_right(&mut self, separator: K, right: &mut Self) -> K;
}

/// An internal node.
///
/// Stores N keys and N+1 child ids.
/// `children[i]` holds keys < `keys[i]`,
/// `children[i+1]` holds keys >= `keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode<K> {
    pub(crate) keys: Vec<K>,
    pub(crate) children: Vec<NodeId>,
}

impl<K: Ord + Clone> InternalNode<K> {
    /// Create a key-less internal node above a single child.
    ///
    /// Only valid as a transient root that is split immediately.
    #[must_use]
    pub fn with_child(child: NodeId, order: usize) -> Self {
        let mut children = Vec::with_capacity(2 * order);
        children.push(child);
        Self {
            keys: Vec::with_capacity(max_keys(order)),
            children,
        }
    }

    /// Separator keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Child ids, one more than the number of keys.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Index of the child whose range contains `key`.
    ///
    /// Keys equal to a separator route to its right.
    #[must_use]
    pub fn child_index(&self, key: &K) -> usize {
        let index = self.key_index(key);
        match self.keys.get(index) {
            Some(separator) if key >= separator => index + 1,
            _ => index,
        }
    }

    /// Insert a separator and the child to its right.
    pub fn insert_child(&mut self, index: usize, separator: K, child: NodeId) {
        self.keys.insert(index, separator);
        self.children.insert(index + 1, child);
    }

    /// Remove `keys[index]` and the child to its right.
    pub fn remove_child(&mut self, index: usize) -> (K, NodeId) {
        let separator = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (separator, child)
    }
}

impl<K: Ord + Clone> NodeRole<K> for InternalNode<K> {
    fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn key_index(&self, key: &K) -> usize {
        clamped_lower_bound(&self.keys, key)
    }

    fn split(&mut self, order: usize) -> (K, Self) {
        assert_eq!(self.keys.len(), max_keys(order), "split of a non-full internal node");

        let right_keys = self.keys.split_off(order);
        let right_children = self.children.split_off(order);
        let Some(separator) = self.keys.pop() else {
            unreachable!("full internal node has a median key");
        };

        let mut keys = Vec::with_capacity(max_keys(order));
        keys.extend(right_keys);
        let mut children = Vec::with_capacity(2 * order);
        children.extend(right_children);

        (separator, Self { keys, children })
    }

    fn merge(&mut self, separator: K, right: Self) {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children);
    }

    fn borrow_from_left(&mut self, separator: K, left: &mut Self) -> K {
        let (Some(key), Some(child)) = (left.keys.pop(), left.children.pop()) else {
            panic!("borrow from an empty left sibling");
        };
        self.keys.insert(0, separator);
        self.children.insert(0, child);
        key
    }

    fn borrow_from_right(&mut self, separator: K, right: &mut Self) -> K {
        assert!(!right.keys.is_empty(), "borrow from an empty right sibling");
        let key = right.keys.remove(0);
        let child = right.children.remove(0);
        self.keys.push(separator);
        self.children.push(child);
        key
    }
}

/// A leaf node.
///
/// Entries live in the sorted main page (`keys`/`values`) or in the
/// unsorted overflow buffer. The buffer is folded into the main page by
/// [`LeafNode::flush`] before any structural change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) values: Vec<V>,
    pub(crate) overflow: Vec<(K, V)>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl<K: Ord + Clone, V> LeafNode<K, V> {
    /// Create an empty, unlinked leaf.
    #[must_use]
    pub fn new(order: usize) -> Self {
        Self {
            keys: Vec::with_capacity(max_keys(order)),
            values: Vec::with_capacity(max_keys(order)),
            overflow: Vec::with_capacity(buffer_capacity(order)),
            prev: None,
            next: None,
        }
    }

    /// Keys of the sorted main page.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Values of the sorted main page, parallel to [`LeafNode::keys`].
    #[must_use]
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Pending entries not yet merged into the main page.
    #[must_use]
    pub fn overflow(&self) -> &[(K, V)] {
        &self.overflow
    }

    /// Left neighbour in the leaf chain.
    #[must_use]
    pub const fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    /// Right neighbour in the leaf chain.
    #[must_use]
    pub const fn next(&self) -> Option<NodeId> {
        self.next
    }

    /// Look up a key in the main page, then in the overflow buffer.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        match self.main_index(key) {
            Some(i) => Some(&self.values[i]),
            None => self
                .overflow
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
        }
    }

    /// Mutable lookup, used to overwrite an existing entry.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.main_index(key) {
            Some(i) => Some(&mut self.values[i]),
            None => self
                .overflow
                .iter_mut()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
        }
    }

    /// Position of `key` in the main page.
    fn main_index(&self, key: &K) -> Option<usize> {
        let index = self.key_index(key);
        (self.keys.get(index) == Some(key)).then_some(index)
    }

    /// Insert a key that is not yet present.
    ///
    /// A main page close to full takes the entry directly. Otherwise the
    /// entry is appended to the overflow buffer, flushing it first when it
    /// is full.
    pub fn insert(&mut self, key: K, value: V, order: usize) {
        debug_assert!(self.get(&key).is_none(), "duplicate key in leaf insert");

        if self.keys.len() > max_keys(order) - buffer_capacity(order) {
            self.insert_main(key, value);
            return;
        }

        if self.overflow.len() >= buffer_capacity(order) {
            self.flush();
        }
        self.overflow.push((key, value));
    }

    /// Sort the overflow buffer and merge it into the main page.
    pub fn flush(&mut self) {
        if self.overflow.is_empty() {
            return;
        }
        tracing::trace!(pending = self.overflow.len(), "flushing leaf overflow buffer");

        let mut pending = std::mem::take(&mut self.overflow);
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in pending.drain(..) {
            self.insert_main(key, value);
        }
        // Reuse the buffer's allocation.
        self.overflow = pending;
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.flush();
        let index = self.main_index(key)?;
        self.keys.remove(index);
        Some(self.values.remove(index))
    }

    /// All entries in key order, overflow buffer included.
    #[must_use]
    pub fn entries(&self) -> Vec<(&K, &V)> {
        let mut entries: Vec<(&K, &V)> = self.keys.iter().zip(&self.values).collect();
        entries.extend(self.overflow.iter().map(|(k, v)| (k, v)));
        if !self.overflow.is_empty() {
            entries.sort_by(|a, b| a.0.cmp(b.0));
        }
        entries
    }

    fn insert_main(&mut self, key: K, value: V) {
        let index = self.keys.partition_point(|k| *k < key);
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    fn pop_last(&mut self) -> (K, V) {
        let (Some(key), Some(value)) = (self.keys.pop(), self.values.pop()) else {
            panic!("borrow from an empty leaf");
        };
        (key, value)
    }
}

impl<K: Ord + Clone, V> NodeRole<K> for LeafNode<K, V> {
    fn key_count(&self) -> usize {
        self.keys.len() + self.overflow.len()
    }

    fn key_index(&self, key: &K) -> usize {
        clamped_lower_bound(&self.keys, key)
    }

    fn split(&mut self, order: usize) -> (K, Self) {
        self.flush();
        assert_eq!(self.keys.len(), max_keys(order), "split of a non-full leaf");

        let mut right = Self::new(order);
        right.keys.extend(self.keys.split_off(order - 1));
        right.values.extend(self.values.split_off(order - 1));
        let separator = right.keys[0].clone();
        (separator, right)
    }

    fn merge(&mut self, _separator: K, mut right: Self) {
        self.flush();
        right.flush();
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
        self.next = right.next;
    }

    fn borrow_from_left(&mut self, _separator: K, left: &mut Self) -> K {
        self.flush();
        left.flush();
        let (key, value) = left.pop_last();
        self.keys.insert(0, key);
        self.values.insert(0, value);
        self.keys[0].clone()
    }

    fn borrow_from_right(&mut self, _separator: K, right: &mut Self) -> K {
        self.flush();
        right.flush();
        assert!(!right.keys.is_empty(), "borrow from an empty right sibling");
        let key = right.keys.remove(0);
        let value = right.values.remove(0);
        self.keys.push(key);
        self.values.push(value);
        right.keys[0].clone()
    }
}

/// A node of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

impl<K: Ord + Clone, V> Node<K, V> {
    /// Whether this is a leaf.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Number of keys logically held by the node.
    #[must_use]
    pub fn key_count(&self) -> usize {
        match self {
            Self::Internal(node) => node.key_count(),
            Self::Leaf(node) => node.key_count(),
        }
    }

    /// Whether the node holds the maximum number of keys.
    #[must_use]
    pub fn is_full(&self, order: usize) -> bool {
        match self {
            Self::Internal(node) => node.is_full(order),
            Self::Leaf(node) => node.is_full(order),
        }
    }

    /// Split a full node, returning the separator and the new right sibling.
    pub fn split(&mut self, order: usize) -> (K, Self) {
        match self {
            Self::Internal(node) => {
                let (separator, right) = node.split(order);
                (separator, Self::Internal(right))
            }
            Self::Leaf(node) => {
                let (separator, right) = node.split(order);
                (separator, Self::Leaf(right))
            }
        }
    }

    /// Absorb the right sibling.
    pub fn merge(&mut self, separator: K, right: Self) {
        match (self, right) {
            (Self::Internal(left), Self::Internal(right)) => left.merge(separator, right),
            (Self::Leaf(left), Self::Leaf(right)) => left.merge(separator, right),
            _ => unreachable!("merge of siblings with different kinds"),
        }
    }

    /// Rotate one entry in from the left sibling.
    pub fn borrow_from_left(&mut self, separator: K, left: &mut Self) -> K {
        match (self, left) {
            (Self::Internal(node), Self::Internal(left)) => node.borrow_from_left(separator, left),
            (Self::Leaf(node), Self::Leaf(left)) => node.borrow_from_left(separator, left),
            _ => unreachable!("borrow between siblings with different kinds"),
        }
    }

    /// Rotate one entry in from the right sibling.
    pub fn borrow_from_right(&mut self, separator: K, right: &mut Self) -> K {
        match (self, right) {
            (Self::Internal(node), Self::Internal(right)) => {
                node.borrow_from_right(separator, right)
            }
            (Self::Leaf(node), Self::Leaf(right)) => node.borrow_from_right(separator, right),
            _ => unreachable!("borrow between siblings with different kinds"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(order: usize, keys: &[u32]) -> LeafNode<u32, String> {
        let mut leaf = LeafNode::new(order);
        for &key in keys {
            leaf.insert(key, format!("v{key}"), order);
        }
        leaf
    }

    #[test]
    fn test_capacity_helpers() {
        assert_eq!(max_keys(3), 5);
        assert_eq!(min_keys(3), 2);
        assert_eq!(buffer_capacity(3), 1);
        assert_eq!(buffer_capacity(32), 16);
    }

    #[test]
    fn test_leaf_insert_goes_through_buffer() {
        let order = 4;
        let mut leaf = leaf_with(order, &[30, 10]);

        // Buffer capacity is 2, so both keys are pending.
        assert!(leaf.keys().is_empty());
        assert_eq!(leaf.overflow().len(), 2);
        assert_eq!(leaf.get(&10).map(String::as_str), Some("v10"));
        assert_eq!(leaf.get(&30).map(String::as_str), Some("v30"));

        // The third insert flushes the full buffer first.
        leaf.insert(20, "v20".to_string(), order);
        assert_eq!(leaf.keys(), &[10, 30]);
        assert_eq!(leaf.overflow().len(), 1);
        assert_eq!(leaf.key_count(), 3);

        leaf.flush();
        assert_eq!(leaf.keys(), &[10, 20, 30]);
        assert!(leaf.overflow().is_empty());
        assert_eq!(leaf.values(), &["v10", "v20", "v30"]);
    }

    #[test]
    fn test_leaf_insert_near_full_bypasses_buffer() {
        let order = 4; // max 7 keys, buffer 2
        let mut leaf = leaf_with(order, &[1, 2, 3, 4, 5, 6]);
        leaf.flush();
        assert_eq!(leaf.keys().len(), 6);

        // 6 > 7 - 2, so the entry goes straight into the main page.
        leaf.insert(0, "v0".to_string(), order);
        assert!(leaf.overflow().is_empty());
        assert_eq!(leaf.keys(), &[0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_leaf_entries_are_ordered() {
        let order = 4;
        let mut leaf = leaf_with(order, &[8, 2, 6, 4]);
        leaf.insert(5, "v5".to_string(), order);
        let keys: Vec<u32> = leaf.entries().into_iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![2, 4, 5, 6, 8]);
    }

    #[test]
    fn test_leaf_remove_flushes() {
        let order = 4;
        let mut leaf = leaf_with(order, &[3, 1]);
        assert_eq!(leaf.remove(&1).as_deref(), Some("v1"));
        assert_eq!(leaf.keys(), &[3]);
        assert!(leaf.overflow().is_empty());
        assert_eq!(leaf.remove(&1), None);
    }

    #[test]
    fn test_leaf_split_copies_separator_up() {
        let order = 3;
        let mut leaf = leaf_with(order, &[10, 20, 5, 6, 12]);
        assert!(leaf.is_full(order));

        let (separator, right) = leaf.split(order);
        assert_eq!(separator, 10);
        assert_eq!(leaf.keys(), &[5, 6]);
        assert_eq!(right.keys(), &[10, 12, 20]);
        assert_eq!(right.values(), &["v10", "v12", "v20"]);
    }

    #[test]
    fn test_internal_split_moves_median_up() {
        let order = 3;
        let mut node = InternalNode::with_child(100, order);
        for (i, key) in [10u32, 20, 30, 40, 50].into_iter().enumerate() {
            node.insert_child(i, key, 101 + i);
        }
        assert!(node.is_full(order));

        let (separator, right) = node.split(order);
        assert_eq!(separator, 30);
        assert_eq!(node.keys(), &[10, 20]);
        assert_eq!(node.children(), &[100, 101, 102]);
        assert_eq!(right.keys(), &[40, 50]);
        assert_eq!(right.children(), &[103, 104, 105]);
    }

    #[test]
    fn test_child_index_routes_equal_keys_right() {
        let mut node = InternalNode::with_child(0, 3);
        node.insert_child(0, 10u32, 1);
        node.insert_child(1, 20, 2);

        assert_eq!(node.child_index(&5), 0);
        assert_eq!(node.child_index(&10), 1);
        assert_eq!(node.child_index(&15), 1);
        assert_eq!(node.child_index(&20), 2);
        assert_eq!(node.child_index(&25), 2);
        assert_eq!(node.key_index(&20), 1);
        assert_eq!(node.key_index(&99), 1);
    }

    #[test]
    fn test_key_index_clamps_to_last_key() {
        let mut leaf = LeafNode::new(3);
        assert_eq!(leaf.key_index(&7), 0);
        for key in [10u32, 20, 30] {
            leaf.insert_main(key, u64::from(key));
        }
        assert_eq!(leaf.key_index(&5), 0);
        assert_eq!(leaf.key_index(&20), 1);
        assert_eq!(leaf.key_index(&25), 2);
        assert_eq!(leaf.key_index(&31), 2);
        assert_eq!(leaf.get(&30), Some(&30));
        assert_eq!(leaf.get(&31), None);
    }

    #[test]
    fn test_internal_borrow_rotates_through_separator() {
        let order = 2;
        let mut left = InternalNode::with_child(0, order);
        left.insert_child(0, 10u32, 1);
        left.insert_child(1, 20, 2);
        let mut node = InternalNode::with_child(3, order);
        node.insert_child(0, 40, 4);

        let separator = node.borrow_from_left(30, &mut left);
        assert_eq!(separator, 20);
        assert_eq!(left.keys(), &[10]);
        assert_eq!(left.children(), &[0, 1]);
        assert_eq!(node.keys(), &[30, 40]);
        assert_eq!(node.children(), &[2, 3, 4]);

        let separator = left.borrow_from_right(separator, &mut node);
        assert_eq!(separator, 30);
        assert_eq!(left.keys(), &[10, 20]);
        assert_eq!(left.children(), &[0, 1, 2]);
        assert_eq!(node.keys(), &[40]);
        assert_eq!(node.children(), &[3, 4]);
    }

    #[test]
    fn test_leaf_borrow_updates_separator() {
        let order = 3;
        let mut left = leaf_with(order, &[1, 2, 3]);
        let mut node = leaf_with(order, &[5, 6]);

        let separator = node.borrow_from_left(5, &mut left);
        assert_eq!(separator, 3);
        assert_eq!(left.keys(), &[1, 2]);
        assert_eq!(node.keys(), &[3, 5, 6]);

        let separator = left.borrow_from_right(separator, &mut node);
        assert_eq!(separator, 5);
        assert_eq!(left.keys(), &[1, 2, 3]);
        assert_eq!(node.keys(), &[5, 6]);
    }

    #[test]
    fn test_leaf_merge_takes_right_link() {
        let order = 3;
        let mut left = leaf_with(order, &[1, 2]);
        let mut right = leaf_with(order, &[5, 6]);
        left.next = Some(7);
        right.prev = Some(6);
        right.next = Some(8);

        left.merge(5, right);
        assert_eq!(left.keys(), &[1, 2, 5, 6]);
        assert_eq!(left.next(), Some(8));
    }

    #[test]
    fn test_node_dispatch() {
        let order = 3;
        let mut node: Node<u32, String> = Node::Leaf(leaf_with(order, &[1, 2, 3, 4, 5]));
        assert!(node.is_leaf());
        assert!(node.is_full(order));

        let (separator, right) = node.split(order);
        assert_eq!(separator, 3);
        assert_eq!(node.key_count(), 2);
        assert_eq!(right.key_count(), 3);

        node.merge(separator, right);
        assert_eq!(node.key_count(), 5);
    }
}
