//! In-memory classic B-tree.

use std::convert::Infallible;

use crate::classic::node::Node;
use crate::index::{KeyValueIndex, OrderError, check_order};
use crate::invariants::{
    InvariantViolation, ensure, ensure_strictly_ascending, ensure_within_bounds,
};

/// A classic B-tree of minimum degree `t`.
///
/// Nodes hold between `t - 1` and `2t - 1` entries (the root may hold
/// fewer). Internal entries carry values, so a key lives in exactly one node.
#[derive(Debug, Clone)]
pub struct BTree<K, V> {
    root: Node<K, V>,
    min_degree: usize,
    len: usize,
}

impl<K: Ord, V> BTree<K, V> {
    /// Create an empty tree.
    pub fn new(min_degree: usize) -> Result<Self, OrderError> {
        let min_degree = check_order(min_degree)?;
        Ok(Self {
            root: Node::leaf(min_degree),
            min_degree,
            len: 0,
        })
    }

    /// The minimum degree the tree was built with.
    #[must_use]
    pub const fn min_degree(&self) -> usize {
        self.min_degree
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

    /// The root node.
    #[must_use]
    pub const fn root(&self) -> &Node<K, V> {
        &self.root
    }

    /// Number of levels, counting the leaves.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = &self.root;
        while let Some(child) = node.children.first() {
            node = child;
            height += 1;
        }
        height
    }

    /// Look up a value by key.
    #[must_use]
    pub fn search(&self, key: &K) -> Option<&V> {
        self.root.search(key)
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
        if self.root.is_full(self.min_degree) {
            let old_root = std::mem::replace(&mut self.root, Node::leaf(self.min_degree));
            self.root.children.push(old_root);
            self.root.split_child(0, self.min_degree);
            tracing::debug!(height = self.height(), "promoted new classic root");
        }

        let old = self.root.insert_non_full(key, value, self.min_degree);
        if old.is_none() {
            self.len += 1;
        }
        old
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

        let t = self.min_degree;
        if self.root.keys.len() == 1
            && !self.root.is_leaf()
            && self.root.children.iter().all(|child| child.keys.len() == t - 1)
        {
            self.root.merge(0);
            self.collapse_root();
        }

        let value = self.root.remove(key, t);
        if value.is_some() {
            self.len -= 1;
        }
        self.collapse_root();
        value
    }

    /// Iterate over all entries in key order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.descend_leftmost(&self.root);
        iter
    }

    fn collapse_root(&mut self) {
        while self.root.keys.is_empty() && !self.root.is_leaf() {
            let Some(child) = self.root.children.pop() else {
                break;
            };
            self.root = child;
            tracing::debug!(height = self.height(), "demoted classic root");
        }
    }

    /// Verify ordering, occupancy and depth invariants.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut leaf_depth = None;
        let counted = self.check_node(&self.root, None, None, 0, &mut leaf_depth)?;
        ensure(counted == self.len, "entry count mismatch", || {
            format!("counted {counted}, recorded {}", self.len)
        })
    }

    fn check_node(
        &self,
        node: &Node<K, V>,
        lower: Option<&K>,
        upper: Option<&K>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> Result<usize, InvariantViolation> {
        let t = self.min_degree;
        let is_root = depth == 0;
        let context = || format!("node at depth {depth}");

        ensure(node.keys.len() <= 2 * t - 1, "node holds too many keys", context)?;
        ensure(
            is_root || node.keys.len() >= t - 1,
            "non-root node holds too few keys",
            context,
        )?;
        ensure(
            node.keys.len() == node.values.len(),
            "keys and values differ in length",
            context,
        )?;
        ensure_strictly_ascending(&node.keys, context)?;
        ensure_within_bounds(&node.keys, lower, upper, context)?;
        ensure(
            lower.is_none_or(|lower| node.keys.first().is_none_or(|first| first > lower)),
            "key equals an ancestor separator",
            context,
        )?;

        if node.is_leaf() {
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(expected) => ensure(expected == depth, "leaves at different depths", context)?,
            }
            return Ok(node.keys.len());
        }

        ensure(
            node.children.len() == node.keys.len() + 1,
            "internal node child count is not key count plus one",
            context,
        )?;
        let mut count = node.keys.len();
        for (i, child) in node.children.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
            let child_upper = node.keys.get(i).or(upper);
            count += self.check_node(child, child_lower, child_upper, depth + 1, leaf_depth)?;
        }
        Ok(count)
    }
}

/// In-order iterator over the entries of a [`BTree`].
pub struct Iter<'a, K, V> {
    stack: Vec<(&'a Node<K, V>, usize)>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn descend_leftmost(&mut self, mut node: &'a Node<K, V>) {
        loop {
            self.stack.push((node, 0));
            match node.children.first() {
                Some(child) => node = child,
                None => break,
            }
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node, index) = self.stack.last_mut()?;
            let node: &'a Node<K, V> = *node;
            if *index < node.keys.len() {
                let i = *index;
                *index += 1;
                if let Some(child) = node.children.get(i + 1) {
                    self.descend_leftmost(child);
                }
                return Some((&node.keys[i], &node.values[i]));
            }
            self.stack.pop();
        }
    }
}

impl<K: Ord, V: Clone> KeyValueIndex<K, V> for BTree<K, V> {
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

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn build(min_degree: usize, keys: &[u32]) -> BTree<u32, u64> {
        let mut tree = BTree::new(min_degree).expect("valid minimum degree");
        for &key in keys {
            tree.insert(key, u64::from(key) * 10);
            tree.check_invariants().expect("invariants after insert");
        }
        tree
    }

    fn shuffled(count: u32, seed: u64) -> Vec<u32> {
        let mut keys: Vec<u32> = (0..count).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(seed));
        keys
    }

    #[test]
    fn test_rejects_small_degree() {
        assert!(BTree::<u32, u32>::new(0).is_err());
        assert!(BTree::<u32, u32>::new(1).is_err());
    }

    #[test]
    fn test_scenario_root_split() {
        let mut tree = build(3, &[10, 20, 5, 6, 12]);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root().keys(), &[5, 6, 10, 12, 20]);

        tree.insert(30, 300);
        let root = tree.root();
        assert_eq!(root.keys(), &[10]);
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0].keys(), &[5, 6]);
        assert_eq!(root.children()[1].keys(), &[12, 20, 30]);

        tree.insert(7, 70);
        tree.insert(17, 170);
        tree.check_invariants().expect("invariants after scenario");
        let root = tree.root();
        assert_eq!(root.children()[0].keys(), &[5, 6, 7]);
        assert_eq!(root.children()[1].keys(), &[12, 17, 20, 30]);
    }

    #[test]
    fn test_string_keys() {
        let mut tree = BTree::new(2).expect("valid minimum degree");
        for name in ["mara", "ade", "lin", "sol", "ines", "bo", "kai"] {
            tree.insert(name.to_string(), name.len());
        }
        assert_eq!(tree.search(&"lin".to_string()), Some(&3));
        assert!(tree.remove(&"ade".to_string()));
        let names: Vec<&str> = tree.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["bo", "ines", "kai", "lin", "mara", "sol"]);
        tree.check_invariants().expect("invariants with string keys");
    }

    #[test]
    fn test_duplicate_insert_overwrites() {
        let mut tree = build(2, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        // 4 sits in an internal node at this point.
        assert_eq!(tree.insert(4, 1), Some(40));
        assert_eq!(tree.insert(9, 2), Some(90));
        assert_eq!(tree.len(), 9);
        assert_eq!(tree.search(&4), Some(&1));
        tree.check_invariants().expect("invariants after overwrite");
    }

    #[test]
    fn test_round_trip_random_keys() {
        for min_degree in [2, 3, 16] {
            let keys = shuffled(3000, 21);
            let tree = build(min_degree, &keys);
            for key in &keys {
                assert_eq!(tree.search(key), Some(&(u64::from(*key) * 10)));
            }
            assert!(!tree.contains(&3000));
            let walked: Vec<u32> = tree.iter().map(|(k, _)| *k).collect();
            assert_eq!(walked, (0..3000).collect::<Vec<u32>>());
        }
    }

    #[test]
    fn test_remove_drains_tree() {
        for min_degree in [2, 3, 4] {
            let keys = shuffled(800, 5);
            let mut tree = build(min_degree, &keys);
            for key in shuffled(800, 6) {
                assert!(tree.remove(&key));
                assert!(!tree.contains(&key));
                tree.check_invariants().expect("invariants after remove");
            }
            assert!(tree.is_empty());
            assert_eq!(tree.height(), 1);
            assert!(!tree.remove(&1));
        }
    }

    #[test]
    fn test_random_mixed_workload() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut tree = BTree::new(2).expect("valid minimum degree");
        let mut model = std::collections::BTreeMap::new();

        for step in 0..6000u64 {
            let key = rng.random_range(0..400u32);
            match rng.random_range(0..3) {
                0 | 1 => assert_eq!(tree.insert(key, step), model.insert(key, step)),
                _ => assert_eq!(tree.take(&key), model.remove(&key)),
            }
            if step % 100 == 0 {
                tree.check_invariants().expect("invariants during workload");
            }
        }

        assert_eq!(tree.len(), model.len());
        let entries: Vec<(u32, u64)> = tree.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(entries, model.into_iter().collect::<Vec<_>>());
    }
}
