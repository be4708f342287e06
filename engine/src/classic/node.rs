//! Classic B-tree node.
//!
//! Every node stores entries (key and value together); internal nodes also
//! own their children. A node of minimum degree `t` holds between `t - 1`
//! and `2t - 1` entries, except the root which may hold fewer.

/// A classic B-tree node.
///
/// Leaves have no children; an internal node with N keys owns N+1 children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) values: Vec<V>,
    pub(crate) children: Vec<Self>,
}

impl<K: Ord, V> Node<K, V> {
    /// Create an empty leaf with room for `2t - 1` entries.
    #[must_use]
    pub fn leaf(min_degree: usize) -> Self {
        Self {
            keys: Vec::with_capacity(2 * min_degree - 1),
            values: Vec::with_capacity(2 * min_degree - 1),
            children: Vec::new(),
        }
    }

    /// Keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Values parallel to [`Node::keys`].
    #[must_use]
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Children, empty for a leaf.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Whether this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the node holds `2t - 1` keys.
    #[must_use]
    pub fn is_full(&self, min_degree: usize) -> bool {
        self.keys.len() >= 2 * min_degree - 1
    }

    /// Look up a key in this subtree.
    #[must_use]
    pub fn search(&self, key: &K) -> Option<&V> {
        let mut node = self;
        loop {
            match node.keys.binary_search(key) {
                Ok(i) => return Some(&node.values[i]),
                Err(_) if node.is_leaf() => return None,
                Err(i) => node = &node.children[i],
            }
        }
    }

    /// Split the full child at `index`, lifting its median into this node.
    pub fn split_child(&mut self, index: usize, min_degree: usize) {
        let t = min_degree;
        let child = &mut self.children[index];
        assert!(child.is_full(t), "split of a non-full child");

        let mut right = Self::leaf(t);
        right.keys.extend(child.keys.split_off(t));
        right.values.extend(child.values.split_off(t));
        if !child.is_leaf() {
            right.children = child.children.split_off(t);
        }
        let (Some(median_key), Some(median_value)) = (child.keys.pop(), child.values.pop()) else {
            unreachable!("full child has a median entry");
        };

        self.keys.insert(index, median_key);
        self.values.insert(index, median_value);
        self.children.insert(index + 1, right);
    }

    /// Insert into a subtree whose root is not full.
    ///
    /// Returns the previous value if the key was already present.
    pub fn insert_non_full(&mut self, key: K, value: V, min_degree: usize) -> Option<V> {
        let mut index = match self.keys.binary_search(&key) {
            Ok(i) => return Some(std::mem::replace(&mut self.values[i], value)),
            Err(i) => i,
        };

        if self.is_leaf() {
            self.keys.insert(index, key);
            self.values.insert(index, value);
            return None;
        }

        if self.children[index].is_full(min_degree) {
            self.split_child(index, min_degree);
            tracing::trace!(index, "split classic node");
            match key.cmp(&self.keys[index]) {
                std::cmp::Ordering::Equal => {
                    return Some(std::mem::replace(&mut self.values[index], value));
                }
                std::cmp::Ordering::Greater => index += 1,
                std::cmp::Ordering::Less => {}
            }
        }
        self.children[index].insert_non_full(key, value, min_degree)
    }

    /// Remove a key from a subtree whose root holds at least `t` keys
    /// (or is the tree root).
    pub fn remove(&mut self, key: &K, min_degree: usize) -> Option<V> {
        match self.keys.binary_search(key) {
            Ok(i) if self.is_leaf() => {
                self.keys.remove(i);
                Some(self.values.remove(i))
            }
            Ok(i) => self.remove_from_internal(i, key, min_degree),
            Err(_) if self.is_leaf() => None,
            Err(i) => {
                let i = self.ensure_spare(i, min_degree);
                self.children[i].remove(key, min_degree)
            }
        }
    }

    /// Remove `keys[index]` of an internal node.
    ///
    /// The entry is replaced by its predecessor or successor when the
    /// corresponding child can spare one, otherwise both children merge
    /// around it and the removal continues in the merged child.
    fn remove_from_internal(&mut self, index: usize, key: &K, min_degree: usize) -> Option<V> {
        if self.children[index].keys.len() >= min_degree {
            let (pred_key, pred_value) = self.children[index].pop_last(min_degree);
            self.keys[index] = pred_key;
            return Some(std::mem::replace(&mut self.values[index], pred_value));
        }
        if self.children[index + 1].keys.len() >= min_degree {
            let (succ_key, succ_value) = self.children[index + 1].pop_first(min_degree);
            self.keys[index] = succ_key;
            return Some(std::mem::replace(&mut self.values[index], succ_value));
        }
        self.merge(index);
        self.children[index].remove(key, min_degree)
    }

    /// Remove and return the largest entry of this subtree.
    pub fn pop_last(&mut self, min_degree: usize) -> (K, V) {
        if self.is_leaf() {
            let (Some(key), Some(value)) = (self.keys.pop(), self.values.pop()) else {
                panic!("pop from an empty leaf");
            };
            return (key, value);
        }
        let last = self.children.len() - 1;
        let i = self.ensure_spare(last, min_degree);
        self.children[i].pop_last(min_degree)
    }

    /// Remove and return the smallest entry of this subtree.
    pub fn pop_first(&mut self, min_degree: usize) -> (K, V) {
        if self.is_leaf() {
            assert!(!self.keys.is_empty(), "pop from an empty leaf");
            return (self.keys.remove(0), self.values.remove(0));
        }
        let i = self.ensure_spare(0, min_degree);
        self.children[i].pop_first(min_degree)
    }

    /// Make sure `children[index]` holds at least `t` keys.
    ///
    /// Returns the index of the child that now covers the original child's
    /// key range.
    fn ensure_spare(&mut self, index: usize, min_degree: usize) -> usize {
        if self.children[index].keys.len() >= min_degree {
            return index;
        }
        self.fill(index, min_degree)
    }

    /// Borrow from a sibling with a spare key, else merge with one.
    pub fn fill(&mut self, index: usize, min_degree: usize) -> usize {
        let spare = |i: usize| self.children[i].keys.len() >= min_degree;
        let has_left = index > 0;
        let has_right = index + 1 < self.children.len();

        if has_left && spare(index - 1) {
            self.borrow_from_prev(index);
            index
        } else if has_right && spare(index + 1) {
            self.borrow_from_next(index);
            index
        } else if has_left {
            self.merge(index - 1);
            index - 1
        } else {
            self.merge(index);
            index
        }
    }

    fn borrow_from_prev(&mut self, index: usize) {
        let (before, after) = self.children.split_at_mut(index);
        let left = &mut before[index - 1];
        let child = &mut after[0];

        let (Some(key), Some(value)) = (left.keys.pop(), left.values.pop()) else {
            panic!("borrow from an empty left sibling");
        };
        let separator_key = std::mem::replace(&mut self.keys[index - 1], key);
        let separator_value = std::mem::replace(&mut self.values[index - 1], value);
        child.keys.insert(0, separator_key);
        child.values.insert(0, separator_value);

        if let Some(grandchild) = left.children.pop() {
            child.children.insert(0, grandchild);
        }
    }

    fn borrow_from_next(&mut self, index: usize) {
        let (before, after) = self.children.split_at_mut(index + 1);
        let child = &mut before[index];
        let right = &mut after[0];

        assert!(!right.keys.is_empty(), "borrow from an empty right sibling");
        let separator_key = std::mem::replace(&mut self.keys[index], right.keys.remove(0));
        let separator_value = std::mem::replace(&mut self.values[index], right.values.remove(0));
        child.keys.push(separator_key);
        child.values.push(separator_value);

        if !right.is_leaf() {
            child.children.push(right.children.remove(0));
        }
    }

    /// Merge `children[index + 1]` and the separator into `children[index]`.
    pub fn merge(&mut self, index: usize) {
        let right = self.children.remove(index + 1);
        let separator_key = self.keys.remove(index);
        let separator_value = self.values.remove(index);

        let left = &mut self.children[index];
        left.keys.push(separator_key);
        left.values.push(separator_value);
        left.keys.extend(right.keys);
        left.values.extend(right.values);
        left.children.extend(right.children);
        tracing::trace!(index, "merged classic siblings");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_of(keys: &[u32]) -> Node<u32, u32> {
        Node {
            keys: keys.to_vec(),
            values: keys.iter().map(|k| k * 10).collect(),
            children: Vec::new(),
        }
    }

    fn parent_of(keys: &[u32], children: Vec<Node<u32, u32>>) -> Node<u32, u32> {
        Node {
            keys: keys.to_vec(),
            values: keys.iter().map(|k| k * 10).collect(),
            children,
        }
    }

    #[test]
    fn test_split_child_full_leaf() {
        let mut parent = parent_of(&[], vec![leaf_of(&[1, 2, 3, 4, 5])]);
        parent.split_child(0, 3);

        assert_eq!(parent.keys(), &[3]);
        assert_eq!(parent.values(), &[30]);
        assert_eq!(parent.children()[0].keys(), &[1, 2]);
        assert_eq!(parent.children()[1].keys(), &[4, 5]);
        assert_eq!(parent.children()[1].values(), &[40, 50]);
    }

    #[test]
    fn test_split_child_partitions_grandchildren() {
        let grandchildren: Vec<Node<u32, u32>> =
            (0..6).map(|i| leaf_of(&[i * 100 + 1, i * 100 + 2])).collect();
        let child = parent_of(&[50, 150, 250, 350, 450], grandchildren);
        let mut parent = parent_of(&[], vec![child]);
        parent.split_child(0, 3);

        assert_eq!(parent.keys(), &[250]);
        let left = &parent.children()[0];
        let right = &parent.children()[1];
        assert_eq!(left.keys(), &[50, 150]);
        assert_eq!(left.children().len(), 3);
        assert_eq!(right.keys(), &[350, 450]);
        assert_eq!(right.children().len(), 3);
        assert_eq!(right.children()[0].keys(), &[301, 302]);
    }

    #[test]
    fn test_fill_prefers_left_borrow() {
        let mut node = parent_of(
            &[10, 20],
            vec![leaf_of(&[1, 2, 3]), leaf_of(&[11]), leaf_of(&[21, 22, 23])],
        );
        let index = node.fill(1, 2);

        assert_eq!(index, 1);
        assert_eq!(node.keys(), &[3, 20]);
        assert_eq!(node.children()[0].keys(), &[1, 2]);
        assert_eq!(node.children()[1].keys(), &[10, 11]);
        assert_eq!(node.children()[1].values(), &[100, 110]);
    }

    #[test]
    fn test_fill_borrows_right_then_merges_left() {
        let mut node = parent_of(&[10], vec![leaf_of(&[1]), leaf_of(&[11, 12])]);
        assert_eq!(node.fill(0, 2), 0);
        assert_eq!(node.keys(), &[11]);
        assert_eq!(node.children()[0].keys(), &[1, 10]);
        assert_eq!(node.children()[1].keys(), &[12]);

        let mut node = parent_of(&[10], vec![leaf_of(&[1]), leaf_of(&[11])]);
        assert_eq!(node.fill(1, 2), 0);
        assert!(node.keys().is_empty());
        assert_eq!(node.children().len(), 1);
        assert_eq!(node.children()[0].keys(), &[1, 10, 11]);
    }

    #[test]
    fn test_pop_last_and_first() {
        let mut node = parent_of(&[10], vec![leaf_of(&[1, 2]), leaf_of(&[11, 12])]);
        assert_eq!(node.pop_last(2), (12, 120));
        assert_eq!(node.pop_first(2), (1, 10));
        assert_eq!(node.keys(), &[10]);
    }

    #[test]
    fn test_remove_internal_key_uses_predecessor() {
        let mut node = parent_of(&[10], vec![leaf_of(&[1, 2, 3]), leaf_of(&[11])]);
        assert_eq!(node.remove(&10, 2), Some(100));
        assert_eq!(node.keys(), &[3]);
        assert_eq!(node.values(), &[30]);
        assert_eq!(node.children()[0].keys(), &[1, 2]);
    }

    #[test]
    fn test_remove_internal_key_merges_when_both_minimal() {
        let mut node = parent_of(&[10, 20], vec![leaf_of(&[1]), leaf_of(&[11]), leaf_of(&[21])]);
        assert_eq!(node.remove(&10, 2), Some(100));
        assert_eq!(node.keys(), &[20]);
        assert_eq!(node.children()[0].keys(), &[1, 11]);
    }
}
