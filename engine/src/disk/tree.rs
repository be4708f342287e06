//! Disk-resident classic B-tree.
//!
//! Same balancing as [`crate::classic::BTree`], but every node lives in a
//! fixed-size record of a [`RecordStore`]. Nodes are read into transient
//! [`DiskNode`] copies, changed, and written back before the operation
//! returns. The superblock is rewritten after every mutating operation.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::Path;

use crate::disk::codec::FixedCodec;
use crate::disk::file::NodeFile;
use crate::disk::io::{RecordStore, StorageError};
use crate::disk::node::{DiskNode, NodeError, free_record, read_free_link};
use crate::disk::record::{NO_POSITION, Position};
use crate::disk::superblock::{LayoutError, RecordLayout};
use crate::index::{KeyValueIndex, OrderError};
use crate::invariants::{
    InvariantViolation, ensure, ensure_strictly_ascending, ensure_within_bounds,
};

/// A classic B-tree whose nodes live in a [`RecordStore`].
pub struct DiskBTree<S, K, V> {
    store: S,
    layout: RecordLayout,
    _entries: PhantomData<fn() -> (K, V)>,
}

impl<K: FixedCodec + Ord, V: FixedCodec> DiskBTree<NodeFile, K, V> {
    /// Create a new index file with minimum degree `min_degree`.
    pub fn create_file(path: &Path, min_degree: usize) -> Result<Self, DiskTreeError> {
        let layout = RecordLayout::for_codecs::<K, V>(min_degree)?;
        Self::new(NodeFile::create(path, layout)?)
    }

    /// Open an existing index file.
    pub fn open_file(path: &Path) -> Result<Self, DiskTreeError> {
        Self::new(NodeFile::open(path)?)
    }
}

impl<S: RecordStore, K: FixedCodec + Ord, V: FixedCodec> DiskBTree<S, K, V> {
    /// Attach to a store, creating an empty root leaf if it has none.
    pub fn new(store: S) -> Result<Self, DiskTreeError> {
        let stored = store.superblock().layout;
        let expected = RecordLayout::for_codecs::<K, V>(stored.degree())?;
        if stored != expected {
            return Err(DiskTreeError::LayoutMismatch { stored, expected });
        }

        let needs_root = store.superblock().root_position == NO_POSITION;
        let mut tree = Self {
            store,
            layout: stored,
            _entries: PhantomData,
        };
        if needs_root {
            let root = tree.allocate(true)?;
            tree.write_node(&root)?;
            tree.store.superblock_mut().root_position = root.position;
            tree.store.write_superblock()?;
            tracing::debug!(position = root.position, "initialized empty disk root");
        }
        Ok(tree)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(self.store.superblock().entry_count).unwrap_or(usize::MAX)
    }

    /// Whether the tree is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.superblock().entry_count == 0
    }

    /// Minimum degree `t` of the tree.
    #[must_use]
    pub const fn min_degree(&self) -> usize {
        self.layout.degree()
    }

    /// Position of the root record.
    #[must_use]
    pub fn root_position(&self) -> Position {
        self.store.superblock().root_position
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the backing store.
    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Release the tree and return its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Persist the superblock and sync the store.
    pub fn sync(&mut self) -> Result<(), DiskTreeError> {
        self.store.write_superblock()?;
        self.store.sync()?;
        Ok(())
    }

    /// Number of levels, counting the leaves.
    pub fn height(&mut self) -> Result<usize, DiskTreeError> {
        let mut height = 1;
        let mut node = self.read_node(self.root_position())?;
        while let Some(&child) = node.children.first() {
            node = self.read_node(child)?;
            height += 1;
        }
        Ok(height)
    }

    /// Look up a value by key.
    pub fn search(&mut self, key: &K) -> Result<Option<V>, DiskTreeError> {
        let mut node = self.read_node(self.root_position())?;
        loop {
            match node.keys.binary_search(key) {
                Ok(i) => return Ok(Some(node.values.swap_remove(i))),
                Err(_) if node.leaf => return Ok(None),
                Err(i) => node = self.read_node(node.children[i])?,
            }
        }
    }

    /// Check whether a key is present.
    pub fn contains(&mut self, key: &K) -> Result<bool, DiskTreeError> {
        Ok(self.search(key)?.is_some())
    }

    /// Insert or update a key-value pair.
    ///
    /// Returns the old value if updating, None if inserting.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, DiskTreeError> {
        let mut root = self.read_node(self.root_position())?;
        if root.is_full(&self.layout) {
            let mut new_root = self.allocate(false)?;
            new_root.children.push(root.position);
            self.split_child(&mut new_root, 0, &mut root)?;
            self.store.superblock_mut().root_position = new_root.position;
            tracing::debug!(position = new_root.position, "promoted new disk root");
            root = new_root;
        }

        let old = self.insert_non_full(root, key, value)?;
        if old.is_none() {
            self.store.superblock_mut().entry_count += 1;
        }
        self.store.write_superblock()?;
        Ok(old)
    }

    /// Remove a key. Returns `false` if it was absent.
    pub fn remove(&mut self, key: &K) -> Result<bool, DiskTreeError> {
        Ok(self.take(key)?.is_some())
    }

    /// Remove a key and return its value.
    pub fn take(&mut self, key: &K) -> Result<Option<V>, DiskTreeError> {
        if !self.contains(key)? {
            return Ok(None);
        }

        let t = self.layout.degree();
        let mut root = self.read_node(self.root_position())?;
        if !root.leaf && root.keys.len() == 1 {
            let left = self.read_node(root.children[0])?;
            let right = self.read_node(root.children[1])?;
            if left.keys.len() == t - 1 && right.keys.len() == t - 1 {
                self.merge_children(&mut root, 0, left, right)?;
                self.collapse_root()?;
            }
        }

        let root = self.read_node(self.root_position())?;
        let value = self.remove_from(root, key)?;
        if value.is_some() {
            self.store.superblock_mut().entry_count -= 1;
        }
        self.collapse_root()?;
        self.store.write_superblock()?;
        Ok(value)
    }

    fn read_node(&mut self, position: Position) -> Result<DiskNode<K, V>, DiskTreeError> {
        let record = self.store.read_record(position)?;
        Ok(DiskNode::from_record(&record, &self.layout, position)?)
    }

    fn write_node(&mut self, node: &DiskNode<K, V>) -> Result<(), DiskTreeError> {
        let record = node.to_record(&self.layout)?;
        self.store.write_record(node.position, &record)?;
        Ok(())
    }

    /// Hand out a position, reusing the free list before growing the file.
    fn allocate(&mut self, leaf: bool) -> Result<DiskNode<K, V>, DiskTreeError> {
        let head = self.store.superblock().free_list_head;
        let position = if head == NO_POSITION {
            let superblock = self.store.superblock_mut();
            let position = superblock.next_position;
            superblock.next_position += 1;
            position
        } else {
            let record = self.store.read_record(head)?;
            let next = read_free_link(&record, &self.layout, head)?;
            self.store.superblock_mut().free_list_head = next;
            tracing::trace!(position = head, "reused free record");
            head
        };
        Ok(DiskNode::empty(position, leaf, &self.layout))
    }

    /// Push a position onto the free list.
    fn release(&mut self, position: Position) -> Result<(), DiskTreeError> {
        let head = self.store.superblock().free_list_head;
        let record = free_record(position, head, &self.layout);
        self.store.write_record(position, &record)?;
        self.store.superblock_mut().free_list_head = position;
        Ok(())
    }

    /// Split the full `child` at `parent.children[index]`.
    ///
    /// Writes all three nodes and returns the new right sibling.
    fn split_child(
        &mut self,
        parent: &mut DiskNode<K, V>,
        index: usize,
        child: &mut DiskNode<K, V>,
    ) -> Result<DiskNode<K, V>, DiskTreeError> {
        let t = self.layout.degree();
        assert!(child.is_full(&self.layout), "split of a non-full child");

        let mut right = self.allocate(child.leaf)?;
        right.keys.extend(child.keys.split_off(t));
        right.values.extend(child.values.split_off(t));
        if !child.leaf {
            right.children.extend(child.children.split_off(t));
        }
        let (Some(median_key), Some(median_value)) = (child.keys.pop(), child.values.pop()) else {
            unreachable!("full child has a median entry");
        };

        parent.keys.insert(index, median_key);
        parent.values.insert(index, median_value);
        parent.children.insert(index + 1, right.position);

        self.write_node(child)?;
        self.write_node(&right)?;
        self.write_node(parent)?;
        tracing::trace!(
            left = child.position,
            right = right.position,
            parent = parent.position,
            "split disk node"
        );
        Ok(right)
    }

    fn insert_non_full(
        &mut self,
        mut node: DiskNode<K, V>,
        key: K,
        value: V,
    ) -> Result<Option<V>, DiskTreeError> {
        loop {
            let index = match node.keys.binary_search(&key) {
                Ok(i) => {
                    let old = std::mem::replace(&mut node.values[i], value);
                    self.write_node(&node)?;
                    return Ok(Some(old));
                }
                Err(i) => i,
            };

            if node.leaf {
                node.keys.insert(index, key);
                node.values.insert(index, value);
                self.write_node(&node)?;
                return Ok(None);
            }

            let mut child = self.read_node(node.children[index])?;
            if child.is_full(&self.layout) {
                let right = self.split_child(&mut node, index, &mut child)?;
                match key.cmp(&node.keys[index]) {
                    std::cmp::Ordering::Equal => {
                        let old = std::mem::replace(&mut node.values[index], value);
                        self.write_node(&node)?;
                        return Ok(Some(old));
                    }
                    std::cmp::Ordering::Greater => child = right,
                    std::cmp::Ordering::Less => {}
                }
            }
            node = child;
        }
    }

    fn remove_from(
        &mut self,
        mut node: DiskNode<K, V>,
        key: &K,
    ) -> Result<Option<V>, DiskTreeError> {
        loop {
            match node.keys.binary_search(key) {
                Ok(i) if node.leaf => {
                    node.keys.remove(i);
                    let value = node.values.remove(i);
                    self.write_node(&node)?;
                    return Ok(Some(value));
                }
                Ok(i) => match self.remove_from_internal(&mut node, i)? {
                    Some(value) => return Ok(Some(value)),
                    None => node = self.read_node(node.children[i])?,
                },
                Err(_) if node.leaf => return Ok(None),
                Err(i) => node = self.descend_with_spare(&mut node, i)?,
            }
        }
    }

    /// Remove `node.keys[index]` of an internal node.
    ///
    /// Returns the removed value when a predecessor or successor took its
    /// place. Returns `None` after merging both children around the key, in
    /// which case the key now lives in `node.children[index]`.
    fn remove_from_internal(
        &mut self,
        node: &mut DiskNode<K, V>,
        index: usize,
    ) -> Result<Option<V>, DiskTreeError> {
        let t = self.layout.degree();

        let left = self.read_node(node.children[index])?;
        if left.keys.len() >= t {
            let (key, value) = self.pop_last(left)?;
            node.keys[index] = key;
            let old = std::mem::replace(&mut node.values[index], value);
            self.write_node(node)?;
            return Ok(Some(old));
        }

        let right = self.read_node(node.children[index + 1])?;
        if right.keys.len() >= t {
            let (key, value) = self.pop_first(right)?;
            node.keys[index] = key;
            let old = std::mem::replace(&mut node.values[index], value);
            self.write_node(node)?;
            return Ok(Some(old));
        }

        self.merge_children(node, index, left, right)?;
        Ok(None)
    }

    /// Remove and return the largest entry of the subtree rooted at `node`.
    fn pop_last(&mut self, mut node: DiskNode<K, V>) -> Result<(K, V), DiskTreeError> {
        while !node.leaf {
            let last = node.children.len() - 1;
            node = self.descend_with_spare(&mut node, last)?;
        }
        let (Some(key), Some(value)) = (node.keys.pop(), node.values.pop()) else {
            return Err(DiskTreeError::Corrupted {
                position: node.position,
                reason: "leaf on a removal path holds no keys",
            });
        };
        self.write_node(&node)?;
        Ok((key, value))
    }

    /// Remove and return the smallest entry of the subtree rooted at `node`.
    fn pop_first(&mut self, mut node: DiskNode<K, V>) -> Result<(K, V), DiskTreeError> {
        while !node.leaf {
            node = self.descend_with_spare(&mut node, 0)?;
        }
        if node.keys.is_empty() {
            return Err(DiskTreeError::Corrupted {
                position: node.position,
                reason: "leaf on a removal path holds no keys",
            });
        }
        let entry = (node.keys.remove(0), node.values.remove(0));
        self.write_node(&node)?;
        Ok(entry)
    }

    /// Read `parent.children[index]`, filling it first if it holds only
    /// `t - 1` keys.
    ///
    /// Returns the node that now covers the original child's key range.
    fn descend_with_spare(
        &mut self,
        parent: &mut DiskNode<K, V>,
        index: usize,
    ) -> Result<DiskNode<K, V>, DiskTreeError> {
        let t = self.layout.degree();
        let mut child = self.read_node(parent.children[index])?;
        if child.keys.len() >= t {
            return Ok(child);
        }

        let mut left = match index.checked_sub(1) {
            Some(i) => Some(self.read_node(parent.children[i])?),
            None => None,
        };
        if let Some(left) = left.as_mut().filter(|left| left.keys.len() >= t) {
            self.rotate_from_left(parent, index, left, &mut child)?;
            return Ok(child);
        }

        let mut right = match parent.children.get(index + 1) {
            Some(&position) => Some(self.read_node(position)?),
            None => None,
        };
        if let Some(right) = right.as_mut().filter(|right| right.keys.len() >= t) {
            self.rotate_from_right(parent, index, &mut child, right)?;
            return Ok(child);
        }

        match (left, right) {
            (Some(left), _) => self.merge_children(parent, index - 1, left, child),
            (None, Some(right)) => self.merge_children(parent, index, child, right),
            (None, None) => Err(DiskTreeError::Corrupted {
                position: parent.position,
                reason: "internal node has a single child",
            }),
        }
    }

    fn rotate_from_left(
        &mut self,
        parent: &mut DiskNode<K, V>,
        index: usize,
        left: &mut DiskNode<K, V>,
        child: &mut DiskNode<K, V>,
    ) -> Result<(), DiskTreeError> {
        let (Some(key), Some(value)) = (left.keys.pop(), left.values.pop()) else {
            return Err(DiskTreeError::Corrupted {
                position: left.position,
                reason: "left sibling holds no keys",
            });
        };
        let separator_key = std::mem::replace(&mut parent.keys[index - 1], key);
        let separator_value = std::mem::replace(&mut parent.values[index - 1], value);
        child.keys.insert(0, separator_key);
        child.values.insert(0, separator_value);
        if let Some(grandchild) = left.children.pop() {
            child.children.insert(0, grandchild);
        }

        self.write_node(left)?;
        self.write_node(child)?;
        self.write_node(parent)?;
        tracing::trace!(from = left.position, to = child.position, "borrowed from left");
        Ok(())
    }

    fn rotate_from_right(
        &mut self,
        parent: &mut DiskNode<K, V>,
        index: usize,
        child: &mut DiskNode<K, V>,
        right: &mut DiskNode<K, V>,
    ) -> Result<(), DiskTreeError> {
        if right.keys.is_empty() {
            return Err(DiskTreeError::Corrupted {
                position: right.position,
                reason: "right sibling holds no keys",
            });
        }
        let separator_key = std::mem::replace(&mut parent.keys[index], right.keys.remove(0));
        let separator_value = std::mem::replace(&mut parent.values[index], right.values.remove(0));
        child.keys.push(separator_key);
        child.values.push(separator_value);
        if !right.leaf {
            child.children.push(right.children.remove(0));
        }

        self.write_node(right)?;
        self.write_node(child)?;
        self.write_node(parent)?;
        tracing::trace!(from = right.position, to = child.position, "borrowed from right");
        Ok(())
    }

    /// Merge `right` and the separator at `index` into `left`, freeing
    /// `right`'s position.
    fn merge_children(
        &mut self,
        parent: &mut DiskNode<K, V>,
        index: usize,
        mut left: DiskNode<K, V>,
        right: DiskNode<K, V>,
    ) -> Result<DiskNode<K, V>, DiskTreeError> {
        parent.children.remove(index + 1);
        left.keys.push(parent.keys.remove(index));
        left.values.push(parent.values.remove(index));
        left.keys.extend(right.keys);
        left.values.extend(right.values);
        left.children.extend(right.children);

        self.write_node(&left)?;
        self.write_node(parent)?;
        self.release(right.position)?;
        tracing::trace!(
            left = left.position,
            freed = right.position,
            "merged disk siblings"
        );
        Ok(left)
    }

    /// Replace an empty internal root by its only child.
    fn collapse_root(&mut self) -> Result<(), DiskTreeError> {
        loop {
            let root = self.read_node(self.root_position())?;
            if root.leaf || !root.keys.is_empty() {
                return Ok(());
            }
            self.store.superblock_mut().root_position = root.children[0];
            self.release(root.position)?;
            tracing::debug!(position = root.children[0], "demoted disk root");
        }
    }

    /// Verify ordering, occupancy, depth and position invariants.
    ///
    /// Every allocated position must be either reachable from the root
    /// exactly once or on the free list exactly once.
    pub fn check_invariants(&mut self) -> Result<(), InvariantViolation> {
        let mut walk = Walk {
            leaf_depth: None,
            seen: HashSet::new(),
        };
        let root = self.root_position();
        let counted = self.check_node(root, None, None, 0, &mut walk)?;
        let recorded = self.store.superblock().entry_count;
        ensure(counted as u64 == recorded, "entry count mismatch", || {
            format!("counted {counted}, recorded {recorded}")
        })?;

        let next_position = self.store.superblock().next_position;
        let mut free = 0u64;
        let mut position = self.store.superblock().free_list_head;
        while position != NO_POSITION {
            let context = || format!("free record {position}");
            ensure(position < next_position, "free position was never allocated", context)?;
            ensure(
                walk.seen.insert(position),
                "free position is reachable or listed twice",
                context,
            )?;
            let record = self
                .store
                .read_record(position)
                .map_err(|e| InvariantViolation::new("unreadable free record", e.to_string()))?;
            position = read_free_link(&record, &self.layout, position)
                .map_err(|e| InvariantViolation::new("malformed free record", e.to_string()))?;
            free += 1;
        }

        let reachable = walk.seen.len() as u64 - free;
        ensure(
            reachable + free == next_position,
            "allocated positions leaked",
            || format!("{reachable} reachable, {free} free, {next_position} allocated"),
        )
    }

    fn check_node(
        &mut self,
        position: Position,
        lower: Option<&K>,
        upper: Option<&K>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<usize, InvariantViolation> {
        let t = self.layout.degree();
        let next_position = self.store.superblock().next_position;
        let context = || format!("record {position} at depth {depth}");

        ensure(position < next_position, "node position was never allocated", context)?;
        ensure(walk.seen.insert(position), "node position is shared", context)?;
        let node = self
            .read_node(position)
            .map_err(|e| InvariantViolation::new("unreadable node", e.to_string()))?;

        let is_root = depth == 0;
        ensure(
            is_root || node.keys.len() >= t - 1,
            "non-root node holds too few keys",
            context,
        )?;
        ensure_strictly_ascending(&node.keys, context)?;
        ensure_within_bounds(&node.keys, lower, upper, context)?;
        ensure(
            lower.is_none_or(|lower| node.keys.first().is_none_or(|first| first > lower)),
            "key equals an ancestor separator",
            context,
        )?;

        if node.leaf {
            match walk.leaf_depth {
                None => walk.leaf_depth = Some(depth),
                Some(expected) => ensure(expected == depth, "leaves at different depths", context)?,
            }
            return Ok(node.keys.len());
        }

        let mut count = node.keys.len();
        for (i, &child) in node.children.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
            let child_upper = node.keys.get(i).or(upper);
            count += self.check_node(child, child_lower, child_upper, depth + 1, walk)?;
        }
        Ok(count)
    }
}

/// State carried through an invariant walk.
struct Walk {
    leaf_depth: Option<usize>,
    seen: HashSet<Position>,
}

impl<S: RecordStore, K: FixedCodec + Ord, V: FixedCodec> KeyValueIndex<K, V>
    for DiskBTree<S, K, V>
{
    type Error = DiskTreeError;

    fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Self::Error> {
        Self::insert(self, key, value)
    }

    fn remove(&mut self, key: &K) -> Result<bool, Self::Error> {
        Self::remove(self, key)
    }

    fn search(&mut self, key: &K) -> Result<Option<V>, Self::Error> {
        Self::search(self, key)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn check_invariants(&mut self) -> Result<(), InvariantViolation> {
        Self::check_invariants(self)
    }
}

/// Errors raised by the disk tree.
#[derive(Debug)]
pub enum DiskTreeError {
    /// The backing store failed.
    Storage(StorageError),
    /// A record could not be decoded.
    Node(NodeError),
    /// The store was written for other key/value widths.
    LayoutMismatch {
        stored: RecordLayout,
        expected: RecordLayout,
    },
    /// Minimum degree outside the supported range.
    Layout(LayoutError),
    /// A record decoded cleanly but breaks the tree's shape.
    Corrupted {
        position: Position,
        reason: &'static str,
    },
}

impl std::fmt::Display for DiskTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::LayoutMismatch { stored, expected } => write!(
                f,
                "layout mismatch: file has {}-byte keys and {}-byte values, tree expects {} and {}",
                stored.key_width, stored.value_width, expected.key_width, expected.value_width
            ),
            Self::Layout(e) => write!(f, "{e}"),
            Self::Corrupted { position, reason } => {
                write!(f, "corrupted tree at position {position}: {reason}")
            }
        }
    }
}

impl std::error::Error for DiskTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Layout(e) => Some(e),
            Self::LayoutMismatch { .. } | Self::Corrupted { .. } => None,
        }
    }
}

impl From<StorageError> for DiskTreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for DiskTreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<LayoutError> for DiskTreeError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

impl From<OrderError> for DiskTreeError {
    fn from(e: OrderError) -> Self {
        Self::Layout(LayoutError::Order(e))
    }
}
