//! B+-tree with buffered leaves.
//!
//! # Structure
//!
//! - Internal nodes: separator keys and child ids, at most `2d - 1` keys
//! - Leaf nodes: a sorted main page of at most `2d - 1` entries, an unsorted
//!   overflow buffer of at most `d / 2` pending inserts, and prev/next links
//!   forming a chain over all leaves in key order
//!
//! Nodes live in a [`NodeArena`] and refer to each other by [`NodeId`].
//!
//! # Usage
//!
//! ```
//! use engine::bplus::BPlusTree;
//!
//! let mut tree = BPlusTree::new(3).expect("order 3 is valid");
//! for key in [10, 20, 5, 6, 12, 30, 7, 17] {
//!     tree.insert(key, key * 100);
//! }
//!
//! assert_eq!(tree.search(&12), Some(&1200));
//! assert!(tree.remove(&12));
//! assert!(!tree.contains(&12));
//!
//! let keys: Vec<i32> = tree.iter().map(|(k, _)| *k).collect();
//! assert_eq!(keys, vec![5, 6, 7, 10, 17, 20, 30]);
//! ```

mod arena;
mod node;
mod tree;

pub use arena::{NodeArena, NodeId};
pub use node::{
    InternalNode, LeafNode, Node, NodeRole, buffer_capacity, max_keys, min_keys,
};
pub use tree::{BPlusTree, Iter};
