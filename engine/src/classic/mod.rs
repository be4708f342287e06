//! In-memory classic B-tree.
//!
//! Unlike the B+-tree, every node stores entries, there is no leaf chain and
//! no overflow buffer. Deletion replaces an internal entry with its
//! predecessor or successor.
//!
//! # Usage
//!
//! ```
//! use engine::classic::BTree;
//!
//! let mut by_name = BTree::new(2).expect("minimum degree 2 is valid");
//! by_name.insert("ward-b".to_string(), 7_u32);
//! by_name.insert("ward-a".to_string(), 3);
//!
//! assert_eq!(by_name.search(&"ward-a".to_string()), Some(&3));
//! assert!(by_name.remove(&"ward-b".to_string()));
//! assert_eq!(by_name.len(), 1);
//! ```

mod node;
mod tree;

pub use node::Node;
pub use tree::{BTree, Iter};
