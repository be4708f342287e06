//! Disk-resident classic B-tree.
//!
//! # File layout
//!
//! ```text
//! +--------------------+  offset 0
//! | superblock (64 B)  |  magic, version, layout, root, allocation state
//! +--------------------+  offset 64
//! | record 0           |  tag | key count | crc32 | position
//! | record 1           |  keys[2t-1] | values[2t-1] | children[2t]
//! | ...                |
//! +--------------------+
//! ```
//!
//! Every record has the same size, so position `p` lives at
//! `64 + p * record_size`. Records freed by merges are chained into a free
//! list and handed out again before the file grows.
//!
//! # Example
//!
//! ```
//! use engine::disk::{DiskBTree, NodeFile};
//!
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("ids.idx");
//!
//! let mut tree: DiskBTree<NodeFile, u64, [u8; 8]> = DiskBTree::create_file(&path, 4)?;
//! tree.insert(7, *b"seven___")?;
//! tree.sync()?;
//! drop(tree);
//!
//! let mut tree: DiskBTree<NodeFile, u64, [u8; 8]> = DiskBTree::open_file(&path)?;
//! assert_eq!(tree.search(&7)?, Some(*b"seven___"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod codec;
mod file;
mod io;
mod node;
mod record;
mod superblock;
mod tree;

pub use codec::FixedCodec;
pub use file::NodeFile;
pub use io::{RecordStore, StorageError};
pub(crate) use io::{check_position, check_record_size};
pub use node::{DiskNode, NodeError, free_record, read_free_link};
pub use record::{NO_POSITION, Position, Record, RecordTag, header};
pub use superblock::{
    FORMAT_VERSION, LayoutError, MAGIC, MAX_MIN_DEGREE, RecordLayout, SUPERBLOCK_SIZE, Superblock,
    SuperblockError,
};
pub use tree::{DiskBTree, DiskTreeError};
