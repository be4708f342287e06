//! Record storage abstraction.
//!
//! The disk tree talks to its backing store only through [`RecordStore`], so
//! the same tree code runs against a real file ([`NodeFile`]) and against the
//! fault-injecting in-memory store used by the simulator.
//!
//! [`NodeFile`]: crate::disk::NodeFile

use std::path::PathBuf;

use crate::disk::record::{Position, Record};
use crate::disk::superblock::{Superblock, SuperblockError};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// The file ended before a full record could be read.
    ShortRead { offset: u64 },
    /// The device stopped accepting bytes mid-record.
    ShortWrite { offset: u64 },
    /// Position was never allocated.
    PositionOutOfBounds {
        position: Position,
        allocated: Position,
    },
    /// Superblock error.
    Superblock(SuperblockError),
    /// Injected fault for simulation.
    InjectedFault(String),
    /// A record buffer does not match the file's record size.
    RecordSizeMismatch { expected: usize, actual: usize },
    /// File already exists.
    AlreadyExists(PathBuf),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ShortRead { offset } => write!(f, "short read at offset {offset}"),
            Self::ShortWrite { offset } => write!(f, "short write at offset {offset}"),
            Self::PositionOutOfBounds {
                position,
                allocated,
            } => write!(
                f,
                "position {position} out of bounds (allocated: {allocated})"
            ),
            Self::Superblock(e) => write!(f, "superblock error: {e}"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
            Self::RecordSizeMismatch { expected, actual } => {
                write!(f, "record is {actual} bytes, expected {expected}")
            }
            Self::AlreadyExists(p) => write!(f, "file already exists: {}", p.display()),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Superblock(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<SuperblockError> for StorageError {
    fn from(e: SuperblockError) -> Self {
        Self::Superblock(e)
    }
}

/// Abstraction over fixed-size record storage.
///
/// Implementations must ensure:
/// - `read_record` returns the last written content for a position
/// - positions below `superblock().next_position` are readable and writable
/// - superblock changes are persisted on `write_superblock` + `sync`
pub trait RecordStore {
    /// Read the record at `position`.
    fn read_record(&mut self, position: Position) -> Result<Record, StorageError>;

    /// Write the record at `position`.
    ///
    /// The write may be buffered until `sync` is called.
    fn write_record(&mut self, position: Position, record: &Record) -> Result<(), StorageError>;

    /// Get a reference to the in-memory superblock.
    fn superblock(&self) -> &Superblock;

    /// Get a mutable reference to the in-memory superblock.
    fn superblock_mut(&mut self) -> &mut Superblock;

    /// Persist the in-memory superblock.
    fn write_superblock(&mut self) -> Result<(), StorageError>;

    /// Sync all pending writes to durable storage.
    fn sync(&mut self) -> Result<(), StorageError>;
}

/// Reject positions at or past the allocation frontier.
pub(crate) const fn check_position(
    superblock: &Superblock,
    position: Position,
) -> Result<(), StorageError> {
    if position >= superblock.next_position {
        return Err(StorageError::PositionOutOfBounds {
            position,
            allocated: superblock.next_position,
        });
    }
    Ok(())
}

/// Reject record buffers that do not match the layout.
pub(crate) fn check_record_size(
    superblock: &Superblock,
    record: &Record,
) -> Result<(), StorageError> {
    let expected = superblock.layout.record_size();
    let actual = record.len();
    if expected != actual {
        return Err(StorageError::RecordSizeMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::superblock::RecordLayout;

    #[test]
    fn test_storage_error_display() {
        let e = StorageError::PositionOutOfBounds {
            position: 10,
            allocated: 5,
        };
        assert!(e.to_string().contains("position 10"));
        assert!(e.to_string().contains("allocated: 5"));

        let e = StorageError::InjectedFault("test fault".to_string());
        assert!(e.to_string().contains("test fault"));
    }

    #[test]
    fn test_bounds_checks() {
        let layout = RecordLayout::for_codecs::<u64, u64>(2).expect("valid layout");
        let mut superblock = Superblock::new(layout);
        assert!(check_position(&superblock, 0).is_err());
        superblock.next_position = 1;
        assert!(check_position(&superblock, 0).is_ok());

        let record = Record::new(layout.record_size());
        assert!(check_record_size(&superblock, &record).is_ok());
        assert!(matches!(
            check_record_size(&superblock, &Record::new(8)),
            Err(StorageError::RecordSizeMismatch { actual: 8, .. })
        ));
    }
}
