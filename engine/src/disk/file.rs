//! Index file I/O operations.
//!
//! This module handles reading and writing node records to the index file.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::disk::io::{RecordStore, StorageError, check_position, check_record_size};
use crate::disk::record::{Position, Record};
use crate::disk::superblock::{RecordLayout, SUPERBLOCK_SIZE, Superblock};

/// An index file handle with low-level record I/O operations.
pub struct NodeFile {
    file: File,
    path: PathBuf,
    superblock: Superblock,
}

impl NodeFile {
    /// Create a new index file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path, layout: RecordLayout) -> Result<Self, StorageError> {
        if path.exists() {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let superblock = Superblock::new(layout);
        file.write_all(superblock.to_record().as_bytes())?;
        file.sync_all()?;

        tracing::info!(
            path = %path.display(),
            min_degree = layout.min_degree,
            record_size = layout.record_size(),
            "created index file"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            superblock,
        })
    }

    /// Open an existing index file.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut buf = vec![0u8; SUPERBLOCK_SIZE];
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => StorageError::ShortRead { offset: 0 },
            _ => StorageError::Io(e),
        })?;
        let superblock = Superblock::from_record(&Record::from_bytes(buf))?;

        tracing::info!(
            path = %path.display(),
            entries = superblock.entry_count,
            records = superblock.next_position,
            "opened index file"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            superblock,
        })
    }

    /// Path the file was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for NodeFile {
    fn read_record(&mut self, position: Position) -> Result<Record, StorageError> {
        check_position(&self.superblock, position)?;

        let offset = self.superblock.record_offset(position);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut record = Record::new(self.superblock.layout.record_size());
        self.file
            .read_exact(record.as_bytes_mut())
            .map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => StorageError::ShortRead { offset },
                _ => StorageError::Io(e),
            })?;

        Ok(record)
    }

    fn write_record(&mut self, position: Position, record: &Record) -> Result<(), StorageError> {
        check_position(&self.superblock, position)?;
        check_record_size(&self.superblock, record)?;

        let offset = self.superblock.record_offset(position);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file
            .write_all(record.as_bytes())
            .map_err(|e| match e.kind() {
                ErrorKind::WriteZero => StorageError::ShortWrite { offset },
                _ => StorageError::Io(e),
            })?;

        Ok(())
    }

    fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    fn superblock_mut(&mut self) -> &mut Superblock {
        &mut self.superblock
    }

    fn write_superblock(&mut self) -> Result<(), StorageError> {
        let record = self.superblock.to_record();
        self.file.seek(SeekFrom::Start(0))?;
        self.file
            .write_all(record.as_bytes())
            .map_err(|e| match e.kind() {
                ErrorKind::WriteZero => StorageError::ShortWrite { offset: 0 },
                _ => StorageError::Io(e),
            })?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::superblock::SuperblockError;

    fn layout() -> RecordLayout {
        RecordLayout::for_codecs::<u64, u64>(2).expect("valid layout")
    }

    #[test]
    fn test_create_and_open() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("index.db");

        {
            let file = NodeFile::create(&path, layout()).expect("create file");
            assert_eq!(file.superblock().layout, layout());
            assert_eq!(file.path(), path.as_path());
        }

        let file = NodeFile::open(&path).expect("open file");
        assert_eq!(file.superblock().layout, layout());
        assert_eq!(file.superblock().next_position, 0);
    }

    #[test]
    fn test_create_fails_if_exists() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("index.db");

        NodeFile::create(&path, layout()).expect("create file");
        assert!(matches!(
            NodeFile::create(&path, layout()),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_record_roundtrip_across_reopen() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("index.db");

        {
            let mut file = NodeFile::create(&path, layout()).expect("create file");
            file.superblock_mut().next_position = 2;
            let mut record = Record::new(layout().record_size());
            record.write_u64(32, 0xDEAD_BEEF);
            file.write_record(1, &record).expect("write record");
            file.write_superblock().expect("write superblock");
            file.sync().expect("sync");
        }

        let mut file = NodeFile::open(&path).expect("open file");
        assert_eq!(file.superblock().next_position, 2);
        let record = file.read_record(1).expect("read record");
        assert_eq!(record.read_u64(32), 0xDEAD_BEEF);
    }

    #[test]
    fn test_out_of_bounds() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("index.db");
        let mut file = NodeFile::create(&path, layout()).expect("create file");

        assert!(matches!(
            file.read_record(0),
            Err(StorageError::PositionOutOfBounds {
                position: 0,
                allocated: 0,
            })
        ));
        let record = Record::new(layout().record_size());
        assert!(file.write_record(3, &record).is_err());
    }

    #[test]
    fn test_short_read_on_truncated_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("index.db");
        let mut file = NodeFile::create(&path, layout()).expect("create file");
        // Allocated but never written.
        file.superblock_mut().next_position = 1;

        assert!(matches!(
            file.read_record(0),
            Err(StorageError::ShortRead { offset: 64 })
        ));
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, [0xAB; SUPERBLOCK_SIZE]).expect("write garbage");

        assert!(matches!(
            NodeFile::open(&path),
            Err(StorageError::Superblock(SuperblockError::InvalidMagic(_)))
        ));

        let short = dir.path().join("short.db");
        std::fs::write(&short, [0u8; 10]).expect("write short file");
        assert!(matches!(
            NodeFile::open(&short),
            Err(StorageError::ShortRead { offset: 0 })
        ));
    }
}
