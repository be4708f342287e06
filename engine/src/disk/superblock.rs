//! Superblock structure and serialization.
//!
//! The superblock occupies the first 64 bytes of an index file and describes
//! the record layout plus the tree's allocation state. Node records follow
//! it: position `p` lives at byte `SUPERBLOCK_SIZE + p * record_size`.

// Codec widths and record sizes are small compile-time quantities.
#![allow(clippy::cast_possible_truncation)]

use crate::disk::codec::FixedCodec;
use crate::disk::record::{NO_POSITION, Position, Record, header};
use crate::index::{OrderError, check_order};

/// Magic number identifying an index file: "BTREEIDX"
pub const MAGIC: [u8; 8] = *b"BTREEIDX";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the superblock in bytes.
pub const SUPERBLOCK_SIZE: usize = 64;

/// Largest minimum degree whose `2t - 1` keys fit the 16-bit key count of a
/// record header.
pub const MAX_MIN_DEGREE: usize = 1 << 15;

/// Superblock field offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const FORMAT_VERSION: usize = 8;
    pub const MIN_DEGREE: usize = 12;
    pub const KEY_WIDTH: usize = 16;
    pub const VALUE_WIDTH: usize = 20;
    pub const RECORD_SIZE: usize = 24;
    pub const CHECKSUM: usize = 28;
    pub const ROOT_POSITION: usize = 32;
    pub const NEXT_POSITION: usize = 40;
    pub const FREE_LIST_HEAD: usize = 48;
    pub const ENTRY_COUNT: usize = 56;
}

/// Shape of every node record in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Minimum degree `t` of the tree.
    pub min_degree: u32,
    /// Encoded key width in bytes.
    pub key_width: u32,
    /// Encoded value width in bytes.
    pub value_width: u32,
}

impl RecordLayout {
    /// Layout for a tree of minimum degree `min_degree` storing `K -> V`.
    pub fn for_codecs<K: FixedCodec, V: FixedCodec>(
        min_degree: usize,
    ) -> Result<Self, LayoutError> {
        let min_degree = check_degree(min_degree)?;
        Ok(Self {
            min_degree,
            key_width: K::WIDTH as u32,
            value_width: V::WIDTH as u32,
        })
    }

    /// Minimum degree as a `usize`.
    #[must_use]
    pub const fn degree(&self) -> usize {
        self.min_degree as usize
    }

    /// Maximum number of keys per node (`2t - 1`).
    #[must_use]
    pub const fn max_keys(&self) -> usize {
        2 * self.degree() - 1
    }

    /// Maximum number of children per node (`2t`).
    #[must_use]
    pub const fn max_children(&self) -> usize {
        2 * self.degree()
    }

    /// Byte offset of the first key slot.
    #[must_use]
    pub const fn keys_offset(&self) -> usize {
        header::SIZE
    }

    /// Byte offset of the first value slot.
    #[must_use]
    pub const fn values_offset(&self) -> usize {
        self.keys_offset() + self.max_keys() * self.key_width as usize
    }

    /// Byte offset of the first child-position slot.
    #[must_use]
    pub const fn children_offset(&self) -> usize {
        self.values_offset() + self.max_keys() * self.value_width as usize
    }

    /// Total size of a node record.
    #[must_use]
    pub const fn record_size(&self) -> usize {
        self.children_offset() + self.max_children() * 8
    }
}

/// The superblock contains all metadata about the index file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Format version number.
    pub format_version: u32,
    /// Record layout.
    pub layout: RecordLayout,
    /// Position of the root node, `NO_POSITION` before the tree is built.
    pub root_position: Position,
    /// Next never-used position.
    pub next_position: Position,
    /// Head of the free record list.
    pub free_list_head: Position,
    /// Number of entries stored in the tree.
    pub entry_count: u64,
}

impl Superblock {
    /// Create a superblock for a fresh, empty file.
    #[must_use]
    pub const fn new(layout: RecordLayout) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            layout,
            root_position: NO_POSITION,
            next_position: 0,
            free_list_head: NO_POSITION,
            entry_count: 0,
        }
    }

    /// Byte offset of a node record in the file.
    #[must_use]
    pub const fn record_offset(&self, position: Position) -> u64 {
        SUPERBLOCK_SIZE as u64 + position * self.layout.record_size() as u64
    }

    /// Serialize the superblock.
    #[must_use]
    pub fn to_record(&self) -> Record {
        let mut record = Record::new(SUPERBLOCK_SIZE);

        record.write_bytes(offsets::MAGIC, &MAGIC);
        record.write_u32(offsets::FORMAT_VERSION, self.format_version);
        record.write_u32(offsets::MIN_DEGREE, self.layout.min_degree);
        record.write_u32(offsets::KEY_WIDTH, self.layout.key_width);
        record.write_u32(offsets::VALUE_WIDTH, self.layout.value_width);
        record.write_u32(offsets::RECORD_SIZE, self.layout.record_size() as u32);
        record.write_u64(offsets::ROOT_POSITION, self.root_position);
        record.write_u64(offsets::NEXT_POSITION, self.next_position);
        record.write_u64(offsets::FREE_LIST_HEAD, self.free_list_head);
        record.write_u64(offsets::ENTRY_COUNT, self.entry_count);
        record.seal(offsets::CHECKSUM);

        record
    }

    /// Deserialize and validate a superblock.
    pub fn from_record(record: &Record) -> Result<Self, SuperblockError> {
        if record.len() != SUPERBLOCK_SIZE {
            return Err(SuperblockError::InvalidSize(record.len()));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(record.read_bytes(offsets::MAGIC, 8));
        if magic != MAGIC {
            return Err(SuperblockError::InvalidMagic(magic));
        }

        let format_version = record.read_u32(offsets::FORMAT_VERSION);
        if format_version != FORMAT_VERSION {
            return Err(SuperblockError::UnsupportedVersion(format_version));
        }

        record
            .verify(offsets::CHECKSUM)
            .map_err(|(stored, computed)| SuperblockError::ChecksumMismatch { stored, computed })?;

        let layout = RecordLayout {
            min_degree: record.read_u32(offsets::MIN_DEGREE),
            key_width: record.read_u32(offsets::KEY_WIDTH),
            value_width: record.read_u32(offsets::VALUE_WIDTH),
        };
        if check_degree(layout.degree()).is_err() {
            return Err(SuperblockError::InvalidMinDegree(layout.min_degree));
        }

        let record_size = record.read_u32(offsets::RECORD_SIZE);
        if record_size as usize != layout.record_size() {
            return Err(SuperblockError::RecordSizeMismatch {
                stored: record_size,
                computed: layout.record_size(),
            });
        }

        Ok(Self {
            format_version,
            layout,
            root_position: record.read_u64(offsets::ROOT_POSITION),
            next_position: record.read_u64(offsets::NEXT_POSITION),
            free_list_head: record.read_u64(offsets::FREE_LIST_HEAD),
            entry_count: record.read_u64(offsets::ENTRY_COUNT),
        })
    }
}

/// Validate a minimum degree for the on-disk format.
fn check_degree(min_degree: usize) -> Result<u32, LayoutError> {
    check_order(min_degree)?;
    if min_degree > MAX_MIN_DEGREE {
        return Err(LayoutError::DegreeTooLarge {
            min_degree,
            max: MAX_MIN_DEGREE,
        });
    }
    Ok(min_degree as u32)
}

/// Error returned when a record layout cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Minimum degree below the supported minimum.
    Order(OrderError),
    /// Minimum degree too large for the record header's key count.
    DegreeTooLarge { min_degree: usize, max: usize },
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order(e) => write!(f, "{e}"),
            Self::DegreeTooLarge { min_degree, max } => {
                write!(f, "minimum degree {min_degree} is too large (maximum is {max})")
            }
        }
    }
}

impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Order(e) => Some(e),
            Self::DegreeTooLarge { .. } => None,
        }
    }
}

impl From<OrderError> for LayoutError {
    fn from(e: OrderError) -> Self {
        Self::Order(e)
    }
}

/// Errors that can occur when parsing the superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuperblockError {
    /// Buffer is not `SUPERBLOCK_SIZE` bytes.
    InvalidSize(usize),
    /// Invalid magic number.
    InvalidMagic([u8; 8]),
    /// Unsupported format version.
    UnsupportedVersion(u32),
    /// Stored checksum does not match the contents.
    ChecksumMismatch { stored: u32, computed: u32 },
    /// Stored minimum degree is outside the supported range.
    InvalidMinDegree(u32),
    /// Stored record size disagrees with the stored layout.
    RecordSizeMismatch { stored: u32, computed: usize },
}

impl std::fmt::Display for SuperblockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSize(size) => write!(f, "invalid superblock size: {size}"),
            Self::InvalidMagic(magic) => write!(f, "invalid magic number: {magic:?}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "superblock checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            ),
            Self::InvalidMinDegree(t) => write!(f, "invalid minimum degree: {t}"),
            Self::RecordSizeMismatch { stored, computed } => write!(
                f,
                "record size mismatch: stored {stored}, layout requires {computed}"
            ),
        }
    }
}

impl std::error::Error for SuperblockError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RecordLayout {
        RecordLayout::for_codecs::<u64, u32>(3).expect("valid layout")
    }

    #[test]
    fn test_layout_sizes() {
        let layout = layout();
        assert_eq!(layout.max_keys(), 5);
        assert_eq!(layout.max_children(), 6);
        assert_eq!(layout.keys_offset(), 16);
        assert_eq!(layout.values_offset(), 16 + 5 * 8);
        assert_eq!(layout.children_offset(), 56 + 5 * 4);
        assert_eq!(layout.record_size(), 76 + 6 * 8);
    }

    #[test]
    fn test_layout_rejects_small_degree() {
        assert_eq!(
            RecordLayout::for_codecs::<u64, u64>(1),
            Err(LayoutError::Order(OrderError { order: 1 }))
        );
    }

    #[test]
    fn test_layout_degree_limit() {
        assert!(RecordLayout::for_codecs::<u32, u8>(MAX_MIN_DEGREE).is_ok());
        assert_eq!(
            RecordLayout::for_codecs::<u32, u8>(MAX_MIN_DEGREE + 1),
            Err(LayoutError::DegreeTooLarge {
                min_degree: 32_769,
                max: 32_768,
            })
        );
    }

    #[test]
    fn test_rejects_stored_degree_over_limit() {
        let mut record = Superblock::new(layout()).to_record();
        record.write_u32(offsets::MIN_DEGREE, 32_769);
        record.seal(offsets::CHECKSUM);
        assert_eq!(
            Superblock::from_record(&record),
            Err(SuperblockError::InvalidMinDegree(32_769))
        );
    }

    #[test]
    fn test_superblock_roundtrip() {
        let mut sb = Superblock::new(layout());
        sb.root_position = 4;
        sb.next_position = 9;
        sb.free_list_head = 2;
        sb.entry_count = 17;

        let record = sb.to_record();
        let sb2 = Superblock::from_record(&record).expect("parse superblock");
        assert_eq!(sb, sb2);
    }

    #[test]
    fn test_fresh_superblock_has_no_root() {
        let sb = Superblock::new(layout());
        assert_eq!(sb.root_position, NO_POSITION);
        assert_eq!(sb.free_list_head, NO_POSITION);
        assert_eq!(sb.next_position, 0);
        assert_eq!(sb.record_offset(0), 64);
        assert_eq!(sb.record_offset(2), 64 + 2 * 124);
    }

    #[test]
    fn test_invalid_magic() {
        let mut record = Superblock::new(layout()).to_record();
        record.write_bytes(0, b"NOTVALID");
        assert!(matches!(
            Superblock::from_record(&record),
            Err(SuperblockError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut record = Superblock::new(layout()).to_record();
        record.write_u32(offsets::FORMAT_VERSION, 99);
        assert_eq!(
            Superblock::from_record(&record),
            Err(SuperblockError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut record = Superblock::new(layout()).to_record();
        record.write_u64(offsets::ROOT_POSITION, 12);
        assert!(matches!(
            Superblock::from_record(&record),
            Err(SuperblockError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_record_size_mismatch() {
        let mut record = Superblock::new(layout()).to_record();
        record.write_u32(offsets::RECORD_SIZE, 1);
        record.seal(offsets::CHECKSUM);
        assert_eq!(
            Superblock::from_record(&record),
            Err(SuperblockError::RecordSizeMismatch {
                stored: 1,
                computed: 124,
            })
        );
    }

    #[test]
    fn test_invalid_size() {
        assert_eq!(
            Superblock::from_record(&Record::new(10)),
            Err(SuperblockError::InvalidSize(10))
        );
    }
}
