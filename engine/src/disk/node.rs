//! Disk tree nodes and their record encoding.
//!
//! A node record holds, after the header, `2t - 1` key slots, `2t - 1` value
//! slots and `2t` child-position slots. Unused slots are zero. A free record
//! keeps the next free position in its first child slot.

use crate::disk::codec::FixedCodec;
use crate::disk::record::{Position, Record, RecordTag, header};
use crate::disk::superblock::RecordLayout;

/// A node materialized from its record.
///
/// This is a copy: it stays valid only until the same position is written
/// through another copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskNode<K, V> {
    /// The node's own position.
    pub position: Position,
    /// Whether the node is a leaf.
    pub leaf: bool,
    /// Keys in ascending order.
    pub keys: Vec<K>,
    /// Values parallel to `keys`.
    pub values: Vec<V>,
    /// Child positions, `keys.len() + 1` of them for an internal node.
    pub children: Vec<Position>,
}

impl<K: FixedCodec, V: FixedCodec> DiskNode<K, V> {
    /// Create an empty node.
    #[must_use]
    pub fn empty(position: Position, leaf: bool, layout: &RecordLayout) -> Self {
        Self {
            position,
            leaf,
            keys: Vec::with_capacity(layout.max_keys()),
            values: Vec::with_capacity(layout.max_keys()),
            children: Vec::with_capacity(if leaf { 0 } else { layout.max_children() }),
        }
    }

    /// Whether the node holds `2t - 1` keys.
    #[must_use]
    pub fn is_full(&self, layout: &RecordLayout) -> bool {
        self.keys.len() >= layout.max_keys()
    }

    /// Serialize the node into a sealed record.
    ///
    /// Fails if the node holds more keys than the layout or the header's
    /// 16-bit key count can represent.
    pub fn to_record(&self, layout: &RecordLayout) -> Result<Record, NodeError> {
        debug_assert_eq!(self.keys.len(), self.values.len());
        let too_many = || NodeError::KeyCountOutOfRange {
            position: self.position,
            count: self.keys.len(),
            max: layout.max_keys().min(usize::from(u16::MAX)),
        };
        if self.keys.len() > layout.max_keys() {
            return Err(too_many());
        }
        let key_count = u16::try_from(self.keys.len()).map_err(|_| too_many())?;

        let mut record = Record::new(layout.record_size());
        let tag = if self.leaf {
            RecordTag::Leaf
        } else {
            RecordTag::Internal
        };
        record.write_u8(header::TAG, tag as u8);
        record.write_u16(header::KEY_COUNT, key_count);
        record.write_u64(header::POSITION, self.position);

        let key_width = K::WIDTH;
        for (i, key) in self.keys.iter().enumerate() {
            key.encode(record.bytes_mut(layout.keys_offset() + i * key_width, key_width));
        }
        let value_width = V::WIDTH;
        for (i, value) in self.values.iter().enumerate() {
            value.encode(record.bytes_mut(layout.values_offset() + i * value_width, value_width));
        }
        for (i, child) in self.children.iter().enumerate() {
            record.write_u64(layout.children_offset() + i * 8, *child);
        }

        record.seal(header::CHECKSUM);
        Ok(record)
    }

    /// Decode the node stored at `position`.
    pub fn from_record(
        record: &Record,
        layout: &RecordLayout,
        position: Position,
    ) -> Result<Self, NodeError> {
        let tag = check_header(record, layout, position)?;
        let leaf = match tag {
            RecordTag::Leaf => true,
            RecordTag::Internal => false,
            RecordTag::Free => return Err(NodeError::FreeRecord(position)),
        };

        let key_count = usize::from(record.read_u16(header::KEY_COUNT));
        if key_count > layout.max_keys() {
            return Err(NodeError::KeyCountOutOfRange {
                position,
                count: key_count,
                max: layout.max_keys(),
            });
        }

        let mut node = Self::empty(position, leaf, layout);
        let key_width = K::WIDTH;
        node.keys.extend((0..key_count).map(|i| {
            K::decode(record.read_bytes(layout.keys_offset() + i * key_width, key_width))
        }));
        let value_width = V::WIDTH;
        node.values.extend((0..key_count).map(|i| {
            V::decode(record.read_bytes(layout.values_offset() + i * value_width, value_width))
        }));
        if !leaf {
            node.children.extend(
                (0..=key_count).map(|i| record.read_u64(layout.children_offset() + i * 8)),
            );
        }

        Ok(node)
    }
}

/// Build a sealed free record linking to `next_free`.
#[must_use]
pub fn free_record(position: Position, next_free: Position, layout: &RecordLayout) -> Record {
    let mut record = Record::new(layout.record_size());
    record.write_u8(header::TAG, RecordTag::Free as u8);
    record.write_u64(header::POSITION, position);
    record.write_u64(layout.children_offset(), next_free);
    record.seal(header::CHECKSUM);
    record
}

/// Read the next-free link of the free record at `position`.
pub fn read_free_link(
    record: &Record,
    layout: &RecordLayout,
    position: Position,
) -> Result<Position, NodeError> {
    match check_header(record, layout, position)? {
        RecordTag::Free => Ok(record.read_u64(layout.children_offset())),
        RecordTag::Leaf | RecordTag::Internal => Err(NodeError::NotFree(position)),
    }
}

/// Validate size, checksum, tag and self-position of a record.
fn check_header(
    record: &Record,
    layout: &RecordLayout,
    position: Position,
) -> Result<RecordTag, NodeError> {
    if record.len() != layout.record_size() {
        return Err(NodeError::SizeMismatch {
            position,
            size: record.len(),
            expected: layout.record_size(),
        });
    }
    record
        .verify(header::CHECKSUM)
        .map_err(|(stored, computed)| NodeError::ChecksumMismatch {
            position,
            stored,
            computed,
        })?;

    let tag = RecordTag::try_from(record.read_u8(header::TAG))
        .map_err(|tag| NodeError::InvalidTag { position, tag })?;

    let found = record.read_u64(header::POSITION);
    if found != position {
        return Err(NodeError::PositionMismatch {
            expected: position,
            found,
        });
    }
    Ok(tag)
}

/// Errors that can occur when decoding a node record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Record buffer has the wrong size.
    SizeMismatch {
        position: Position,
        size: usize,
        expected: usize,
    },
    /// Stored checksum does not match the contents.
    ChecksumMismatch {
        position: Position,
        stored: u32,
        computed: u32,
    },
    /// Unknown record tag.
    InvalidTag { position: Position, tag: u8 },
    /// The record claims to live at another position.
    PositionMismatch { expected: Position, found: Position },
    /// More keys than the layout allows.
    KeyCountOutOfRange {
        position: Position,
        count: usize,
        max: usize,
    },
    /// Expected a node, found a free record.
    FreeRecord(Position),
    /// Expected a free record, found a node.
    NotFree(Position),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeMismatch {
                position,
                size,
                expected,
            } => write!(
                f,
                "record {position} has {size} bytes, expected {expected}"
            ),
            Self::ChecksumMismatch {
                position,
                stored,
                computed,
            } => write!(
                f,
                "record {position} checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            ),
            Self::InvalidTag { position, tag } => {
                write!(f, "record {position} has invalid tag {tag:#04x}")
            }
            Self::PositionMismatch { expected, found } => {
                write!(f, "record at position {expected} claims position {found}")
            }
            Self::KeyCountOutOfRange {
                position,
                count,
                max,
            } => write!(f, "record {position} holds {count} keys (max {max})"),
            Self::FreeRecord(position) => write!(f, "record {position} is free"),
            Self::NotFree(position) => write!(f, "record {position} is not on the free list"),
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::superblock::MAX_MIN_DEGREE;

    fn layout() -> RecordLayout {
        RecordLayout::for_codecs::<u32, [u8; 4]>(2).expect("valid layout")
    }

    fn sample_internal() -> DiskNode<u32, [u8; 4]> {
        DiskNode {
            position: 7,
            leaf: false,
            keys: vec![10, 20],
            values: vec![*b"ten_", *b"twnt"],
            children: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_node_record_roundtrip() {
        let layout = layout();
        let node = sample_internal();
        let record = node.to_record(&layout).expect("encode node");
        assert_eq!(record.len(), layout.record_size());

        let decoded = DiskNode::from_record(&record, &layout, 7).expect("decode node");
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_empty_leaf_roundtrip() {
        let layout = layout();
        let node: DiskNode<u32, [u8; 4]> = DiskNode::empty(0, true, &layout);
        let record = node.to_record(&layout).expect("encode leaf");
        let decoded: DiskNode<u32, [u8; 4]> =
            DiskNode::from_record(&record, &layout, 0).expect("decode leaf");
        assert!(decoded.leaf);
        assert!(decoded.keys.is_empty());
        assert!(decoded.children.is_empty());
    }

    #[test]
    fn test_detects_corruption() {
        let layout = layout();
        let mut record = sample_internal().to_record(&layout).expect("encode node");
        record.as_bytes_mut()[layout.values_offset()] ^= 0x40;
        assert!(matches!(
            DiskNode::<u32, [u8; 4]>::from_record(&record, &layout, 7),
            Err(NodeError::ChecksumMismatch { position: 7, .. })
        ));
    }

    #[test]
    fn test_detects_wrong_position() {
        let layout = layout();
        let record = sample_internal().to_record(&layout).expect("encode node");
        assert_eq!(
            DiskNode::<u32, [u8; 4]>::from_record(&record, &layout, 8),
            Err(NodeError::PositionMismatch {
                expected: 8,
                found: 7,
            })
        );
    }

    #[test]
    fn test_detects_excess_key_count() {
        let layout = layout();
        let mut record = sample_internal().to_record(&layout).expect("encode node");
        record.write_u16(header::KEY_COUNT, 9);
        record.seal(header::CHECKSUM);
        assert!(matches!(
            DiskNode::<u32, [u8; 4]>::from_record(&record, &layout, 7),
            Err(NodeError::KeyCountOutOfRange { count: 9, max: 3, .. })
        ));
    }

    #[test]
    fn test_largest_degree_keeps_every_key() {
        let layout =
            RecordLayout::for_codecs::<u32, u8>(MAX_MIN_DEGREE).expect("largest degree is valid");
        assert_eq!(layout.max_keys(), usize::from(u16::MAX));

        let mut node: DiskNode<u32, u8> = DiskNode::empty(0, true, &layout);
        node.keys.extend(0..u32::from(u16::MAX));
        node.values.resize(node.keys.len(), 1);
        let record = node.to_record(&layout).expect("encode full leaf");
        let decoded: DiskNode<u32, u8> =
            DiskNode::from_record(&record, &layout, 0).expect("decode full leaf");
        assert_eq!(decoded.keys.len(), usize::from(u16::MAX));
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_rejects_key_count_beyond_header_field() {
        // Hand-built layout one past the largest degree for_codecs accepts.
        let layout = RecordLayout {
            min_degree: 32_769,
            key_width: 4,
            value_width: 1,
        };
        let mut node: DiskNode<u32, u8> = DiskNode::empty(0, true, &layout);
        node.keys.extend(0..65_536);
        node.values.resize(node.keys.len(), 0);
        assert!(matches!(
            node.to_record(&layout),
            Err(NodeError::KeyCountOutOfRange { count: 65_536, .. })
        ));
    }

    #[test]
    fn test_free_record_link() {
        let layout = layout();
        let record = free_record(5, 3, &layout);
        assert_eq!(read_free_link(&record, &layout, 5), Ok(3));
        assert_eq!(
            DiskNode::<u32, [u8; 4]>::from_record(&record, &layout, 5),
            Err(NodeError::FreeRecord(5))
        );

        let node_record = sample_internal().to_record(&layout).expect("encode node");
        assert_eq!(
            read_free_link(&node_record, &layout, 7),
            Err(NodeError::NotFree(7))
        );
    }
}
