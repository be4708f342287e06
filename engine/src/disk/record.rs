//! Fixed-size record buffers and the node record header.
//!
//! Every node of the disk tree occupies one record. A record starts with a
//! 16-byte header:
//! - `tag`: 1 byte (leaf, internal or free)
//! - reserved: 1 byte
//! - `key_count`: 2 bytes
//! - `checksum`: 4 bytes (CRC32 of the record with this field zeroed)
//! - `position`: 8 bytes (the record's own position)

/// A record position (0-indexed slot number after the superblock).
pub type Position = u64;

/// Marker for "no position" in the superblock and free list.
pub const NO_POSITION: Position = u64::MAX;

/// Record type identifiers stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordTag {
    /// Leaf node
    Leaf = 0x01,
    /// Internal node
    Internal = 0x02,
    /// Free record (on the free list)
    Free = 0x03,
}

impl TryFrom<u8> for RecordTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Leaf),
            0x02 => Ok(Self::Internal),
            0x03 => Ok(Self::Free),
            _ => Err(value),
        }
    }
}

/// Record header field offsets.
pub mod header {
    pub const TAG: usize = 0;
    pub const KEY_COUNT: usize = 2;
    pub const CHECKSUM: usize = 4;
    pub const POSITION: usize = 8;
    /// Size of the record header in bytes.
    pub const SIZE: usize = 16;
}

/// A raw record buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    data: Vec<u8>,
}

impl Record {
    /// Create a zeroed record of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// Wrap raw bytes.
    #[must_use]
    pub const fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Record size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the record has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the raw record data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable access to the raw record data.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Mutable slice at a specific offset.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Read a u8 at the given offset.
    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Write a u8 at the given offset.
    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Read a little-endian u16 at the given offset.
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Write a little-endian u16 at the given offset.
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Read a little-endian u32 at the given offset.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(buf)
    }

    /// Write a little-endian u32 at the given offset.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Read a little-endian u64 at the given offset.
    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_le_bytes(buf)
    }

    /// Write a little-endian u64 at the given offset.
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// CRC32 of the record, treating the 4 bytes at `checksum_offset` as zero.
    #[must_use]
    pub fn compute_checksum(&self, checksum_offset: usize) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[..checksum_offset]);
        hasher.update(&[0u8; 4]);
        hasher.update(&self.data[checksum_offset + 4..]);
        hasher.finalize()
    }

    /// Compute the checksum and store it at `checksum_offset`.
    pub fn seal(&mut self, checksum_offset: usize) {
        let checksum = self.compute_checksum(checksum_offset);
        self.write_u32(checksum_offset, checksum);
    }

    /// Compare the stored checksum with a freshly computed one.
    ///
    /// Returns `(stored, computed)` when they differ.
    pub fn verify(&self, checksum_offset: usize) -> Result<(), (u32, u32)> {
        let stored = self.read_u32(checksum_offset);
        let computed = self.compute_checksum(checksum_offset);
        if stored == computed {
            Ok(())
        } else {
            Err((stored, computed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tag_round_trip() {
        for tag in [RecordTag::Leaf, RecordTag::Internal, RecordTag::Free] {
            assert_eq!(RecordTag::try_from(tag as u8), Ok(tag));
        }
        assert_eq!(RecordTag::try_from(0), Err(0));
        assert_eq!(RecordTag::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn test_read_write_helpers() {
        let mut record = Record::new(32);
        record.write_u8(0, 0x7F);
        record.write_u16(2, 0xBEEF);
        record.write_u32(4, 0xDEAD_BEEF);
        record.write_u64(8, 0x0123_4567_89AB_CDEF);
        record.write_bytes(16, b"hello");

        assert_eq!(record.read_u8(0), 0x7F);
        assert_eq!(record.read_u16(2), 0xBEEF);
        assert_eq!(record.read_u32(4), 0xDEAD_BEEF);
        assert_eq!(record.read_u64(8), 0x0123_4567_89AB_CDEF);
        assert_eq!(record.read_bytes(16, 5), b"hello");
        assert_eq!(record.len(), 32);
    }

    #[test]
    fn test_seal_and_verify() {
        let mut record = Record::new(64);
        record.write_bytes(20, b"payload");
        record.seal(header::CHECKSUM);
        assert!(record.verify(header::CHECKSUM).is_ok());

        record.as_bytes_mut()[30] ^= 0x01;
        let (stored, computed) = record
            .verify(header::CHECKSUM)
            .expect_err("flipped bit must be detected");
        assert_ne!(stored, computed);
    }

    #[test]
    fn test_checksum_ignores_its_own_field() {
        let mut record = Record::new(24);
        record.write_bytes(16, &[1, 2, 3]);
        let before = record.compute_checksum(header::CHECKSUM);
        record.write_u32(header::CHECKSUM, 0x1234_5678);
        assert_eq!(record.compute_checksum(header::CHECKSUM), before);
    }

    #[test]
    fn test_zeroed_record_fails_verification() {
        let record = Record::new(48);
        assert!(record.verify(header::CHECKSUM).is_err());
    }
}
