//! Fixed-width encoding of keys and values.
//!
//! Disk records reserve the same number of bytes for every key slot and every
//! value slot, so only types with a fixed encoded width can be stored.
//! Integers are little-endian.

/// A type with a fixed-width binary encoding.
pub trait FixedCodec: Sized {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Write the encoding into `out[..Self::WIDTH]`.
    fn encode(&self, out: &mut [u8]);

    /// Read a value from `bytes[..Self::WIDTH]`.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_fixed_codec_for_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl FixedCodec for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn encode(&self, out: &mut [u8]) {
                    out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..Self::WIDTH]);
                    Self::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_fixed_codec_for_int!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

impl<const N: usize> FixedCodec for [u8; N] {
    const WIDTH: usize = N;

    fn encode(&self, out: &mut [u8]) {
        out[..N].copy_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&bytes[..N]);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: FixedCodec + PartialEq + std::fmt::Debug>(value: &T) {
        let mut buf = vec![0u8; T::WIDTH];
        value.encode(&mut buf);
        assert_eq!(&T::decode(&buf), value);
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(u8::WIDTH, 1);
        assert_eq!(u32::WIDTH, 4);
        assert_eq!(i64::WIDTH, 8);
        assert_eq!(u128::WIDTH, 16);
    }

    #[test]
    fn test_integers_are_little_endian() {
        let mut buf = [0u8; 4];
        0x0102_0304_u32.encode(&mut buf);
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_round_trip_edge_values() {
        round_trip(&i32::MIN);
        round_trip(&-1_i64);
        round_trip(&u64::MAX);
        round_trip(&[7u8; 16]);
        round_trip(&[0u8; 0]);
    }

    #[test]
    fn test_encode_into_larger_slot() {
        let mut slot = [0xAAu8; 12];
        42_u64.encode(&mut slot);
        assert_eq!(&slot[8..], &[0xAA; 4]);
        assert_eq!(u64::decode(&slot), 42);
    }
}
