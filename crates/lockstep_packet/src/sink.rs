//! Primitive encoding shared by packets and hashers.
//!
//! Anything that consumes the canonical byte stream implements [`WireSink`].
//! The provided methods fix the encoding of every primitive, so a
//! [`Packet`](crate::Packet) and a [`StateHasher`](crate::StateHasher) fed the
//! same calls see exactly the same bytes.

use crate::error::PacketError;

/// Length prefix used to encode an absent byte array or string.
pub const NULL_LENGTH: i32 = -1;

/// A consumer of the canonical little-endian byte stream.
pub trait WireSink {
    /// Append raw bytes.
    fn write_raw(&mut self, bytes: &[u8]);

    /// One byte, `0` or `1`.
    fn write_bool(&mut self, value: bool) {
        self.write_raw(&[u8::from(value)]);
    }

    fn write_u8(&mut self, value: u8) {
        self.write_raw(&[value]);
    }

    fn write_i8(&mut self, value: i8) {
        self.write_raw(&value.to_le_bytes());
    }

    fn write_u16(&mut self, value: u16) {
        self.write_raw(&value.to_le_bytes());
    }

    fn write_i16(&mut self, value: i16) {
        self.write_raw(&value.to_le_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.write_raw(&value.to_le_bytes());
    }

    fn write_i32(&mut self, value: i32) {
        self.write_raw(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.write_raw(&value.to_le_bytes());
    }

    fn write_i64(&mut self, value: i64) {
        self.write_raw(&value.to_le_bytes());
    }

    /// IEEE-754 bit pattern, little-endian.
    fn write_f32(&mut self, value: f32) {
        self.write_raw(&value.to_bits().to_le_bytes());
    }

    /// IEEE-754 bit pattern, little-endian.
    fn write_f64(&mut self, value: f64) {
        self.write_raw(&value.to_bits().to_le_bytes());
    }

    /// Write an `i32` length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::LengthOverflow`] if `len` exceeds `i32::MAX`.
    fn write_len(&mut self, len: usize) -> Result<(), PacketError> {
        let prefix = i32::try_from(len).map_err(|_| PacketError::LengthOverflow(len))?;
        self.write_i32(prefix);
        Ok(())
    }

    /// Length-prefixed byte array; `None` is written as [`NULL_LENGTH`].
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::LengthOverflow`] for arrays longer than
    /// `i32::MAX`.
    fn write_bytes(&mut self, value: Option<&[u8]>) -> Result<(), PacketError> {
        match value {
            None => {
                self.write_i32(NULL_LENGTH);
                Ok(())
            }
            Some(bytes) => {
                self.write_len(bytes.len())?;
                self.write_raw(bytes);
                Ok(())
            }
        }
    }

    /// UTF-8 bytes of `value`, encoded as a byte array.
    ///
    /// # Errors
    ///
    /// See [`WireSink::write_bytes`].
    fn write_string(&mut self, value: Option<&str>) -> Result<(), PacketError> {
        self.write_bytes(value.map(str::as_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<u8>);

    impl WireSink for Collect {
        fn write_raw(&mut self, bytes: &[u8]) {
            self.0.extend_from_slice(bytes);
        }
    }

    #[test]
    fn test_integers_are_little_endian() {
        let mut sink = Collect::default();
        sink.write_u16(0x0102);
        sink.write_i32(-2);
        assert_eq!(sink.0, vec![0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_null_bytes_use_sentinel() {
        let mut sink = Collect::default();
        sink.write_bytes(None).unwrap();
        assert_eq!(sink.0, (-1i32).to_le_bytes().to_vec());
    }

    #[test]
    fn test_empty_and_null_differ() {
        let mut empty = Collect::default();
        empty.write_bytes(Some(&[])).unwrap();
        let mut null = Collect::default();
        null.write_bytes(None).unwrap();
        assert_ne!(empty.0, null.0);
    }

    #[test]
    fn test_float_uses_bit_pattern() {
        let mut positive = Collect::default();
        positive.write_f32(0.0);
        let mut negative = Collect::default();
        negative.write_f32(-0.0);
        assert_ne!(positive.0, negative.0);
    }
}
