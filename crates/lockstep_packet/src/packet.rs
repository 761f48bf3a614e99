//! The [`Packet`] byte buffer.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::de::Decoder;
use crate::error::PacketError;
use crate::ser::encode_into;
use crate::sink::{NULL_LENGTH, WireSink};

/// A stable wire name for a type, written ahead of the value by the
/// "with type info" encoding.
///
/// Tags must be unique across every type a peer can receive; they are part of
/// the protocol and must not change between builds that talk to each other.
pub trait TypeTag {
    const TYPE_TAG: &'static str;
}

/// Append-only byte buffer with a sequential read cursor.
///
/// Writes always go to the end; reads advance an independent cursor from the
/// start. Two packets are equal when their bytes are equal, regardless of
/// where either one's read cursor sits.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    data: Vec<u8>,
    read_pos: usize,
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Packet {}

impl WireSink for Packet {
    fn write_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Wrap received bytes for reading.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, read_pos: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Total bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the read cursor and the end.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Move the read cursor back to the start.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// Put the read cursor back to a position saved from
    /// [`Packet::read_position`].
    pub(crate) fn restore(&mut self, pos: usize) {
        self.read_pos = pos.min(self.data.len());
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }

    fn take(&mut self, n: usize) -> Result<&[u8], PacketError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(PacketError::UnexpectedEnd {
                needed: n,
                remaining,
            });
        }
        let start = self.read_pos;
        self.read_pos += n;
        Ok(&self.data[start..start + n])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    // ── Primitive reads ─────────────────────────────────────────────

    pub fn read_bool(&mut self) -> Result<bool, PacketError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => {
                self.read_pos -= 1;
                Err(PacketError::InvalidBool(other))
            }
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, PacketError> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, PacketError> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, PacketError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, PacketError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, PacketError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, PacketError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, PacketError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read an `i32` length prefix. [`NULL_LENGTH`] yields `None`.
    pub fn read_len(&mut self) -> Result<Option<usize>, PacketError> {
        let prefix = self.read_i32()?;
        match prefix {
            NULL_LENGTH => Ok(None),
            n if n < 0 => {
                self.read_pos -= 4;
                Err(PacketError::InvalidLength(n))
            }
            n => Ok(Some(n as usize)),
        }
    }

    /// Read a length-prefixed byte array. A null array yields `None`.
    ///
    /// On a short buffer the cursor is left before the length prefix.
    pub fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, PacketError> {
        let start = self.read_pos;
        let Some(len) = self.read_len()? else {
            return Ok(None);
        };
        match self.take(len) {
            Ok(bytes) => Ok(Some(bytes.to_vec())),
            Err(err) => {
                self.read_pos = start;
                Err(err)
            }
        }
    }

    pub fn read_string(&mut self) -> Result<Option<String>, PacketError> {
        let start = self.read_pos;
        match self.read_bytes()? {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| {
                self.read_pos = start;
                PacketError::InvalidUtf8
            }),
        }
    }

    // ── Composite values ────────────────────────────────────────────

    /// Append the positional encoding of `value`.
    ///
    /// A failed write leaves the packet exactly as it was.
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), PacketError> {
        let start = self.data.len();
        let result = encode_into(self, value);
        if result.is_err() {
            self.data.truncate(start);
        }
        result
    }

    /// Read a value written by [`Packet::write`].
    ///
    /// A failed read leaves the read cursor where it was.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T, PacketError> {
        let start = self.read_pos;
        let result = {
            let mut decoder = Decoder::new(self);
            T::deserialize(&mut decoder)
        };
        if result.is_err() {
            self.read_pos = start;
        }
        result
    }

    /// Write a nullable nested value: a present flag, then the fields.
    pub fn write_nested<T: Serialize>(&mut self, value: Option<&T>) -> Result<(), PacketError> {
        self.write(&value)
    }

    pub fn read_nested<T: DeserializeOwned>(&mut self) -> Result<Option<T>, PacketError> {
        self.read()
    }

    /// Write `value` prefixed with its type tag. `None` writes a null tag.
    pub fn write_with_type_info<T>(&mut self, value: Option<&T>) -> Result<(), PacketError>
    where
        T: TypeTag + Serialize,
    {
        let start = self.data.len();
        let result = match value {
            None => self.write_string(None),
            Some(value) => self
                .write_string(Some(T::TYPE_TAG))
                .and_then(|()| encode_into(self, value)),
        };
        if result.is_err() {
            self.data.truncate(start);
        }
        result
    }

    /// Read a value written by [`Packet::write_with_type_info`].
    ///
    /// Fails with [`PacketError::TypeTagMismatch`] if the packet holds a
    /// different type, leaving the cursor before the tag.
    pub fn read_with_type_info<T>(&mut self) -> Result<Option<T>, PacketError>
    where
        T: TypeTag + DeserializeOwned,
    {
        let start = self.read_pos;
        let result = match self.read_type_tag() {
            Ok(None) => Ok(None),
            Ok(Some(tag)) if tag == T::TYPE_TAG => self.read::<T>().map(Some),
            Ok(Some(tag)) => Err(PacketError::TypeTagMismatch {
                expected: T::TYPE_TAG.to_string(),
                found: tag,
            }),
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.read_pos = start;
        }
        result
    }

    /// Read only the type tag of a "with type info" value.
    pub fn read_type_tag(&mut self) -> Result<Option<String>, PacketError> {
        self.read_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Inner {
        id: u32,
        label: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Kind {
        Idle,
        Moving { dx: f32, dy: f32 },
        Tagged(i64, bool),
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Outer {
        flag: bool,
        small: i8,
        wide: u64,
        ratio: f64,
        letter: char,
        inner: Option<Inner>,
        missing: Option<Inner>,
        items: Vec<Inner>,
        kind: Kind,
        table: BTreeMap<u16, i16>,
        pair: (u8, f32),
    }

    impl TypeTag for Inner {
        const TYPE_TAG: &'static str = "test.Inner";
    }

    impl TypeTag for Outer {
        const TYPE_TAG: &'static str = "test.Outer";
    }

    fn sample() -> Outer {
        let mut table = BTreeMap::new();
        table.insert(3, -3);
        table.insert(9, 900);
        Outer {
            flag: true,
            small: -5,
            wide: u64::MAX - 1,
            ratio: -0.125,
            letter: 'λ',
            inner: Some(Inner {
                id: 42,
                label: "ship".to_string(),
            }),
            missing: None,
            items: vec![
                Inner {
                    id: 1,
                    label: String::new(),
                },
                Inner {
                    id: 2,
                    label: "b".to_string(),
                },
            ],
            kind: Kind::Moving { dx: 1.5, dy: -2.0 },
            table,
            pair: (7, f32::MIN_POSITIVE),
        }
    }

    #[test]
    fn test_primitive_round_trip() {
        let mut packet = Packet::new();
        packet.write(&true).unwrap();
        packet.write(&-1234i16).unwrap();
        packet.write(&0xDEAD_BEEFu32).unwrap();
        packet.write(&i64::MIN).unwrap();
        packet.write(&f32::NAN.to_bits()).unwrap();
        packet.write(&3.5f64).unwrap();

        assert!(packet.read::<bool>().unwrap());
        assert_eq!(packet.read::<i16>().unwrap(), -1234);
        assert_eq!(packet.read::<u32>().unwrap(), 0xDEAD_BEEF);
        assert_eq!(packet.read::<i64>().unwrap(), i64::MIN);
        assert_eq!(packet.read::<u32>().unwrap(), f32::NAN.to_bits());
        assert_eq!(packet.read::<f64>().unwrap(), 3.5);
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn test_nested_graph_round_trip() {
        let value = sample();
        let mut packet = Packet::new();
        packet.write(&value).unwrap();
        assert_eq!(packet.read::<Outer>().unwrap(), value);
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn test_enum_variants_round_trip() {
        let mut packet = Packet::new();
        for kind in [Kind::Idle, Kind::Tagged(-9, false)] {
            packet.write(&kind).unwrap();
        }
        assert_eq!(packet.read::<Kind>().unwrap(), Kind::Idle);
        assert_eq!(packet.read::<Kind>().unwrap(), Kind::Tagged(-9, false));
    }

    #[test]
    fn test_read_past_end_fails_and_keeps_cursor() {
        let mut packet = Packet::new();
        packet.write(&7u16).unwrap();
        let err = packet.read::<u32>().unwrap_err();
        assert_eq!(
            err,
            PacketError::UnexpectedEnd {
                needed: 4,
                remaining: 2
            }
        );
        assert_eq!(packet.read_position(), 0);
        assert_eq!(packet.read::<u16>().unwrap(), 7);
    }

    #[test]
    fn test_truncated_composite_restores_cursor() {
        let mut full = Packet::new();
        full.write(&sample()).unwrap();
        let mut bytes = full.into_bytes();
        bytes.truncate(bytes.len() - 3);
        let mut packet = Packet::from_bytes(bytes);
        assert!(packet.read::<Outer>().is_err());
        assert_eq!(packet.read_position(), 0);
    }

    #[test]
    fn test_null_and_empty_bytes() {
        let mut packet = Packet::new();
        packet.write_bytes(None).unwrap();
        packet.write_bytes(Some(&[])).unwrap();
        packet.write_string(Some("ok")).unwrap();
        assert_eq!(packet.read_bytes().unwrap(), None);
        assert_eq!(packet.read_bytes().unwrap(), Some(Vec::new()));
        assert_eq!(packet.read_string().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_null_string_into_non_nullable_fails() {
        let mut packet = Packet::new();
        packet.write_string(None).unwrap();
        assert_eq!(
            packet.read::<String>().unwrap_err(),
            PacketError::UnexpectedNull
        );
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut packet = Packet::new();
        packet.write_i32(-7);
        assert_eq!(
            packet.read_bytes().unwrap_err(),
            PacketError::InvalidLength(-7)
        );
        assert_eq!(packet.read_position(), 0);
    }

    #[test]
    fn test_invalid_bool_byte() {
        let mut packet = Packet::from_bytes(vec![2]);
        assert_eq!(packet.read_bool().unwrap_err(), PacketError::InvalidBool(2));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut packet = Packet::new();
        packet.write_bytes(Some(&[0xFF, 0xFE])).unwrap();
        assert_eq!(
            packet.read_string().unwrap_err(),
            PacketError::InvalidUtf8
        );
        assert_eq!(packet.read_position(), 0);
    }

    #[test]
    fn test_nested_present_flag() {
        let inner = Inner {
            id: 5,
            label: "x".to_string(),
        };
        let mut packet = Packet::new();
        packet.write_nested(Some(&inner)).unwrap();
        packet.write_nested::<Inner>(None).unwrap();
        assert_eq!(packet.as_bytes()[0], 1);
        assert_eq!(packet.read_nested::<Inner>().unwrap(), Some(inner));
        assert_eq!(packet.read_nested::<Inner>().unwrap(), None);
    }

    #[test]
    fn test_type_info_round_trip() {
        let inner = Inner {
            id: 8,
            label: "tagged".to_string(),
        };
        let mut packet = Packet::new();
        packet.write_with_type_info(Some(&inner)).unwrap();
        packet.write_with_type_info::<Inner>(None).unwrap();
        assert_eq!(
            packet.read_with_type_info::<Inner>().unwrap(),
            Some(inner)
        );
        assert_eq!(packet.read_with_type_info::<Inner>().unwrap(), None);
    }

    #[test]
    fn test_type_info_mismatch_restores_cursor() {
        let mut packet = Packet::new();
        packet.write_with_type_info(Some(&sample())).unwrap();
        let err = packet.read_with_type_info::<Inner>().unwrap_err();
        assert_eq!(
            err,
            PacketError::TypeTagMismatch {
                expected: "test.Inner".to_string(),
                found: "test.Outer".to_string(),
            }
        );
        assert_eq!(packet.read_position(), 0);
        assert_eq!(
            packet.read_with_type_info::<Outer>().unwrap(),
            Some(sample())
        );
    }

    #[test]
    fn test_equality_is_byte_equality() {
        let mut a = Packet::new();
        a.write(&sample()).unwrap();
        let mut b = Packet::from_bytes(a.as_bytes().to_vec());
        let _ = b.read::<bool>().unwrap();
        assert_eq!(a, b);
        b.write_u8(0);
        assert_ne!(a, b);
    }
}
