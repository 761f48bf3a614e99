//! One-shot encode/decode helpers.
//!
//! Thin wrappers around [`Packet`] for callers that hold a single value and a
//! plain byte vector, such as command payloads handed to a transport.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::PacketError;
use crate::packet::Packet;

/// Encode a value to its positional wire bytes.
///
/// # Errors
///
/// Returns a [`PacketError`] if the value cannot be represented, for example a
/// sequence without a known length.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, PacketError> {
    let mut packet = Packet::new();
    packet.write(value)?;
    Ok(packet.into_bytes())
}

/// Decode a value from positional wire bytes.
///
/// Trailing bytes after the value are ignored.
///
/// # Errors
///
/// Returns a [`PacketError`] if `bytes` is short or malformed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PacketError> {
    Packet::from_bytes(bytes.to_vec()).read()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct TestMsg {
        value: u32,
        name: String,
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let msg = TestMsg {
            value: 42,
            name: "hello".to_string(),
        };
        let bytes = encode(&msg).unwrap();
        let restored: TestMsg = decode(&bytes).unwrap();
        assert_eq!(msg, restored);
    }

    #[test]
    fn test_decode_short_bytes() {
        let result: Result<TestMsg, _> = decode(&[0x2A, 0x00]);
        assert!(matches!(result, Err(PacketError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_encode_is_positional() {
        let bytes = encode(&TestMsg {
            value: 1,
            name: "a".to_string(),
        })
        .unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 1, 0, 0, 0, b'a']);
    }
}
