//! Streaming FNV-1a state fingerprint.

use serde::Serialize;

use crate::error::PacketError;
use crate::ser::encode_into;
use crate::sink::WireSink;

const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Running 32-bit FNV-1a hash over the canonical wire encoding.
///
/// Every value fed through [`StateHasher::put`] or the [`WireSink`] methods is
/// hashed byte for byte exactly as a [`Packet`](crate::Packet) would store it,
/// so two peers holding the same state in the same order produce the same
/// value. Floats are hashed by bit pattern: `0.0` and `-0.0` differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHasher {
    hash: u32,
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl WireSink for StateHasher {
    fn write_raw(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.hash = (self.hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME);
        }
    }
}

impl StateHasher {
    pub fn new() -> Self {
        Self {
            hash: FNV_OFFSET_BASIS,
        }
    }

    /// Return to the offset basis.
    pub fn reset(&mut self) {
        self.hash = FNV_OFFSET_BASIS;
    }

    /// Feed the wire encoding of `value`.
    ///
    /// # Errors
    ///
    /// Fails only where [`Packet::write`](crate::Packet::write) would.
    pub fn put<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), PacketError> {
        encode_into(self, value)
    }

    /// The finished hash. Does not disturb the running state.
    pub fn value(&self) -> u32 {
        let mut h = self.hash;
        h = h.wrapping_add(h << 13);
        h ^= h >> 7;
        h = h.wrapping_add(h << 3);
        h ^= h >> 17;
        h = h.wrapping_add(h << 5);
        h
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;
    use crate::Packet;

    #[derive(Serialize)]
    struct Body {
        x: f32,
        y: f32,
        hp: u16,
        name: String,
    }

    fn body(x: f32) -> Body {
        Body {
            x,
            y: 2.0,
            hp: 100,
            name: "probe".to_string(),
        }
    }

    fn hash_of<T: Serialize>(value: &T) -> u32 {
        let mut hasher = StateHasher::new();
        hasher.put(value).unwrap();
        hasher.value()
    }

    #[test]
    fn test_raw_fnv_of_empty_input() {
        let hasher = StateHasher::new();
        assert_eq!(hasher.hash, FNV_OFFSET_BASIS);
    }

    #[test]
    fn test_single_byte_step() {
        let mut hasher = StateHasher::new();
        hasher.write_u8(b'a');
        // FNV-1a 32 of "a".
        assert_eq!(hasher.hash, 0xE40C_292C);
    }

    #[test]
    fn test_value_is_repeatable() {
        let mut hasher = StateHasher::new();
        hasher.put(&body(1.0)).unwrap();
        let first = hasher.value();
        assert_eq!(hasher.value(), first);
        hasher.put(&0u8).unwrap();
        assert_ne!(hasher.value(), first);
    }

    #[test]
    fn test_same_state_same_hash() {
        assert_eq!(hash_of(&body(1.5)), hash_of(&body(1.5)));
    }

    #[test]
    fn test_one_field_changes_hash() {
        assert_ne!(hash_of(&body(1.5)), hash_of(&body(1.5000001)));
        assert_ne!(hash_of(&body(0.0)), hash_of(&body(-0.0)));
    }

    #[test]
    fn test_matches_packet_bytes() {
        let mut packet = Packet::new();
        packet.write(&body(3.0)).unwrap();
        let mut by_bytes = StateHasher::new();
        by_bytes.write_raw(packet.as_bytes());
        assert_eq!(by_bytes.value(), hash_of(&body(3.0)));
    }

    #[test]
    fn test_reset() {
        let mut hasher = StateHasher::new();
        hasher.put(&body(9.0)).unwrap();
        hasher.reset();
        assert_eq!(hasher, StateHasher::new());
    }
}
