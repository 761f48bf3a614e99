//! Wire-format error types.

use std::fmt::Display;

/// Errors raised while writing to or reading from a [`Packet`](crate::Packet).
///
/// None of these are recovered locally: a malformed buffer means the peers no
/// longer agree on state, so the error travels up to whoever asked for the
/// (de)serialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// A read needed more bytes than the packet has left.
    #[error("unexpected end of packet: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left after the read cursor.
        remaining: usize,
    },

    /// A length prefix was negative (other than the null sentinel).
    #[error("invalid length prefix {0}")]
    InvalidLength(i32),

    /// A length does not fit into the `i32` prefix.
    #[error("length {0} does not fit the i32 length prefix")]
    LengthOverflow(usize),

    /// A null value (`-1` length or absent type tag) was read into a
    /// destination that cannot hold one.
    #[error("null value read into a non-nullable destination")]
    UnexpectedNull,

    /// A bool byte other than 0 or 1.
    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),

    /// A `u32` that is not a Unicode scalar value.
    #[error("invalid char code point {0:#x}")]
    InvalidChar(u32),

    /// String bytes that are not UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A sequence or map was serialized without a known length.
    #[error("sequence length must be known up front")]
    UnknownLength,

    /// The format is positional and cannot drive `deserialize_any`.
    #[error("packet format is not self-describing; {0} needs a concrete type")]
    NotSelfDescribing(&'static str),

    /// A type tag read from the packet has no registered reader.
    #[error("no reader registered for type tag `{0}`")]
    UnknownTypeTag(String),

    /// A type tag was registered twice.
    #[error("type tag `{0}` is already registered")]
    DuplicateTypeTag(String),

    /// A tagged read found a different tag than the one requested.
    #[error("expected type tag `{expected}`, found `{found}`")]
    TypeTagMismatch {
        /// The tag the caller asked for.
        expected: String,
        /// The tag found in the packet.
        found: String,
    },

    /// A message raised by a serde `Serialize`/`Deserialize` implementation.
    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for PacketError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

impl serde::de::Error for PacketError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_end_message() {
        let err = PacketError::UnexpectedEnd {
            needed: 4,
            remaining: 1,
        };
        assert_eq!(
            err.to_string(),
            "unexpected end of packet: needed 4 bytes, 1 remaining"
        );
    }

    #[test]
    fn test_serde_custom_errors() {
        let err = <PacketError as serde::de::Error>::custom("bad field");
        assert_eq!(err, PacketError::Custom("bad field".to_string()));
    }
}
