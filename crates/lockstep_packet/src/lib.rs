//! # lockstep_packet
//!
//! Byte-exact wire format and state fingerprinting for the lockstep
//! simulation.
//!
//! This crate provides:
//!
//! - [`packet`]: the [`Packet`] buffer with primitive, composite and
//!   "with type info" reads and writes.
//! - [`hasher`]: [`StateHasher`], a 32-bit FNV-1a accumulator fed the same
//!   byte stream a packet would hold.
//! - [`registry`]: [`TypeRegistry`] for tag-dispatched reads.
//! - [`codec`]: one-shot `encode`/`decode` helpers.
//! - [`error`]: [`PacketError`].
//!
//! Composite values go through serde. The format is positional: struct
//! fields in declared order, no names, `Option` as a present flag, sequences
//! and strings with an `i32` length where `-1` means null.

mod de;
mod ser;
mod sink;

pub mod codec;
pub mod error;
pub mod hasher;
pub mod packet;
pub mod registry;

pub use codec::{decode, encode};
pub use error::PacketError;
pub use hasher::StateHasher;
pub use packet::{Packet, TypeTag};
pub use registry::TypeRegistry;
pub use ser::encode_into;
pub use sink::{NULL_LENGTH, WireSink};
