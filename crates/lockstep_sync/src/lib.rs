//! # lockstep_sync
//!
//! The command surface peers use to stay in lockstep.
//!
//! This crate provides:
//!
//! - [`command`]: the [`Command`] envelope and its typed payloads.
//! - [`timeline`]: [`Timeline`], which applies commands at their origin
//!   frame, rolling back and replaying when one arrives late, and compares
//!   peer hashes.
//! - [`pacer`]: [`FramePacer`], tick pacing from remote clocks.
//! - [`error`]: [`SyncError`].
//!
//! Transport is left to the caller: commands go out as byte buffers from
//! [`Command::to_bytes`] and come back through [`Command::from_bytes`].

pub mod command;
pub mod config;
pub mod error;
pub mod pacer;
pub mod timeline;

pub use command::{
    AddGameObject, Command, CommandKind, GameStateRequest, GameStateResponse, Payload,
    PlayerInput, RemoveGameObject, Synchronize,
};
pub use config::TimelineConfig;
pub use error::SyncError;
pub use pacer::FramePacer;
pub use timeline::{HashCheck, Outcome, Timeline};
