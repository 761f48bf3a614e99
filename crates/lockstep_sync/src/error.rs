//! Synchronization error types.

use lockstep_packet::PacketError;
use lockstep_system::SimError;

use crate::command::CommandKind;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A frame-bound command arrived for a frame older than the retained
    /// history. Only a full resynchronization can recover.
    #[error("command for frame {frame} is older than the oldest checkpoint (frame {oldest})")]
    TooOld { frame: u64, oldest: u64 },

    /// The command kind is not applied at a frame.
    #[error("{0:?} commands cannot be scheduled on the timeline")]
    NotFrameBound(CommandKind),

    #[error(transparent)]
    Simulation(#[from] SimError),

    #[error(transparent)]
    Packet(#[from] PacketError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_old_message() {
        let err = SyncError::TooOld { frame: 2, oldest: 10 };
        assert_eq!(
            err.to_string(),
            "command for frame 2 is older than the oldest checkpoint (frame 10)"
        );
    }

    #[test]
    fn test_packet_errors_convert() {
        let err: SyncError = PacketError::UnexpectedNull.into();
        assert!(matches!(err, SyncError::Packet(PacketError::UnexpectedNull)));
    }
}
