//! Simulation-level error types.

use lockstep_component::ComponentError;
use lockstep_packet::PacketError;

/// Errors raised by the system manager.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A system was registered after the first frame or context.
    #[error("cannot register system `{0}`: the simulation has already started")]
    RegistrationClosed(&'static str),

    /// The system is running its own pass or handling a message.
    #[error("system `{0}` is busy")]
    SystemBusy(&'static str),

    /// A handle was used against a system of a different type.
    #[error("system `{0}` does not have the requested type")]
    SystemTypeMismatch(&'static str),

    /// Snapshot was written by a simulation with different systems.
    #[error("snapshot has {found} systems, simulation has {expected}")]
    SystemCountMismatch { expected: usize, found: usize },

    #[error("snapshot system `{found}` does not match registered system `{expected}`")]
    SystemNameMismatch { expected: &'static str, found: String },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Packet(#[from] PacketError),
}
