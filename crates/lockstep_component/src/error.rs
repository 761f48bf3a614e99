//! Component-layer error types.

use lockstep_packet::PacketError;

use crate::entity::Entity;

/// Errors that can occur when attaching components or moving world state in
/// and out of packets.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// The component type was registered twice.
    #[error("component type `{0}` is already registered")]
    AlreadyRegistered(&'static str),

    /// A component type was used before being registered with the world.
    #[error("component type `{0}` is not registered")]
    UnregisteredType(String),

    /// The entity was destroyed or never existed.
    #[error("{0} is not alive")]
    EntityNotAlive(Entity),

    /// The entity already carries a component of this type.
    #[error("{entity} already has a `{component}` component")]
    AlreadyAttached {
        entity: Entity,
        component: &'static str,
    },

    /// Snapshot layout does not match this world's registrations.
    #[error("snapshot has {found} component stores, world has {expected}")]
    StoreCountMismatch { expected: usize, found: usize },

    /// A snapshot's entity allocator breaks its own invariants.
    #[error("invalid entity allocator: {0}")]
    InvalidAllocator(&'static str),

    #[error(transparent)]
    Packet(#[from] PacketError),
}
