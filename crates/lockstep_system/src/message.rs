//! Messages broadcast between systems.

use std::any::Any;
use std::sync::Arc;

use glam::Vec2;
use lockstep_component::{ComponentTypeId, Entity};

/// A value broadcast synchronously to every system, in registration order.
#[derive(Debug, Clone)]
pub enum Message {
    // ── Lifecycle ───────────────────────────────────────────────────
    ComponentAdded {
        entity: Entity,
        component: ComponentTypeId,
    },
    ComponentRemoved {
        entity: Entity,
        component: ComponentTypeId,
    },
    /// Sent after all of the entity's components were removed.
    EntityDestroyed { entity: Entity },
    /// The whole world was replaced from a snapshot.
    Restored,

    // ── Simulation ──────────────────────────────────────────────────
    /// An entity's position changed. `velocity` is the displacement this
    /// frame.
    Moved {
        entity: Entity,
        position: Vec2,
        velocity: Vec2,
    },
    Collision { first: Entity, second: Entity },
    /// A player's discrete input, applied at the frame it was issued for.
    Input {
        player: u32,
        action: u16,
        pressed: bool,
    },

    /// Anything else a game wants to broadcast.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Message {
    /// Wrap a game-defined value.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    /// The wrapped value, if this is a [`Message::Custom`] of type `T`.
    pub fn downcast_custom<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom(value) => value.downcast_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping(u8);

    #[test]
    fn test_custom_downcast() {
        let message = Message::custom(Ping(3));
        assert_eq!(message.downcast_custom::<Ping>(), Some(&Ping(3)));
        assert_eq!(message.downcast_custom::<u8>(), None);
        assert_eq!(Message::Restored.downcast_custom::<Ping>(), None);
    }
}
