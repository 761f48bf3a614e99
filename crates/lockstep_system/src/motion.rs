//! Velocity integration.

use lockstep_component::{Entity, World};
use lockstep_math::{Transform, Velocity};

use crate::message::Message;
use crate::parallel::ParallelSystem;

/// Moves every enabled [`Transform`] by its entity's [`Velocity`] once per
/// frame and reports the move with [`Message::Moved`].
///
/// Entities without a velocity, or with a zero one, are left alone and
/// produce no message.
#[derive(Debug, Default)]
pub struct MotionSystem;

impl ParallelSystem for MotionSystem {
    type Component = Transform;

    fn name(&self) -> &'static str {
        "motion"
    }

    fn update_component(
        &self,
        world: &World,
        _frame: u64,
        entity: Entity,
        transform: &mut Transform,
        outbox: &mut Vec<Message>,
    ) {
        let Some(velocity) = world.get::<Velocity>(entity) else {
            return;
        };
        if velocity.linear == glam::Vec2::ZERO {
            return;
        }
        transform.position += velocity.linear;
        outbox.push(Message::Moved {
            entity,
            position: transform.position,
            velocity: velocity.linear,
        });
    }
}
