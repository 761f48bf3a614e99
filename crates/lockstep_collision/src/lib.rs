//! # lockstep_collision
//!
//! Swept-circle collision detection for the lockstep simulation.
//!
//! [`CollisionSystem`] walks every enabled [`Collidable`] in attachment
//! order, asks the spatial index for candidates outside its group, and
//! broadcasts [`Message::Collision`](lockstep_system::Message::Collision)
//! once per overlapping pair per frame. The test is swept between the
//! previous and current positions, so fast movers do not pass through each
//! other.

pub mod collidable;
pub mod system;

pub use collidable::{Collidable, SweptCircle};
pub use system::CollisionSystem;
