//! # lockstep_math
//!
//! 2D math types for the lockstep simulation. Re-exports [`glam`] for vector
//! algebra and defines the spatial components that implement
//! [`Component`](lockstep_component::Component).

pub mod rect;
pub mod transform;

// Re-export glam types for convenience.
pub use glam::Vec2;

pub use rect::Rect;
pub use transform::{Transform, Velocity};
