//! 2D transform and velocity components.
//!
//! [`Transform`] is the spatial component nearly every simulated entity
//! carries; the index and collision systems read their positions from it.

use glam::Vec2;
use lockstep_component::Component;
use lockstep_packet::TypeTag;
use serde::{Deserialize, Serialize};

/// Position and heading in the plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    /// World-space position.
    pub position: Vec2,
    /// Heading in radians, counter-clockwise from +x.
    pub rotation: f32,
}

impl Transform {
    /// The origin with no rotation.
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        rotation: 0.0,
    };

    #[must_use]
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Translate the transform by the given offset.
    #[must_use]
    pub fn translated(mut self, offset: Vec2) -> Self {
        self.position += offset;
        self
    }

    #[must_use]
    pub fn rotated(mut self, angle: f32) -> Self {
        self.rotation += angle;
        self
    }

    /// Unit vector along the heading.
    #[must_use]
    pub fn forward(&self) -> Vec2 {
        Vec2::from_angle(self.rotation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TypeTag for Transform {
    const TYPE_TAG: &'static str = "lockstep.Transform";
}

impl Component for Transform {}

/// Linear velocity in units per frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub linear: Vec2,
}

impl Velocity {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            linear: Vec2::new(x, y),
        }
    }
}

impl TypeTag for Velocity {
    const TYPE_TAG: &'static str = "lockstep.Velocity";
}

impl Component for Velocity {}

#[cfg(test)]
mod tests {
    use lockstep_packet::Packet;

    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = Transform::IDENTITY;
        assert_eq!(t.position, Vec2::ZERO);
        assert_eq!(t.rotation, 0.0);
    }

    #[test]
    fn test_translated() {
        let t = Transform::IDENTITY.translated(Vec2::new(5.0, 0.0));
        assert_eq!(t.position, Vec2::new(5.0, 0.0));
    }

    #[test]
    fn test_forward() {
        let t = Transform::IDENTITY;
        assert_eq!(t.forward(), Vec2::X);
    }

    #[test]
    fn test_wire_layout() {
        let t = Transform {
            position: Vec2::new(1.0, 2.0),
            rotation: 0.5,
        };
        let mut packet = Packet::new();
        packet.write(&t).unwrap();
        assert_eq!(packet.len(), 12);
        assert_eq!(&packet.as_bytes()[..4], &1.0f32.to_le_bytes());
        assert_eq!(packet.read::<Transform>().unwrap(), t);
    }

    #[test]
    fn test_velocity_roundtrip() {
        let v = Velocity::new(-0.25, 3.0);
        let mut packet = Packet::new();
        packet.write(&v).unwrap();
        assert_eq!(packet.read::<Velocity>().unwrap(), v);
    }
}
