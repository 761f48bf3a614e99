//! The collision component and the swept-circle test.

use glam::Vec2;
use lockstep_component::Component;
use lockstep_index::GroupMask;
use lockstep_packet::TypeTag;
use serde::{Deserialize, Serialize};

/// A circle that collides with circles outside its own group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collidable {
    pub radius: f32,
    /// Entities sharing any of these bits never collide with this one.
    pub group: GroupMask,
    /// Position at the end of the previous collision pass.
    pub previous_position: Option<Vec2>,
}

impl Collidable {
    pub fn new(radius: f32, group: impl Into<GroupMask>) -> Self {
        Self {
            radius,
            group: group.into(),
            previous_position: None,
        }
    }

    /// Distance travelled since the previous pass.
    pub fn sweep(&self, position: Vec2) -> f32 {
        self.previous_position
            .map_or(0.0, |previous| previous.distance(position))
    }
}

impl TypeTag for Collidable {
    const TYPE_TAG: &'static str = "lockstep.Collidable";
}

impl Component for Collidable {}

/// A circle moving in a straight line over one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweptCircle {
    pub from: Vec2,
    pub to: Vec2,
    pub radius: f32,
}

impl SweptCircle {
    /// Whether the two circles overlap at any time during the frame, both
    /// moving linearly from `from` to `to`.
    pub fn overlaps(&self, other: &SweptCircle) -> bool {
        let start = other.from - self.from;
        let end = other.to - self.to;
        let motion = end - start;
        let length_sq = motion.length_squared();
        let t = if length_sq > 0.0 {
            (-start.dot(motion) / length_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = start + motion * t;
        let reach = self.radius + other.radius;
        closest.length_squared() <= reach * reach
    }
}
