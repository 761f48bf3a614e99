//! Spatial-index configuration.

use glam::Vec2;
use lockstep_math::Rect;
use serde::Deserialize;

/// Shape of every tree in a [`SpatialIndex`](crate::SpatialIndex).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Root bounds. Entries outside stay at the root node.
    pub bounds: Rect,
    /// A node splits once it holds more entries than this.
    pub split_threshold: usize,
    /// Nodes whose side is at or below this never split.
    pub min_node_size: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bounds: Rect::new(Vec2::splat(-1024.0), Vec2::splat(1024.0)),
            split_threshold: 8,
            min_node_size: 16.0,
        }
    }
}
