//! Timeline configuration.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Checkpoints kept for rollback. A command may land at most this many
    /// frames in the past.
    pub history_frames: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { history_frames: 8 }
    }
}
