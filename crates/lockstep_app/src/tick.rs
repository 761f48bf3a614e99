//! Fixed-timestep pacing.

use std::time::Duration;

use lockstep_sync::FramePacer;
use serde::Deserialize;
use tracing::warn;

/// Configuration for every peer's tick loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of frames the server runs (0 = unlimited).
    pub max_ticks: u64,
    /// Fraction of a tick a client stretches or shrinks per frame of drift.
    pub pacing_gain: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            max_ticks: 300,
            pacing_gain: 0.05,
        }
    }
}

impl TickConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(f64::EPSILON))
    }

    pub fn reached_limit(&self, frame: u64) -> bool {
        self.max_ticks > 0 && frame >= self.max_ticks
    }

    pub fn pacer(&self) -> FramePacer {
        FramePacer::new(self.duration(), self.pacing_gain)
    }

    /// Log a frame that took longer than its tick. Returns whether it did.
    pub fn check_budget(&self, frame: u64, elapsed: Duration) -> bool {
        let budget = self.duration();
        if elapsed <= budget {
            return false;
        }
        warn!(
            frame,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "frame exceeded time budget"
        );
        true
    }
}
