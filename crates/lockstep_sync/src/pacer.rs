//! Frame pacing from remote clocks.

use std::time::Duration;

use tracing::trace;

/// Stretches or shrinks the local tick so this peer drifts toward the
/// clocks reported in [`Synchronize`](crate::Synchronize) commands.
///
/// Pacing never touches simulation state; it only decides how long to wait
/// before the next frame.
#[derive(Debug, Clone)]
pub struct FramePacer {
    base: Duration,
    gain: f64,
    max_adjust: f64,
    drift: f64,
}

impl FramePacer {
    /// `gain` is the fractional tick change per frame of drift; the total
    /// change is capped at half a tick either way.
    pub fn new(base: Duration, gain: f64) -> Self {
        Self {
            base,
            gain,
            max_adjust: 0.5,
            drift: 0.0,
        }
    }

    /// Record a remote clock against the local frame. Positive drift means
    /// the remote is ahead.
    pub fn observe(&mut self, local_frame: u64, remote_clock: u64) {
        let drift = remote_clock as f64 - local_frame as f64;
        // Exponential smoothing keeps one late packet from jerking the pace.
        self.drift = 0.75 * self.drift + 0.25 * drift;
        trace!(local_frame, remote_clock, drift = self.drift, "pacer observed clock");
    }

    pub fn drift(&self) -> f64 {
        self.drift
    }

    /// How long the next tick should take.
    pub fn tick_duration(&self) -> Duration {
        let adjust = (self.gain * self.drift).clamp(-self.max_adjust, self.max_adjust);
        if adjust == 0.0 {
            return self.base;
        }
        self.base.mul_f64(1.0 - adjust)
    }

    pub fn reset(&mut self) {
        self.drift = 0.0;
    }
}
