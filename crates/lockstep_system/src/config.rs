//! Simulation configuration.

use serde::Deserialize;

/// Configuration for a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Upper bound on worker threads for parallel passes.
    pub worker_threads: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { worker_threads: 4 }
    }
}

impl SimulationConfig {
    #[must_use]
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Configured threads, capped by the machine's parallelism and never
    /// below one.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        let available = std::thread::available_parallelism().map_or(1, |n| n.get());
        self.worker_threads.clamp(1, available.max(1))
    }
}
