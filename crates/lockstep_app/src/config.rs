//! Demo configuration, loaded from an optional JSON file.

use std::path::Path;

use anyhow::{Context, Result};
use lockstep_index::IndexConfig;
use lockstep_sync::TimelineConfig;
use lockstep_system::SimulationConfig;
use serde::Deserialize;

use crate::tick::TickConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tick: TickConfig,
    pub simulation: SimulationConfig,
    pub index: IndexConfig,
    pub timeline: TimelineConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub clients: usize,
    /// Ships in the scene, one per player id starting at 1.
    pub players: u32,
    /// The server broadcasts its hash every this many frames.
    pub sync_interval: u64,
    /// Scripted commands are issued this many frames ahead.
    pub input_delay: u64,
    /// Client that nudges one transform at `desync_frame`.
    pub desync_client: Option<usize>,
    pub desync_frame: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clients: 2,
            players: 3,
            sync_interval: 10,
            input_delay: 4,
            desync_client: Some(0),
            desync_frame: Some(60),
        }
    }
}

impl AppConfig {
    /// Read `path` as JSON, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
