//! # lockstep_system
//!
//! The frame-by-frame system manager for the lockstep simulation.
//!
//! This crate provides:
//!
//! - [`System`]: the per-frame behaviour trait, plus [`ComponentSystem`] and
//!   [`ParallelSystem`] for systems that walk one component type.
//! - [`Simulation`]: ordered registration, `update`/`draw` passes, and
//!   whole-state snapshots and hashes.
//! - [`SystemContext`]: world access and the synchronous [`Message`] bus.
//! - [`MotionSystem`]: parallel velocity integration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lockstep_math::{Transform, Velocity};
//! use lockstep_system::{MotionSystem, Simulation, SimulationConfig};
//!
//! let mut sim = Simulation::new(&SimulationConfig::default()).unwrap();
//! sim.world_mut().register::<Transform>().unwrap();
//! sim.world_mut().register::<Velocity>().unwrap();
//! sim.register_parallel_system(MotionSystem).unwrap();
//! sim.update().unwrap();
//! let hash = sim.state_hash().unwrap();
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod motion;
pub mod parallel;
pub mod simulation;
pub mod system;

pub use config::SimulationConfig;
pub use context::SystemContext;
pub use error::SimError;
pub use message::Message;
pub use motion::MotionSystem;
pub use parallel::{ParallelPass, ParallelSystem};
pub use simulation::Simulation;
pub use system::{AsAny, ComponentPass, ComponentSystem, System, SystemHandle};
