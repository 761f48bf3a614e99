//! # lockstep_index
//!
//! Spatial queries for the lockstep simulation.
//!
//! - [`GroupRegistry`] hands out up to 64 named [`GroupId`] bits; a
//!   [`GroupMask`] selects any combination of them.
//! - [`SpatialIndex`] keeps one bucketed quad tree per group and answers
//!   radius and rectangle queries in ascending entity order.
//! - [`IndexSystem`] is the service system that keeps the index in step with
//!   [`Indexed`] entities.
//!
//! ```rust,no_run
//! use lockstep_index::{GroupRegistry, SpatialIndex};
//! use lockstep_component::Entity;
//! use lockstep_math::{Rect, Vec2};
//!
//! let mut groups = GroupRegistry::new();
//! let units = groups.allocate("units").unwrap().mask();
//! let mut index = SpatialIndex::default();
//! index.add(Rect::from_center_radius(Vec2::ZERO, 1.0), Entity::new(0, 0), units);
//! let near = index.find_radius(Vec2::ZERO, 5.0, units);
//! ```

pub mod config;
pub mod error;
pub mod group;
mod quadtree;
pub mod spatial;
pub mod system;

pub use config::IndexConfig;
pub use error::IndexError;
pub use group::{GroupId, GroupMask, GroupRegistry, MAX_GROUPS};
pub use spatial::SpatialIndex;
pub use system::{IndexSystem, Indexed};
