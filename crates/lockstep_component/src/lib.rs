//! # lockstep_component
//!
//! Entities, components and the world that stores them.
//!
//! This crate provides:
//!
//! - [`Component`] trait and [`ComponentTypeId`]: stable per-type identity.
//! - [`Entity`] / [`EntityAllocator`]: generational entity ids.
//! - [`ComponentStore`]: per-type storage iterated in attachment order, with
//!   generational [`ComponentHandle`]s.
//! - [`World`]: all stores plus the allocator, with snapshot and entity-blob
//!   serialization.

pub mod component;
pub mod entity;
pub mod error;
pub mod store;
pub mod world;

pub use component::{Component, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use error::ComponentError;
pub use store::{AnyStore, ComponentHandle, ComponentStore};
pub use world::{World, WorldState};
