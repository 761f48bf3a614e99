//! World state storage.
//!
//! The [`World`] holds the entity allocator and one [`ComponentStore`] per
//! registered component type. It is the single source of truth for
//! simulation data; systems reach it through the simulation context.

use std::collections::HashMap;

use lockstep_packet::{Packet, PacketError, WireSink, encode_into};
use tracing::debug;

use crate::component::{Component, ComponentTypeId};
use crate::entity::{Entity, EntityAllocator};
use crate::error::ComponentError;
use crate::store::{AnyStore, ComponentHandle, ComponentStore};

#[derive(Default)]
pub struct World {
    allocator: EntityAllocator,
    /// Stores in registration order. Snapshots and hashes walk this order.
    stores: Vec<Box<dyn AnyStore>>,
    by_type: HashMap<ComponentTypeId, usize>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.allocator.count())
            .field(
                "stores",
                &self.stores.iter().map(|s| s.type_tag()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type. Registration order is part of the snapshot
    /// layout, so every peer must register the same types in the same order.
    pub fn register<T: Component>(&mut self) -> Result<(), ComponentError> {
        let type_id = T::component_type_id();
        if self.by_type.contains_key(&type_id) {
            return Err(ComponentError::AlreadyRegistered(T::TYPE_TAG));
        }
        debug!(component = T::TYPE_TAG, "registered component type");
        self.by_type.insert(type_id, self.stores.len());
        self.stores.push(Box::new(ComponentStore::<T>::new()));
        Ok(())
    }

    pub fn is_registered<T: Component>(&self) -> bool {
        self.by_type.contains_key(&T::component_type_id())
    }

    /// Typed access to the store for `T`.
    pub fn store<T: Component>(&self) -> Result<&ComponentStore<T>, ComponentError> {
        self.by_type
            .get(&T::component_type_id())
            .and_then(|&i| self.stores[i].as_any().downcast_ref::<ComponentStore<T>>())
            .ok_or_else(|| ComponentError::UnregisteredType(T::TYPE_TAG.to_string()))
    }

    pub fn store_mut<T: Component>(&mut self) -> Result<&mut ComponentStore<T>, ComponentError> {
        match self.by_type.get(&T::component_type_id()) {
            Some(&i) => self.stores[i]
                .as_any_mut()
                .downcast_mut::<ComponentStore<T>>()
                .ok_or_else(|| ComponentError::UnregisteredType(T::TYPE_TAG.to_string())),
            None => Err(ComponentError::UnregisteredType(T::TYPE_TAG.to_string())),
        }
    }

    pub fn spawn(&mut self) -> Entity {
        self.allocator.allocate()
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.count()
    }

    /// Live entities in ascending order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.allocator.iter()
    }

    pub fn attach<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<ComponentHandle, ComponentError> {
        if !self.allocator.is_alive(entity) {
            return Err(ComponentError::EntityNotAlive(entity));
        }
        self.store_mut::<T>()?.insert(entity, value)
    }

    /// Detach the `T` of `entity`. `Ok(None)` if it had none.
    pub fn detach<T: Component>(&mut self, entity: Entity) -> Result<Option<T>, ComponentError> {
        Ok(self.store_mut::<T>()?.remove(entity))
    }

    /// The `T` of `entity`. `None` if it has none or `T` is not registered.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.store::<T>().ok()?.get(entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.store_mut::<T>().ok()?.get_mut(entity)
    }

    /// Whether `entity` has an enabled `T`.
    pub fn is_enabled<T: Component>(&self, entity: Entity) -> bool {
        self.store::<T>()
            .ok()
            .and_then(|store| store.is_enabled(entity))
            .unwrap_or(false)
    }

    /// Returns the previous flag, or `None` if the entity has no `T`.
    pub fn set_enabled<T: Component>(&mut self, entity: Entity, enabled: bool) -> Option<bool> {
        self.store_mut::<T>().ok()?.set_enabled(entity, enabled)
    }

    /// Type ids of the components attached to `entity`, in registration
    /// order.
    pub fn components_of(&self, entity: Entity) -> Vec<ComponentTypeId> {
        self.stores
            .iter()
            .filter(|store| store.contains(entity))
            .map(|store| store.component_type_id())
            .collect()
    }

    pub fn component_count(&self, type_id: ComponentTypeId) -> usize {
        self.by_type
            .get(&type_id)
            .map_or(0, |&i| self.stores[i].len())
    }

    /// Destroy `entity` and every component it owns.
    ///
    /// Returns the removed component types in registration order.
    pub fn despawn(&mut self, entity: Entity) -> Result<Vec<ComponentTypeId>, ComponentError> {
        if !self.allocator.is_alive(entity) {
            return Err(ComponentError::EntityNotAlive(entity));
        }
        let mut removed = Vec::new();
        for store in &mut self.stores {
            if store.remove_entity(entity) {
                removed.push(store.component_type_id());
            }
        }
        self.allocator.free(entity);
        Ok(removed)
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Write the allocator and every store, in registration order.
    ///
    /// The same stream feeds both snapshots and the state hash.
    pub fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
        encode_into(&mut *sink, &self.allocator)?;
        sink.write_len(self.stores.len())?;
        for store in &self.stores {
            sink.write_string(Some(store.type_tag()))?;
            store.write_state(&mut *sink)?;
        }
        Ok(())
    }

    /// Replace all entities and components with a state written by
    /// [`World::write_state`]. On error the world is left untouched.
    pub fn read_state(&mut self, packet: &mut Packet) -> Result<(), ComponentError> {
        let state = self.stage_state(packet)?;
        self.commit_state(state);
        Ok(())
    }

    /// Read and validate a state written by [`World::write_state`] into fresh
    /// stores, without touching this world.
    ///
    /// # Errors
    ///
    /// Fails on any malformed input: a short buffer, a broken allocator, a
    /// store layout that differs from this world's registrations, or a
    /// component owned by a dead entity.
    pub fn stage_state(&self, packet: &mut Packet) -> Result<WorldState, ComponentError> {
        let allocator: EntityAllocator = packet.read()?;
        allocator.validate()?;
        let count = packet.read_len()?.ok_or(PacketError::UnexpectedNull)?;
        if count != self.stores.len() {
            return Err(ComponentError::StoreCountMismatch {
                expected: self.stores.len(),
                found: count,
            });
        }
        let mut stores = Vec::with_capacity(count);
        for store in &self.stores {
            let tag = packet.read_string()?.ok_or(PacketError::UnexpectedNull)?;
            if tag != store.type_tag() {
                return Err(PacketError::TypeTagMismatch {
                    expected: store.type_tag().to_string(),
                    found: tag,
                }
                .into());
            }
            let mut staged = store.fresh();
            staged.read_state(packet)?;
            if let Some(dead) = staged.owners().into_iter().find(|&e| !allocator.is_alive(e)) {
                return Err(ComponentError::EntityNotAlive(dead));
            }
            stores.push(staged);
        }
        Ok(WorldState { allocator, stores })
    }

    /// Swap in a state produced by [`World::stage_state`] on this world.
    pub fn commit_state(&mut self, state: WorldState) {
        self.allocator = state.allocator;
        self.stores = state.stores;
    }

    /// Write one entity's components as a self-describing blob: a count,
    /// then per component its type tag, enabled flag and value.
    pub fn write_entity(&self, entity: Entity, sink: &mut dyn WireSink) -> Result<(), ComponentError> {
        if !self.allocator.is_alive(entity) {
            return Err(ComponentError::EntityNotAlive(entity));
        }
        let owned: Vec<&dyn AnyStore> = self
            .stores
            .iter()
            .map(|store| store.as_ref())
            .filter(|store| store.contains(entity))
            .collect();
        sink.write_len(owned.len())?;
        for store in owned {
            sink.write_string(Some(store.type_tag()))?;
            store.write_one(entity, &mut *sink)?;
        }
        Ok(())
    }

    /// Spawn a new entity from a blob written by [`World::write_entity`].
    ///
    /// Returns the entity and the attached component types in blob order. On
    /// error the half-built entity is destroyed again.
    pub fn read_entity(
        &mut self,
        packet: &mut Packet,
    ) -> Result<(Entity, Vec<ComponentTypeId>), ComponentError> {
        let entity = self.allocator.allocate();
        match self.read_entity_into(entity, packet) {
            Ok(attached) => Ok((entity, attached)),
            Err(err) => {
                for store in &mut self.stores {
                    store.remove_entity(entity);
                }
                self.allocator.free(entity);
                Err(err)
            }
        }
    }

    fn read_entity_into(
        &mut self,
        entity: Entity,
        packet: &mut Packet,
    ) -> Result<Vec<ComponentTypeId>, ComponentError> {
        let count = packet.read_len()?.ok_or(PacketError::UnexpectedNull)?;
        let mut attached = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = packet.read_string()?.ok_or(PacketError::UnexpectedNull)?;
            let index = *self
                .by_type
                .get(&ComponentTypeId::from_name(&tag))
                .ok_or(ComponentError::UnregisteredType(tag))?;
            let store = &mut self.stores[index];
            store.read_one(entity, packet)?;
            attached.push(store.component_type_id());
        }
        Ok(attached)
    }
}

/// A validated world state waiting to replace the live one.
pub struct WorldState {
    allocator: EntityAllocator,
    stores: Vec<Box<dyn AnyStore>>,
}

impl std::fmt::Debug for WorldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldState")
            .field("entities", &self.allocator.count())
            .field("stores", &self.stores.len())
            .finish()
    }
}
