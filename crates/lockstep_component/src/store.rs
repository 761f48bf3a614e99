//! Dense per-type component storage.
//!
//! A [`ComponentStore`] keeps components of one type in generational slots.
//! Iteration follows attachment order and stays stable when components are
//! removed; lookups by entity or by [`ComponentHandle`] are O(1).

use std::any::Any;
use std::collections::HashMap;

use lockstep_packet::{Packet, PacketError, WireSink, encode_into};

use crate::component::{Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::ComponentError;

/// A generational reference to one stored component.
///
/// A handle that outlives its component resolves to `None`, even after the
/// slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    entity: Entity,
    enabled: bool,
    value: T,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

#[derive(Debug, Clone)]
pub struct ComponentStore<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    /// Occupied slot indices in attachment order.
    order: Vec<u32>,
    by_entity: HashMap<Entity, u32>,
}

impl<T> Default for ComponentStore<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            by_entity: HashMap::new(),
        }
    }
}

impl<T: Component> ComponentStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `value` to `entity`, enabled.
    pub fn insert(&mut self, entity: Entity, value: T) -> Result<ComponentHandle, ComponentError> {
        if self.by_entity.contains_key(&entity) {
            return Err(ComponentError::AlreadyAttached {
                entity,
                component: T::TYPE_TAG,
            });
        }
        let entry = Entry {
            entity,
            enabled: true,
            value,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.order.push(index);
        self.by_entity.insert(entity, index);
        Ok(ComponentHandle {
            index,
            generation: self.slots[index as usize].generation,
        })
    }

    /// Detach and return the component of `entity`, if any.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let index = self.by_entity.remove(&entity)?;
        if let Some(pos) = self.order.iter().position(|&i| i == index) {
            self.order.remove(pos);
        }
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        slot.entry.take().map(|entry| entry.value)
    }

    fn entry(&self, entity: Entity) -> Option<&Entry<T>> {
        let index = *self.by_entity.get(&entity)?;
        self.slots[index as usize].entry.as_ref()
    }

    fn entry_mut(&mut self, entity: Entity) -> Option<&mut Entry<T>> {
        let index = *self.by_entity.get(&entity)?;
        self.slots[index as usize].entry.as_mut()
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.entry(entity).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.entry_mut(entity).map(|entry| &mut entry.value)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.by_entity.contains_key(&entity)
    }

    pub fn handle_of(&self, entity: Entity) -> Option<ComponentHandle> {
        let index = *self.by_entity.get(&entity)?;
        Some(ComponentHandle {
            index,
            generation: self.slots[index as usize].generation,
        })
    }

    pub fn resolve(&self, handle: ComponentHandle) -> Option<(Entity, &T)> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref().map(|entry| (entry.entity, &entry.value))
    }

    pub fn resolve_mut(&mut self, handle: ComponentHandle) -> Option<(Entity, &mut T)> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry
            .as_mut()
            .map(|entry| (entry.entity, &mut entry.value))
    }

    /// `None` when the entity has no component of this type.
    pub fn is_enabled(&self, entity: Entity) -> Option<bool> {
        self.entry(entity).map(|entry| entry.enabled)
    }

    /// Returns the previous flag, or `None` if there is no component.
    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) -> Option<bool> {
        self.entry_mut(entity)
            .map(|entry| std::mem::replace(&mut entry.enabled, enabled))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Owners in attachment order.
    pub fn entities(&self) -> Vec<Entity> {
        self.iter().map(|(entity, _, _)| entity).collect()
    }

    /// `(entity, component, enabled)` in attachment order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T, bool)> + '_ {
        self.order.iter().filter_map(move |&index| {
            self.slots[index as usize]
                .entry
                .as_ref()
                .map(|entry| (entry.entity, &entry.value, entry.enabled))
        })
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.order.clear();
        self.by_entity.clear();
    }
}

/// Type-erased access to a [`ComponentStore`], used by the world for
/// cascading removal and for snapshots.
pub trait AnyStore: Send + Sync {
    fn type_tag(&self) -> &'static str;
    fn component_type_id(&self) -> ComponentTypeId;
    fn len(&self) -> usize;
    fn contains(&self, entity: Entity) -> bool;
    fn remove_entity(&mut self, entity: Entity) -> bool;

    /// Owners in attachment order.
    fn owners(&self) -> Vec<Entity>;

    /// An empty store of the same component type.
    fn fresh(&self) -> Box<dyn AnyStore>;

    /// Count, then `(entity, enabled, value)` per component in attachment
    /// order.
    fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError>;

    /// Replace the contents with a state written by
    /// [`AnyStore::write_state`].
    fn read_state(&mut self, packet: &mut Packet) -> Result<(), ComponentError>;

    /// `enabled` then value for one entity. Writes nothing and returns
    /// `false` if the entity has no component here.
    fn write_one(&self, entity: Entity, sink: &mut dyn WireSink) -> Result<bool, PacketError>;

    /// Read an `enabled` flag and value written by [`AnyStore::write_one`]
    /// and attach it to `entity`.
    fn read_one(&mut self, entity: Entity, packet: &mut Packet) -> Result<(), ComponentError>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> AnyStore for ComponentStore<T> {
    fn type_tag(&self) -> &'static str {
        T::TYPE_TAG
    }

    fn component_type_id(&self) -> ComponentTypeId {
        T::component_type_id()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.by_entity.contains_key(&entity)
    }

    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn owners(&self) -> Vec<Entity> {
        self.entities()
    }

    fn fresh(&self) -> Box<dyn AnyStore> {
        Box::new(Self::new())
    }

    fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
        sink.write_len(self.order.len())?;
        for (entity, value, enabled) in self.iter() {
            encode_into(&mut *sink, &entity)?;
            sink.write_bool(enabled);
            encode_into(&mut *sink, value)?;
        }
        Ok(())
    }

    fn read_state(&mut self, packet: &mut Packet) -> Result<(), ComponentError> {
        let count = packet.read_len()?.ok_or(PacketError::UnexpectedNull)?;
        self.clear();
        for _ in 0..count {
            let entity: Entity = packet.read()?;
            let enabled = packet.read_bool()?;
            let value: T = packet.read()?;
            self.insert(entity, value)?;
            self.set_enabled(entity, enabled);
        }
        Ok(())
    }

    fn write_one(&self, entity: Entity, sink: &mut dyn WireSink) -> Result<bool, PacketError> {
        let Some(entry) = self.entry(entity) else {
            return Ok(false);
        };
        sink.write_bool(entry.enabled);
        encode_into(&mut *sink, &entry.value)?;
        Ok(true)
    }

    fn read_one(&mut self, entity: Entity, packet: &mut Packet) -> Result<(), ComponentError> {
        let enabled = packet.read_bool()?;
        let value: T = packet.read()?;
        self.insert(entity, value)?;
        self.set_enabled(entity, enabled);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use lockstep_packet::TypeTag;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Fuel(u32);

    impl TypeTag for Fuel {
        const TYPE_TAG: &'static str = "test.Fuel";
    }

    impl Component for Fuel {}

    fn e(index: u32) -> Entity {
        Entity::new(index, 0)
    }

    #[test]
    fn test_iteration_follows_attachment_order() {
        let mut store = ComponentStore::new();
        store.insert(e(5), Fuel(5)).unwrap();
        store.insert(e(1), Fuel(1)).unwrap();
        store.insert(e(3), Fuel(3)).unwrap();
        assert_eq!(store.entities(), vec![e(5), e(1), e(3)]);
    }

    #[test]
    fn test_removal_keeps_order_and_reuses_slot_at_end() {
        let mut store = ComponentStore::new();
        store.insert(e(0), Fuel(0)).unwrap();
        store.insert(e(1), Fuel(1)).unwrap();
        store.insert(e(2), Fuel(2)).unwrap();
        assert_eq!(store.remove(e(0)), Some(Fuel(0)));
        store.insert(e(9), Fuel(9)).unwrap();
        assert_eq!(store.entities(), vec![e(1), e(2), e(9)]);
    }

    #[test]
    fn test_stale_handle_resolves_to_none() {
        let mut store = ComponentStore::new();
        let old = store.insert(e(0), Fuel(10)).unwrap();
        store.remove(e(0));
        let new = store.insert(e(1), Fuel(20)).unwrap();
        assert!(store.resolve(old).is_none());
        assert_eq!(store.resolve(new), Some((e(1), &Fuel(20))));
    }

    #[test]
    fn test_duplicate_attach_rejected() {
        let mut store = ComponentStore::new();
        store.insert(e(0), Fuel(1)).unwrap();
        assert!(matches!(
            store.insert(e(0), Fuel(2)),
            Err(ComponentError::AlreadyAttached { .. })
        ));
    }

    #[test]
    fn test_enable_flag() {
        let mut store = ComponentStore::new();
        store.insert(e(0), Fuel(1)).unwrap();
        assert_eq!(store.is_enabled(e(0)), Some(true));
        assert_eq!(store.set_enabled(e(0), false), Some(true));
        assert_eq!(store.is_enabled(e(0)), Some(false));
        assert_eq!(store.is_enabled(e(1)), None);
    }

    #[test]
    fn test_state_round_trip_keeps_order_and_flags() {
        let mut store = ComponentStore::new();
        store.insert(e(4), Fuel(40)).unwrap();
        store.insert(e(2), Fuel(20)).unwrap();
        store.set_enabled(e(2), false);

        let mut packet = Packet::new();
        store.write_state(&mut packet).unwrap();

        let mut restored = ComponentStore::<Fuel>::new();
        restored.insert(e(7), Fuel(7)).unwrap();
        restored.read_state(&mut packet).unwrap();
        assert_eq!(restored.entities(), vec![e(4), e(2)]);
        assert_eq!(restored.get(e(2)), Some(&Fuel(20)));
        assert_eq!(restored.is_enabled(e(2)), Some(false));
        assert!(!restored.contains(e(7)));
    }
}
