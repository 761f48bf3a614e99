//! Per-frame execution context handed to systems.

use std::collections::VecDeque;

use lockstep_component::{Component, ComponentHandle, Entity, World};
use lockstep_packet::Packet;
use rayon::ThreadPool;
use tracing::debug;

use crate::error::SimError;
use crate::message::Message;
use crate::system::{System, SystemHandle};

/// A registered system and the messages waiting for it.
///
/// `system` is `None` while the system is busy running its pass or handling a
/// message; anything broadcast in the meantime waits in `pending`.
pub(crate) struct SystemSlot {
    pub(crate) name: &'static str,
    pub(crate) system: Option<Box<dyn System>>,
    pub(crate) pending: VecDeque<Message>,
}

impl SystemSlot {
    pub(crate) fn new(system: Box<dyn System>) -> Self {
        Self {
            name: system.name(),
            system: Some(system),
            pending: VecDeque::new(),
        }
    }
}

/// Everything a system may touch during a pass or a message handler.
///
/// Structural changes made through the context (attach, detach, destroy,
/// spawn from blob) broadcast the matching lifecycle messages before they
/// return.
pub struct SystemContext<'a> {
    frame: u64,
    world: &'a mut World,
    systems: &'a mut [SystemSlot],
    pool: &'a ThreadPool,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        frame: u64,
        world: &'a mut World,
        systems: &'a mut [SystemSlot],
        pool: &'a ThreadPool,
    ) -> Self {
        Self {
            frame,
            world,
            systems,
            pool,
        }
    }

    /// The frame being computed.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn world(&self) -> &World {
        &*self.world
    }

    /// Direct world access. Changes made here broadcast nothing.
    pub fn world_mut(&mut self) -> &mut World {
        &mut *self.world
    }

    pub fn pool(&self) -> &ThreadPool {
        self.pool
    }

    pub fn spawn(&mut self) -> Entity {
        self.world.spawn()
    }

    pub fn attach<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<ComponentHandle, SimError> {
        let handle = self.world.attach(entity, value)?;
        self.send(Message::ComponentAdded {
            entity,
            component: T::component_type_id(),
        })?;
        Ok(handle)
    }

    pub fn detach<T: Component>(&mut self, entity: Entity) -> Result<Option<T>, SimError> {
        let removed = self.world.detach::<T>(entity)?;
        if removed.is_some() {
            self.send(Message::ComponentRemoved {
                entity,
                component: T::component_type_id(),
            })?;
        }
        Ok(removed)
    }

    /// Destroy `entity`, broadcasting a removal per component and then
    /// [`Message::EntityDestroyed`].
    pub fn destroy(&mut self, entity: Entity) -> Result<(), SimError> {
        let removed = self.world.despawn(entity)?;
        debug!(frame = self.frame, %entity, components = removed.len(), "entity destroyed");
        for component in removed {
            self.send(Message::ComponentRemoved { entity, component })?;
        }
        self.send(Message::EntityDestroyed { entity })
    }

    /// Spawn an entity from a blob written by
    /// [`World::write_entity`](lockstep_component::World::write_entity).
    pub fn spawn_from_blob(&mut self, blob: &mut Packet) -> Result<Entity, SimError> {
        let (entity, attached) = self.world.read_entity(blob)?;
        for component in attached {
            self.send(Message::ComponentAdded { entity, component })?;
        }
        Ok(entity)
    }

    /// Borrow another registered system.
    ///
    /// Fails with [`SimError::SystemBusy`] if that system is the caller or is
    /// further up the current call chain.
    pub fn system<S: System>(&mut self, handle: SystemHandle<S>) -> Result<&mut S, SimError> {
        let slot = &mut self.systems[handle.index()];
        let name = slot.name;
        let system = slot.system.as_deref_mut().ok_or(SimError::SystemBusy(name))?;
        system
            .as_any_mut()
            .downcast_mut::<S>()
            .ok_or(SimError::SystemTypeMismatch(name))
    }

    /// Broadcast `message` to every system in registration order.
    ///
    /// Busy systems get the message when they become idle, in send order.
    pub fn send(&mut self, message: Message) -> Result<(), SimError> {
        for index in 0..self.systems.len() {
            self.systems[index].pending.push_back(message.clone());
            self.drain(index)?;
        }
        Ok(())
    }

    /// Run the pass of the system at `index`, then deliver what queued up for
    /// it meanwhile.
    pub(crate) fn run_update(&mut self, index: usize) -> Result<(), SimError> {
        let slot = &mut self.systems[index];
        let mut system = slot.system.take().ok_or(SimError::SystemBusy(slot.name))?;
        let result = system.update(self);
        self.systems[index].system = Some(system);
        result?;
        self.drain(index)
    }

    fn drain(&mut self, index: usize) -> Result<(), SimError> {
        loop {
            let slot = &mut self.systems[index];
            let Some(mut system) = slot.system.take() else {
                return Ok(());
            };
            let Some(message) = slot.pending.pop_front() else {
                slot.system = Some(system);
                return Ok(());
            };
            let result = system.receive(self, &message);
            self.systems[index].system = Some(system);
            result?;
        }
    }
}
