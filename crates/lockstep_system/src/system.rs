//! The [`System`] trait and its per-component adapters.

use std::any::Any;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use lockstep_component::{Component, ComponentTypeId, Entity, World};
use lockstep_packet::{Packet, PacketError, WireSink};

use crate::context::SystemContext;
use crate::error::SimError;
use crate::message::Message;

/// Upcast to [`Any`] so the manager can hand out typed references.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of per-frame behaviour, or a service other systems query.
///
/// Every hook except [`System::name`] has a no-op default.
pub trait System: AsAny + Send {
    fn name(&self) -> &'static str;

    /// Run this system's pass for the current frame.
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
        let _ = ctx;
        Ok(())
    }

    /// Handle a broadcast message.
    fn receive(&mut self, ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
        let _ = (ctx, message);
        Ok(())
    }

    /// Read-only visit for renderers.
    fn draw(&self, world: &World) {
        let _ = world;
    }

    /// Write state that lives outside the world's components.
    fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
        let _ = sink;
        Ok(())
    }

    fn read_state(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
        let _ = packet;
        Ok(())
    }
}

/// Typed reference to a registered system, handed to dependants at
/// construction.
pub struct SystemHandle<S> {
    index: usize,
    _marker: PhantomData<fn() -> S>,
}

impl<S> SystemHandle<S> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Position in registration order.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<S> Clone for SystemHandle<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for SystemHandle<S> {}

impl<S> std::fmt::Debug for SystemHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SystemHandle").field(&self.index).finish()
    }
}

/// A system that processes every enabled component of one type.
///
/// Wrapped in a [`ComponentPass`] at registration. The pass visits owners in
/// attachment order and skips any component disabled or removed earlier in
/// the same pass.
pub trait ComponentSystem: Send + 'static {
    type Component: Component;

    fn name(&self) -> &'static str;

    fn update_component(&mut self, ctx: &mut SystemContext<'_>, entity: Entity) -> Result<(), SimError>;

    fn begin_pass(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
        let _ = ctx;
        Ok(())
    }

    fn end_pass(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
        let _ = ctx;
        Ok(())
    }

    fn on_component_added(&mut self, ctx: &mut SystemContext<'_>, entity: Entity) -> Result<(), SimError> {
        let _ = (ctx, entity);
        Ok(())
    }

    fn on_component_removed(&mut self, ctx: &mut SystemContext<'_>, entity: Entity) -> Result<(), SimError> {
        let _ = (ctx, entity);
        Ok(())
    }

    /// Messages other than this type's add/remove notifications.
    fn receive(&mut self, ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
        let _ = (ctx, message);
        Ok(())
    }

    fn draw(&self, world: &World) {
        let _ = world;
    }

    fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
        let _ = sink;
        Ok(())
    }

    fn read_state(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
        let _ = packet;
        Ok(())
    }
}

/// Adapts a [`ComponentSystem`] into a [`System`].
#[derive(Debug)]
pub struct ComponentPass<S>(S);

impl<S> ComponentPass<S> {
    pub fn new(system: S) -> Self {
        Self(system)
    }

    pub fn into_inner(self) -> S {
        self.0
    }
}

impl<S> Deref for ComponentPass<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}

impl<S> DerefMut for ComponentPass<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.0
    }
}

impl<S: ComponentSystem> System for ComponentPass<S> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
        self.0.begin_pass(ctx)?;
        let owners = ctx.world().store::<S::Component>()?.entities();
        for entity in owners {
            if ctx.world().is_enabled::<S::Component>(entity) {
                self.0.update_component(ctx, entity)?;
            }
        }
        self.0.end_pass(ctx)
    }

    fn receive(&mut self, ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
        let own = ComponentTypeId::of::<S::Component>();
        match *message {
            Message::ComponentAdded { entity, component } if component == own => {
                self.0.on_component_added(ctx, entity)
            }
            Message::ComponentRemoved { entity, component } if component == own => {
                self.0.on_component_removed(ctx, entity)
            }
            _ => self.0.receive(ctx, message),
        }
    }

    fn draw(&self, world: &World) {
        self.0.draw(world);
    }

    fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
        self.0.write_state(sink)
    }

    fn read_state(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
        self.0.read_state(packet)
    }
}
