//! Data-parallel component passes.

use std::ops::{Deref, DerefMut};

use lockstep_component::{Component, Entity, World};
use lockstep_packet::{Packet, PacketError, WireSink};
use rayon::prelude::*;
use tracing::debug;

use crate::context::SystemContext;
use crate::error::SimError;
use crate::message::Message;
use crate::system::System;

/// A component system whose per-component work only touches its own
/// component.
///
/// Each call sees a read-only world as it was at the start of the pass and
/// mutates a private copy of one component. Messages go to an outbox. The
/// pass writes results back and dispatches outboxes in attachment order once
/// every worker has finished, so the outcome matches a sequential run.
pub trait ParallelSystem: Send + Sync + 'static {
    type Component: Component;

    fn name(&self) -> &'static str;

    fn update_component(
        &self,
        world: &World,
        frame: u64,
        entity: Entity,
        component: &mut Self::Component,
        outbox: &mut Vec<Message>,
    );

    fn receive(&mut self, ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
        let _ = (ctx, message);
        Ok(())
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

/// Adapts a [`ParallelSystem`] into a [`System`] run on the simulation's
/// worker pool.
#[derive(Debug)]
pub struct ParallelPass<S>(S);

impl<S> ParallelPass<S> {
    pub fn new(system: S) -> Self {
        Self(system)
    }
}

impl<S> Deref for ParallelPass<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}

impl<S> DerefMut for ParallelPass<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.0
    }
}

impl<S: ParallelSystem> System for ParallelPass<S> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
        let frame = ctx.frame();
        let mut work: Vec<(Entity, S::Component, Vec<Message>)> = ctx
            .world()
            .store::<S::Component>()?
            .iter()
            .filter(|(_, _, enabled)| *enabled)
            .map(|(entity, component, _)| (entity, component.clone(), Vec::new()))
            .collect();

        let system = &self.0;
        let world = ctx.world();
        ctx.pool().install(|| {
            work.par_iter_mut().for_each(|(entity, component, outbox)| {
                system.update_component(world, frame, *entity, component, outbox);
            });
        });
        debug!(system = self.0.name(), frame, components = work.len(), "parallel pass done");

        let mut outboxes = Vec::with_capacity(work.len());
        for (entity, component, outbox) in work {
            if let Some(slot) = ctx.world_mut().get_mut::<S::Component>(entity) {
                *slot = component;
            }
            outboxes.push(outbox);
        }
        for message in outboxes.into_iter().flatten() {
            ctx.send(message)?;
        }
        Ok(())
    }

    fn receive(&mut self, ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
        self.0.receive(ctx, message)
    }

    fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
        self.0.write_state(sink)
    }

    fn read_state(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
        self.0.read_state(packet)
    }
}
