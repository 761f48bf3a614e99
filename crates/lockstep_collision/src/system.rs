//! Pairwise collision detection as a component pass.

use std::collections::BTreeSet;

use glam::Vec2;
use lockstep_component::Entity;
use lockstep_index::IndexSystem;
use lockstep_math::Transform;
use lockstep_system::{ComponentSystem, Message, SimError, SystemContext, SystemHandle};
use tracing::debug;

use crate::collidable::{Collidable, SweptCircle};

/// Emits [`Message::Collision`] for every pair of collidables in different
/// groups whose swept circles overlap during the frame.
///
/// Candidates come from the [`IndexSystem`], so colliding entities also need
/// an [`Indexed`](lockstep_index::Indexed) component carrying their group.
/// Each pair is tested at most once per frame and reported as
/// `(lower entity, higher entity)`.
#[derive(Debug)]
pub struct CollisionSystem {
    index: SystemHandle<IndexSystem>,
    tested: BTreeSet<(Entity, Entity)>,
    neighbours: BTreeSet<Entity>,
    max_radius: f32,
    max_sweep: f32,
}

impl CollisionSystem {
    pub fn new(index: SystemHandle<IndexSystem>) -> Self {
        Self {
            index,
            tested: BTreeSet::new(),
            neighbours: BTreeSet::new(),
            max_radius: 0.0,
            max_sweep: 0.0,
        }
    }

    /// Pairs tested so far this frame.
    pub fn tested_pairs(&self) -> usize {
        self.tested.len()
    }

    fn swept(ctx: &SystemContext<'_>, entity: Entity) -> Option<SweptCircle> {
        let world = ctx.world();
        let collidable = world.get::<Collidable>(entity)?;
        let position = world.get::<Transform>(entity)?.position;
        Some(SweptCircle {
            from: collidable.previous_position.unwrap_or(position),
            to: position,
            radius: collidable.radius,
        })
    }
}

impl ComponentSystem for CollisionSystem {
    type Component = Collidable;

    fn name(&self) -> &'static str {
        "collision"
    }

    fn begin_pass(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
        self.tested.clear();
        self.max_radius = 0.0;
        self.max_sweep = 0.0;
        let world = ctx.world();
        for (entity, collidable, enabled) in world.store::<Collidable>()?.iter() {
            let Some(transform) = world.get::<Transform>(entity) else {
                continue;
            };
            if enabled {
                self.max_radius = self.max_radius.max(collidable.radius);
                self.max_sweep = self.max_sweep.max(collidable.sweep(transform.position));
            }
        }
        Ok(())
    }

    fn update_component(&mut self, ctx: &mut SystemContext<'_>, entity: Entity) -> Result<(), SimError> {
        let Some(own) = Self::swept(ctx, entity) else {
            return Ok(());
        };
        let Some(group) = ctx.world().get::<Collidable>(entity).map(|c| c.group) else {
            return Ok(());
        };
        let reach = own.radius + self.max_radius + own.from.distance(own.to) + self.max_sweep;

        let mut neighbours = std::mem::take(&mut self.neighbours);
        neighbours.clear();
        ctx.system(self.index)?
            .index()
            .find_radius_into(own.to, reach, !group, &mut neighbours);

        let mut result = Ok(());
        for &other in &neighbours {
            if !ctx.world().is_enabled::<Collidable>(entity) {
                break;
            }
            if other == entity || !ctx.world().is_enabled::<Collidable>(other) {
                continue;
            }
            let pair = (entity.min(other), entity.max(other));
            if !self.tested.insert(pair) {
                continue;
            }
            let (Some(own), Some(theirs)) = (Self::swept(ctx, entity), Self::swept(ctx, other)) else {
                continue;
            };
            if own.overlaps(&theirs) {
                if let Err(err) = ctx.send(Message::Collision {
                    first: pair.0,
                    second: pair.1,
                }) {
                    result = Err(err);
                    break;
                }
            }
        }
        self.neighbours = neighbours;
        result
    }

    fn end_pass(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
        debug!(frame = ctx.frame(), pairs = self.tested.len(), "collision pass done");
        let owners = ctx.world().store::<Collidable>()?.entities();
        for entity in owners {
            let position: Option<Vec2> = ctx.world().get::<Transform>(entity).map(|t| t.position);
            if let (Some(position), Some(collidable)) =
                (position, ctx.world_mut().get_mut::<Collidable>(entity))
            {
                collidable.previous_position = Some(position);
            }
        }
        Ok(())
    }
}
