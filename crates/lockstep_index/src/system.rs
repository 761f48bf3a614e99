//! The index as a service system.

use std::collections::BTreeMap;

use glam::Vec2;
use lockstep_component::{Component, ComponentTypeId, Entity, World};
use lockstep_math::{Rect, Transform};
use lockstep_packet::TypeTag;
use lockstep_system::{Message, SimError, System, SystemContext};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::IndexConfig;
use crate::group::GroupMask;
use crate::spatial::SpatialIndex;

/// Puts an entity with a [`Transform`] into the spatial index.
///
/// Group membership is read when the entity enters the index; changing
/// `groups` afterwards has no effect until the component is re-attached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Indexed {
    pub groups: GroupMask,
    /// Half-extent of the indexed square around the position.
    pub radius: f32,
}

impl Indexed {
    pub fn new(groups: impl Into<GroupMask>, radius: f32) -> Self {
        Self {
            groups: groups.into(),
            radius,
        }
    }

    fn bounds(&self, position: Vec2) -> Rect {
        Rect::from_center_radius(position, self.radius)
    }
}

impl TypeTag for Indexed {
    const TYPE_TAG: &'static str = "lockstep.Indexed";
}

impl Component for Indexed {}

/// Keeps a [`SpatialIndex`] in step with every entity that has both an
/// [`Indexed`] and a [`Transform`].
///
/// The index is derived state: it is not part of snapshots and is rebuilt
/// from the world on [`Message::Restored`]. Register it before any system
/// that queries it during its own pass.
#[derive(Debug)]
pub struct IndexSystem {
    index: SpatialIndex,
    members: BTreeMap<Entity, GroupMask>,
}

impl IndexSystem {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            index: SpatialIndex::new(config),
            members: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn is_member(&self, entity: Entity) -> bool {
        self.members.contains_key(&entity)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn admit(&mut self, world: &World, entity: Entity) {
        if self.members.contains_key(&entity) {
            return;
        }
        let (Some(indexed), Some(transform)) =
            (world.get::<Indexed>(entity), world.get::<Transform>(entity))
        else {
            return;
        };
        trace!(%entity, groups = indexed.groups.0, "indexing entity");
        self.index
            .add(indexed.bounds(transform.position), entity, indexed.groups);
        self.members.insert(entity, indexed.groups);
    }

    fn evict(&mut self, entity: Entity) {
        if let Some(groups) = self.members.remove(&entity) {
            trace!(%entity, "removing entity from index");
            self.index.remove(entity, groups);
        }
    }

    fn rebuild(&mut self, world: &World) -> Result<(), SimError> {
        self.index.clear();
        self.members.clear();
        let owners = world.store::<Indexed>()?.entities();
        for entity in owners {
            self.admit(world, entity);
        }
        debug!(members = self.members.len(), "index rebuilt");
        Ok(())
    }
}

impl Default for IndexSystem {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl System for IndexSystem {
    fn name(&self) -> &'static str {
        "index"
    }

    fn update(&mut self, _ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
        self.index.reset_query_count();
        Ok(())
    }

    fn receive(&mut self, ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
        let tracked = [
            ComponentTypeId::of::<Indexed>(),
            ComponentTypeId::of::<Transform>(),
        ];
        match *message {
            Message::ComponentAdded { entity, component } if tracked.contains(&component) => {
                self.admit(ctx.world(), entity);
            }
            Message::ComponentRemoved { entity, component } if tracked.contains(&component) => {
                self.evict(entity);
            }
            Message::Moved {
                entity,
                position,
                velocity,
            } => {
                if let (Some(&groups), Some(indexed)) =
                    (self.members.get(&entity), ctx.world().get::<Indexed>(entity))
                {
                    self.index
                        .update(indexed.bounds(position), velocity, entity, groups);
                }
            }
            Message::Restored => self.rebuild(ctx.world())?,
            _ => {}
        }
        Ok(())
    }
}
