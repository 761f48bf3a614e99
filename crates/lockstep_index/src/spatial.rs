//! Group-masked spatial index.

use std::collections::BTreeSet;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec2;
use lockstep_component::Entity;
use lockstep_math::Rect;
use tracing::trace;

use crate::config::IndexConfig;
use crate::group::{GroupMask, MAX_GROUPS};
use crate::quadtree::QuadTree;

/// One quad tree per group bit, created on first use.
///
/// An entity added under a mask lives in every tree whose bit is set.
/// Queries union the trees selected by the query mask, so an entity found in
/// several of them is still reported once.
#[derive(Debug)]
pub struct SpatialIndex {
    config: IndexConfig,
    trees: Vec<Option<QuadTree>>,
    #[cfg(debug_assertions)]
    queries: AtomicUsize,
}

impl SpatialIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            trees: (0..MAX_GROUPS).map(|_| None).collect(),
            #[cfg(debug_assertions)]
            queries: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Create the trees for every bit of `groups` that has none yet.
    pub fn ensure_group(&mut self, groups: GroupMask) {
        for bit in groups.bits() {
            if self.trees[bit].is_none() {
                trace!(group = bit, "creating index tree");
                self.trees[bit] = Some(QuadTree::new(&self.config));
            }
        }
    }

    pub fn add(&mut self, bounds: Rect, entity: Entity, groups: GroupMask) {
        self.ensure_group(groups);
        for tree in self.selected_mut(groups) {
            tree.insert(bounds, entity);
        }
    }

    pub fn remove(&mut self, entity: Entity, groups: GroupMask) {
        for tree in self.selected_mut(groups) {
            tree.remove(entity);
        }
    }

    /// Move `entity` to `bounds` swept back along `velocity_hint`, so the
    /// stored rectangle covers the whole path travelled this frame.
    pub fn update(&mut self, bounds: Rect, velocity_hint: Vec2, entity: Entity, groups: GroupMask) {
        let swept = bounds.union(&bounds.translated(-velocity_hint));
        self.ensure_group(groups);
        for tree in self.selected_mut(groups) {
            tree.update(swept, entity);
        }
    }

    /// Drop every entry, keeping the trees that exist.
    pub fn clear(&mut self) {
        for tree in self.trees.iter_mut().flatten() {
            tree.clear();
        }
    }

    pub fn contains(&self, entity: Entity, groups: GroupMask) -> bool {
        self.selected(groups).any(|tree| tree.contains(entity))
    }

    pub fn find_radius(&self, center: Vec2, radius: f32, groups: GroupMask) -> BTreeSet<Entity> {
        let mut out = BTreeSet::new();
        self.find_radius_into(center, radius, groups, &mut out);
        out
    }

    /// Like [`SpatialIndex::find_radius`], appending into `out`.
    pub fn find_radius_into(
        &self,
        center: Vec2,
        radius: f32,
        groups: GroupMask,
        out: &mut BTreeSet<Entity>,
    ) {
        self.count_query();
        for tree in self.selected(groups) {
            tree.query_circle(center, radius, out);
        }
    }

    pub fn find_rect(&self, rect: &Rect, groups: GroupMask) -> BTreeSet<Entity> {
        let mut out = BTreeSet::new();
        self.find_rect_into(rect, groups, &mut out);
        out
    }

    pub fn find_rect_into(&self, rect: &Rect, groups: GroupMask, out: &mut BTreeSet<Entity>) {
        self.count_query();
        for tree in self.selected(groups) {
            tree.query_rect(rect, out);
        }
    }

    /// Queries issued since the last [`SpatialIndex::reset_query_count`].
    /// Always zero in release builds.
    pub fn queries_since_update(&self) -> usize {
        #[cfg(debug_assertions)]
        {
            self.queries.load(Ordering::Relaxed)
        }
        #[cfg(not(debug_assertions))]
        {
            0
        }
    }

    pub fn reset_query_count(&self) {
        #[cfg(debug_assertions)]
        self.queries.store(0, Ordering::Relaxed);
    }

    fn count_query(&self) {
        #[cfg(debug_assertions)]
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    fn selected(&self, groups: GroupMask) -> impl Iterator<Item = &QuadTree> + '_ {
        groups.bits().filter_map(|bit| self.trees[bit].as_ref())
    }

    fn selected_mut(&mut self, groups: GroupMask) -> impl Iterator<Item = &mut QuadTree> + '_ {
        self.trees
            .iter_mut()
            .enumerate()
            .filter(move |(bit, _)| groups.0 & (1u64 << bit) != 0)
            .filter_map(|(_, tree)| tree.as_mut())
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupRegistry;

    fn e(index: u32) -> Entity {
        Entity::new(index, 0)
    }

    #[test]
    fn test_basic_pair_query() {
        let mut registry = GroupRegistry::new();
        let units = registry.allocate("units").unwrap().mask();
        let mut index = SpatialIndex::default();
        index.add(Rect::from_center_radius(Vec2::ZERO, 1.0), e(0), units);
        index.add(Rect::from_center_radius(Vec2::new(10.0, 0.0), 1.0), e(1), units);

        let near = index.find_radius(Vec2::ZERO, 9.0, units);
        assert_eq!(near, BTreeSet::from([e(0), e(1)]));
        let close = index.find_radius(Vec2::ZERO, 3.0, units);
        assert_eq!(close, BTreeSet::from([e(0)]));
        // The second entity's bounds start at x = 9, out of reach of radius 5.
        let mid = index.find_radius(Vec2::ZERO, 5.0, units);
        assert_eq!(mid, BTreeSet::from([e(0)]));
    }

    #[test]
    fn test_groups_are_filtered() {
        let mut registry = GroupRegistry::new();
        let red = registry.allocate("red").unwrap().mask();
        let blue = registry.allocate("blue").unwrap().mask();
        let mut index = SpatialIndex::default();
        let here = Rect::from_center_radius(Vec2::ZERO, 1.0);
        index.add(here, e(0), red);
        index.add(here, e(1), blue);
        index.add(here, e(2), red | blue);

        assert_eq!(index.find_rect(&here, red), BTreeSet::from([e(0), e(2)]));
        assert_eq!(index.find_rect(&here, !red), BTreeSet::from([e(1), e(2)]));
        assert_eq!(index.find_rect(&here, GroupMask::ALL).len(), 3);
        assert!(index.find_rect(&here, GroupMask::EMPTY).is_empty());
    }

    #[test]
    fn test_update_stores_swept_bounds() {
        let mut index = SpatialIndex::default();
        let groups = GroupMask(1);
        index.add(Rect::from_center_radius(Vec2::ZERO, 1.0), e(0), groups);
        index.update(
            Rect::from_center_radius(Vec2::new(10.0, 0.0), 1.0),
            Vec2::new(10.0, 0.0),
            e(0),
            groups,
        );
        // The path between old and new positions is still covered.
        assert!(index.find_radius(Vec2::new(5.0, 0.0), 0.5, groups).contains(&e(0)));
        index.update(Rect::from_center_radius(Vec2::new(10.0, 0.0), 1.0), Vec2::ZERO, e(0), groups);
        assert!(index.find_radius(Vec2::new(5.0, 0.0), 0.5, groups).is_empty());
    }

    #[test]
    fn test_remove_from_all_selected_trees() {
        let mut index = SpatialIndex::default();
        let both = GroupMask(0b11);
        index.add(Rect::from_center_radius(Vec2::ZERO, 1.0), e(0), both);
        index.remove(e(0), both);
        assert!(!index.contains(e(0), both));
        assert!(index.find_radius(Vec2::ZERO, 5.0, GroupMask::ALL).is_empty());
    }

    #[test]
    fn test_into_appends() {
        let mut index = SpatialIndex::default();
        let groups = GroupMask(1);
        index.add(Rect::from_center_radius(Vec2::ZERO, 1.0), e(4), groups);
        let mut out = BTreeSet::from([e(9)]);
        index.find_radius_into(Vec2::ZERO, 1.0, groups, &mut out);
        assert_eq!(out, BTreeSet::from([e(4), e(9)]));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_query_counter() {
        let index = SpatialIndex::default();
        index.find_radius(Vec2::ZERO, 1.0, GroupMask::ALL);
        index.find_rect(&Rect::from_center_radius(Vec2::ZERO, 1.0), GroupMask::ALL);
        assert_eq!(index.queries_since_update(), 2);
        index.reset_query_count();
        assert_eq!(index.queries_since_update(), 0);
    }
}
