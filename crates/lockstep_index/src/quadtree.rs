//! Bucketed quad tree over entity bounds.

use std::collections::{BTreeSet, HashMap};

use glam::Vec2;
use lockstep_component::Entity;
use lockstep_math::Rect;

use crate::config::IndexConfig;

const ROOT: usize = 0;

#[derive(Debug, Clone)]
struct Node {
    bounds: Rect,
    parent: Option<usize>,
    children: Option<[usize; 4]>,
    entries: Vec<(Rect, Entity)>,
    /// Entries in this node and all of its descendants.
    count: usize,
}

impl Node {
    fn new(bounds: Rect, parent: Option<usize>) -> Self {
        Self {
            bounds,
            parent,
            children: None,
            entries: Vec::new(),
            count: 0,
        }
    }
}

/// One group's tree.
///
/// Each entity lives in exactly one node: the deepest one whose bounds fully
/// contain the entity's rectangle. Entries that straddle a split line stay in
/// the parent; entries outside the root bounds stay at the root.
#[derive(Debug, Clone)]
pub struct QuadTree {
    nodes: Vec<Node>,
    free: Vec<usize>,
    placements: HashMap<Entity, usize>,
    split_threshold: usize,
    min_node_size: f32,
}

impl QuadTree {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            nodes: vec![Node::new(config.bounds, None)],
            free: Vec::new(),
            placements: HashMap::new(),
            split_threshold: config.split_threshold.max(1),
            min_node_size: config.min_node_size,
        }
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.placements.contains_key(&entity)
    }

    /// Stored rectangle for `entity`.
    pub fn bounds_of(&self, entity: Entity) -> Option<Rect> {
        let node = *self.placements.get(&entity)?;
        self.nodes[node]
            .entries
            .iter()
            .find(|(_, e)| *e == entity)
            .map(|(bounds, _)| *bounds)
    }

    /// Live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Insert or move `entity`.
    pub fn insert(&mut self, bounds: Rect, entity: Entity) {
        if self.placements.contains_key(&entity) {
            self.update(bounds, entity);
            return;
        }
        let node = self.locate(&bounds);
        self.push_entry(node, bounds, entity);
    }

    /// Move `entity` to `bounds`, touching the tree structure only if its
    /// containing node changes. Unknown entities are inserted.
    pub fn update(&mut self, bounds: Rect, entity: Entity) {
        let Some(&node) = self.placements.get(&entity) else {
            self.insert(bounds, entity);
            return;
        };
        if self.fits_at(node, &bounds) {
            if let Some(entry) = self.nodes[node].entries.iter_mut().find(|(_, e)| *e == entity) {
                entry.0 = bounds;
            }
            return;
        }
        self.remove(entity);
        let target = self.locate(&bounds);
        self.push_entry(target, bounds, entity);
    }

    /// Returns `false` if `entity` was not in the tree.
    pub fn remove(&mut self, entity: Entity) -> bool {
        let Some(node) = self.placements.remove(&entity) else {
            return false;
        };
        let entries = &mut self.nodes[node].entries;
        if let Some(pos) = entries.iter().position(|(_, e)| *e == entity) {
            entries.swap_remove(pos);
        }
        let mut collapse_at = None;
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            let n = &mut self.nodes[current];
            n.count -= 1;
            if n.children.is_some() && n.count <= self.split_threshold {
                collapse_at = Some(current);
            }
            cursor = n.parent;
        }
        if let Some(top) = collapse_at {
            self.collapse(top);
        }
        true
    }

    pub fn clear(&mut self) {
        let bounds = self.nodes[ROOT].bounds;
        self.nodes.clear();
        self.nodes.push(Node::new(bounds, None));
        self.free.clear();
        self.placements.clear();
    }

    /// Append every entity whose rectangle overlaps `rect`.
    pub fn query_rect(&self, rect: &Rect, out: &mut BTreeSet<Entity>) {
        self.walk(out, |bounds| bounds.intersects(rect));
    }

    /// Append every entity whose rectangle overlaps the circle.
    pub fn query_circle(&self, center: Vec2, radius: f32, out: &mut BTreeSet<Entity>) {
        self.walk(out, |bounds| bounds.intersects_circle(center, radius));
    }

    fn walk(&self, out: &mut BTreeSet<Entity>, hit: impl Fn(&Rect) -> bool) {
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            for (bounds, entity) in &node.entries {
                if hit(bounds) {
                    out.insert(*entity);
                }
            }
            if let Some(children) = node.children {
                stack.extend(
                    children
                        .into_iter()
                        .filter(|&child| self.nodes[child].count > 0 && hit(&self.nodes[child].bounds)),
                );
            }
        }
    }

    /// Deepest existing node that fully contains `bounds`, or the root.
    fn locate(&self, bounds: &Rect) -> usize {
        let mut node = ROOT;
        while let Some(children) = self.nodes[node].children {
            match children
                .into_iter()
                .find(|&child| self.nodes[child].bounds.contains_rect(bounds))
            {
                Some(child) => node = child,
                None => break,
            }
        }
        node
    }

    /// Whether `node` is still the right home for `bounds`.
    fn fits_at(&self, node: usize, bounds: &Rect) -> bool {
        let n = &self.nodes[node];
        if !n.bounds.contains_rect(bounds) {
            // Overflow entries belong at the root.
            return node == ROOT;
        }
        match n.children {
            Some(children) => !children
                .into_iter()
                .any(|child| self.nodes[child].bounds.contains_rect(bounds)),
            None => true,
        }
    }

    fn push_entry(&mut self, node: usize, bounds: Rect, entity: Entity) {
        self.nodes[node].entries.push((bounds, entity));
        self.placements.insert(entity, node);
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            self.nodes[current].count += 1;
            cursor = self.nodes[current].parent;
        }
        self.split(node);
    }

    fn split(&mut self, node: usize) {
        let n = &self.nodes[node];
        if n.children.is_some()
            || n.entries.len() <= self.split_threshold
            || n.bounds.width().max(n.bounds.height()) <= self.min_node_size
        {
            return;
        }
        let quadrants = n.bounds.quadrants();
        let children = quadrants.map(|bounds| self.alloc(Node::new(bounds, Some(node))));
        self.nodes[node].children = Some(children);

        let entries = std::mem::take(&mut self.nodes[node].entries);
        for (bounds, entity) in entries {
            match children
                .into_iter()
                .find(|&child| self.nodes[child].bounds.contains_rect(&bounds))
            {
                Some(child) => {
                    let c = &mut self.nodes[child];
                    c.entries.push((bounds, entity));
                    c.count += 1;
                    self.placements.insert(entity, child);
                }
                None => self.nodes[node].entries.push((bounds, entity)),
            }
        }
        for child in children {
            self.split(child);
        }
    }

    /// Pull every descendant entry of `node` back into it and free the
    /// descendants.
    fn collapse(&mut self, node: usize) {
        let Some(children) = self.nodes[node].children.take() else {
            return;
        };
        let mut stack = children.to_vec();
        while let Some(index) = stack.pop() {
            if let Some(grandchildren) = self.nodes[index].children.take() {
                stack.extend(grandchildren);
            }
            let entries = std::mem::take(&mut self.nodes[index].entries);
            for (_, entity) in &entries {
                self.placements.insert(*entity, node);
            }
            self.nodes[node].entries.extend(entries);
            self.nodes[index].count = 0;
            self.free.push(index);
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }
}
