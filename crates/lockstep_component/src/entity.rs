//! Entity type and allocation utilities.
//!
//! An [`Entity`] is a generational `(index, generation)` pair with no data of
//! its own. Indices are recycled after an entity is freed; the generation
//! bump makes any copy of the old id detectably stale.

use serde::{Deserialize, Serialize};

use crate::error::ComponentError;

/// A unique entity identifier.
///
/// Ordering is by index, then generation. Query results and snapshots rely on
/// this order, so it must not depend on anything but the two numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Unpack the raw `u64` form: generation in the high half, index in the
    /// low half.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

/// Hands out entity ids, recycling freed indices with a bumped generation.
///
/// The allocator is part of the simulation state: it is written into
/// snapshots so a restored peer allocates the same ids as the original.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u32>,
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an entity, reusing the most recently freed index first.
    pub fn allocate(&mut self) -> Entity {
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            return Entity::new(index, self.generations[slot]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        Entity::new(index, 0)
    }

    /// Free a live entity. Returns `false` for stale or unknown ids.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = entity.index as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(entity.index);
        true
    }

    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index as usize;
        slot < self.alive.len() && self.alive[slot] && self.generations[slot] == entity.generation
    }

    /// Number of live entities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.alive.len() - self.free.len()
    }

    /// Check the invariants a deserialized allocator must hold before any
    /// other call is made on it.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidAllocator`] if the generation and
    /// liveness tables differ in length, or if the free list is not exactly
    /// the set of dead slots.
    pub fn validate(&self) -> Result<(), ComponentError> {
        if self.generations.len() != self.alive.len() {
            return Err(ComponentError::InvalidAllocator(
                "generation and liveness tables differ in length",
            ));
        }
        let mut listed = vec![false; self.alive.len()];
        for &index in &self.free {
            let slot = index as usize;
            if slot >= self.alive.len() {
                return Err(ComponentError::InvalidAllocator("free index out of range"));
            }
            if self.alive[slot] {
                return Err(ComponentError::InvalidAllocator("free index is alive"));
            }
            if std::mem::replace(&mut listed[slot], true) {
                return Err(ComponentError::InvalidAllocator("free index listed twice"));
            }
        }
        let dead = self.alive.iter().filter(|alive| !**alive).count();
        if dead != self.free.len() {
            return Err(ComponentError::InvalidAllocator("dead slot missing from free list"));
        }
        Ok(())
    }

    /// Live entities in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(slot, _)| Entity::new(slot as u32, self.generations[slot]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        let e = Entity::new(7, 3);
        assert_eq!(e.to_raw(), (3u64 << 32) | 7);
        assert_eq!(Entity::from_raw(e.to_raw()), e);
    }

    #[test]
    fn test_allocator_produces_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        let e3 = alloc.allocate();
        assert_eq!([e1.index(), e2.index(), e3.index()], [0, 1, 2]);
        assert_eq!(alloc.count(), 3);
    }

    #[test]
    fn test_freed_index_is_reused_with_new_generation() {
        let mut alloc = EntityAllocator::new();
        let first = alloc.allocate();
        assert!(alloc.free(first));
        assert!(!alloc.free(first));
        let second = alloc.allocate();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(!alloc.is_alive(first));
        assert!(alloc.is_alive(second));
    }

    #[test]
    fn test_iter_skips_freed() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        let c = alloc.allocate();
        alloc.free(b);
        assert_eq!(alloc.iter().collect::<Vec<_>>(), vec![a, c]);
    }

    #[test]
    fn test_validate_accepts_allocated_state() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        alloc.allocate();
        alloc.free(a);
        assert!(alloc.validate().is_ok());
        assert!(EntityAllocator::new().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_tables() {
        let broken = [
            EntityAllocator {
                generations: vec![],
                alive: vec![],
                free: vec![5],
            },
            EntityAllocator {
                generations: vec![0],
                alive: vec![true, false],
                free: vec![1],
            },
            EntityAllocator {
                generations: vec![0, 0],
                alive: vec![true, false],
                free: vec![0],
            },
            EntityAllocator {
                generations: vec![0, 0],
                alive: vec![false, true],
                free: vec![0, 0],
            },
            EntityAllocator {
                generations: vec![0, 0],
                alive: vec![false, false],
                free: vec![1],
            },
        ];
        for alloc in broken {
            assert!(
                matches!(alloc.validate(), Err(ComponentError::InvalidAllocator(_))),
                "{alloc:?}"
            );
        }
    }

    #[test]
    fn test_ordering_is_index_first() {
        assert!(Entity::new(1, 9) < Entity::new(2, 0));
        assert!(Entity::new(2, 0) < Entity::new(2, 1));
    }
}
