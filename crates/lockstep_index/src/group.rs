//! Index groups and masks.
//!
//! Each of the 64 bits of a [`GroupMask`] names an independent spatial
//! partition. Bits are handed out by a [`GroupRegistry`] owned by whoever sets
//! up the simulation; there is no process-wide counter.

use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::IndexError;

pub const MAX_GROUPS: usize = 64;

/// One allocated group bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(u8);

impl GroupId {
    pub fn bit(self) -> u8 {
        self.0
    }

    pub fn mask(self) -> GroupMask {
        GroupMask(1 << self.0)
    }
}

/// A set of group bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupMask(pub u64);

impl GroupMask {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(u64::MAX);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, group: GroupId) -> bool {
        self.0 & (1 << group.0) != 0
    }

    pub fn intersects(self, other: GroupMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Set bit indices in ascending order.
    pub fn bits(self) -> impl Iterator<Item = usize> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let bit = rest.trailing_zeros() as usize;
            rest &= rest - 1;
            Some(bit)
        })
    }
}

impl From<GroupId> for GroupMask {
    fn from(group: GroupId) -> Self {
        group.mask()
    }
}

impl BitOr for GroupMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr<GroupId> for GroupMask {
    type Output = Self;

    fn bitor(self, rhs: GroupId) -> Self {
        self | rhs.mask()
    }
}

impl BitOrAssign for GroupMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for GroupMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for GroupMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Issues group bits in allocation order.
///
/// Every peer must allocate the same names in the same order so masks mean
/// the same thing everywhere.
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    names: Vec<String>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next free bit for `name`.
    ///
    /// # Errors
    ///
    /// [`IndexError::GroupsExhausted`] after 64 groups,
    /// [`IndexError::DuplicateGroup`] if `name` is already allocated.
    pub fn allocate(&mut self, name: &str) -> Result<GroupId, IndexError> {
        if self.names.iter().any(|n| n == name) {
            return Err(IndexError::DuplicateGroup(name.to_string()));
        }
        if self.names.len() >= MAX_GROUPS {
            return Err(IndexError::GroupsExhausted(name.to_string()));
        }
        let id = GroupId(self.names.len() as u8);
        self.names.push(name.to_string());
        info!(group = name, bit = id.0, "allocated index group");
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Option<GroupId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| GroupId(i as u8))
    }

    pub fn name(&self, group: GroupId) -> Option<&str> {
        self.names.get(group.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_monotonic() {
        let mut registry = GroupRegistry::new();
        let ships = registry.allocate("ships").unwrap();
        let bullets = registry.allocate("bullets").unwrap();
        assert_eq!(ships.bit(), 0);
        assert_eq!(bullets.bit(), 1);
        assert_eq!(registry.get("bullets"), Some(bullets));
        assert_eq!(registry.name(ships), Some("ships"));
    }

    #[test]
    fn test_sixty_fifth_group_fails() {
        let mut registry = GroupRegistry::new();
        for i in 0..64 {
            registry.allocate(&format!("g{i}")).unwrap();
        }
        assert_eq!(
            registry.allocate("one-too-many"),
            Err(IndexError::GroupsExhausted("one-too-many".to_string()))
        );
    }

    #[test]
    fn test_registries_are_independent() {
        let mut a = GroupRegistry::new();
        let mut b = GroupRegistry::new();
        a.allocate("x").unwrap();
        assert_eq!(b.allocate("y").unwrap().bit(), 0);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = GroupRegistry::new();
        registry.allocate("x").unwrap();
        assert!(matches!(registry.allocate("x"), Err(IndexError::DuplicateGroup(_))));
    }

    #[test]
    fn test_mask_operations() {
        let mut registry = GroupRegistry::new();
        let a = registry.allocate("a").unwrap();
        let b = registry.allocate("b").unwrap();
        let both = a.mask() | b;
        assert!(both.contains(a) && both.contains(b));
        assert!(!(!a.mask()).contains(a));
        assert!((!a.mask()).intersects(b.mask()));
        assert_eq!(both.bits().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(GroupMask(1 << 63).bits().collect::<Vec<_>>(), vec![63]);
    }
}
