//! The [`Component`] trait and per-type identity.
//!
//! Components are plain data attached to entities. They are written into
//! snapshots and hashed, so the trait requires serde and a wire tag; parallel
//! passes read them from worker threads, so it also requires `Send + Sync`.
//!
//! [`ComponentTypeId`] is FNV-1a 64 over the wire tag
//! ([`TypeTag::TYPE_TAG`]). Peers derive the same id from the same tag without
//! exchanging a table, and snapshot readers use it to find the store a tagged
//! record belongs to.

use lockstep_packet::TypeTag;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Stable identity of a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    /// Id for a wire tag. Usable in `const` contexts.
    #[must_use]
    pub const fn from_name(tag: &str) -> Self {
        let bytes = tag.as_bytes();
        let mut id = Self::OFFSET;
        let mut at = 0;
        while at < bytes.len() {
            id = (id ^ bytes[at] as u64).wrapping_mul(Self::PRIME);
            at += 1;
        }
        Self(id)
    }

    #[must_use]
    pub fn of<T: Component>() -> Self {
        T::component_type_id()
    }
}

/// Data attached to an entity.
///
/// Implementors only supply the wire tag; the id is derived from it.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use lockstep_component::Component;
/// use lockstep_packet::TypeTag;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Fuel {
///     litres: f32,
/// }
///
/// impl TypeTag for Fuel {
///     const TYPE_TAG: &'static str = "demo.Fuel";
/// }
///
/// impl Component for Fuel {}
/// ```
pub trait Component: TypeTag + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::TYPE_TAG)
    }
}
