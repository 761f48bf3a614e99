//! Tag-dispatched reads for heterogeneous "with type info" values.

use std::any::Any;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::PacketError;
use crate::packet::{Packet, TypeTag};

type Reader = fn(&mut Packet) -> Result<Box<dyn Any + Send>, PacketError>;

fn read_boxed<T>(packet: &mut Packet) -> Result<Box<dyn Any + Send>, PacketError>
where
    T: DeserializeOwned + Send + 'static,
{
    Ok(Box::new(packet.read::<T>()?))
}

/// Maps type tags to readers so a value can be read without knowing its type
/// up front.
///
/// Types are registered once at startup; a duplicate tag is rejected there
/// rather than on the first packet that carries it.
#[derive(Default)]
pub struct TypeRegistry {
    readers: HashMap<&'static str, Reader>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its [`TypeTag`].
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::DuplicateTypeTag`] if the tag is taken.
    pub fn register<T>(&mut self) -> Result<(), PacketError>
    where
        T: TypeTag + DeserializeOwned + Send + 'static,
    {
        if self.readers.contains_key(T::TYPE_TAG) {
            return Err(PacketError::DuplicateTypeTag(T::TYPE_TAG.to_string()));
        }
        debug!(tag = T::TYPE_TAG, "registered type tag");
        self.readers.insert(T::TYPE_TAG, read_boxed::<T>);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.readers.contains_key(tag)
    }

    /// Read a tag and the value it names. A null tag yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::UnknownTypeTag`] for an unregistered tag, or the
    /// reader's error. On error the read cursor is left before the tag.
    pub fn read_tagged(
        &self,
        packet: &mut Packet,
    ) -> Result<Option<(String, Box<dyn Any + Send>)>, PacketError> {
        let start = packet.read_position();
        let result = self.read_tagged_inner(packet);
        if result.is_err() {
            packet.restore(start);
        }
        result
    }

    fn read_tagged_inner(
        &self,
        packet: &mut Packet,
    ) -> Result<Option<(String, Box<dyn Any + Send>)>, PacketError> {
        let Some(tag) = packet.read_type_tag()? else {
            return Ok(None);
        };
        let reader = self
            .readers
            .get(tag.as_str())
            .ok_or_else(|| PacketError::UnknownTypeTag(tag.clone()))?;
        let value = reader(packet)?;
        Ok(Some((tag, value)))
    }
}
