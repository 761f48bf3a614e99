//! serde `Deserializer` reading the positional wire format from a
//! [`Packet`].

use serde::de::value::U32Deserializer;
use serde::de::{self, DeserializeSeed, EnumAccess, IntoDeserializer, VariantAccess, Visitor};

use crate::error::PacketError;
use crate::packet::Packet;

pub(crate) struct Decoder<'p> {
    packet: &'p mut Packet,
}

impl<'p> Decoder<'p> {
    pub(crate) fn new(packet: &'p mut Packet) -> Self {
        Self { packet }
    }

    fn len(&mut self) -> Result<usize, PacketError> {
        self.packet.read_len()?.ok_or(PacketError::UnexpectedNull)
    }
}

impl<'de, 'a, 'p> de::Deserializer<'de> for &'a mut Decoder<'p> {
    type Error = PacketError;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, PacketError> {
        Err(PacketError::NotSelfDescribing("deserialize_any"))
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_bool(self.packet.read_bool()?)
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_i8(self.packet.read_i8()?)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_i16(self.packet.read_i16()?)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_i32(self.packet.read_i32()?)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_i64(self.packet.read_i64()?)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_u8(self.packet.read_u8()?)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_u16(self.packet.read_u16()?)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_u32(self.packet.read_u32()?)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_u64(self.packet.read_u64()?)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_f32(self.packet.read_f32()?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_f64(self.packet.read_f64()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        let code = self.packet.read_u32()?;
        let value = char::from_u32(code).ok_or(PacketError::InvalidChar(code))?;
        visitor.visit_char(value)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        let value = self
            .packet
            .read_string()?
            .ok_or(PacketError::UnexpectedNull)?;
        visitor.visit_string(value)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        let value = self
            .packet
            .read_bytes()?
            .ok_or(PacketError::UnexpectedNull)?;
        visitor.visit_byte_buf(value)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        if self.packet.read_bool()? {
            visitor.visit_some(self)
        } else {
            visitor.visit_none()
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, PacketError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, PacketError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        let remaining = self.len()?;
        visitor.visit_seq(Elements {
            decoder: self,
            remaining,
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, PacketError> {
        visitor.visit_seq(Elements {
            decoder: self,
            remaining: len,
        })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, PacketError> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, PacketError> {
        let remaining = self.len()?;
        visitor.visit_map(Elements {
            decoder: self,
            remaining,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, PacketError> {
        self.deserialize_tuple(fields.len(), visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, PacketError> {
        visitor.visit_enum(self)
    }

    fn deserialize_identifier<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, PacketError> {
        visitor.visit_u32(self.packet.read_u32()?)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        _visitor: V,
    ) -> Result<V::Value, PacketError> {
        Err(PacketError::NotSelfDescribing("deserialize_ignored_any"))
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

/// Counted access used for sequences, tuples, structs and maps.
struct Elements<'a, 'p> {
    decoder: &'a mut Decoder<'p>,
    remaining: usize,
}

impl<'de, 'a, 'p> de::SeqAccess<'de> for Elements<'a, 'p> {
    type Error = PacketError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, PacketError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.decoder).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

impl<'de, 'a, 'p> de::MapAccess<'de> for Elements<'a, 'p> {
    type Error = PacketError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, PacketError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.decoder).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, PacketError> {
        seed.deserialize(&mut *self.decoder)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

impl<'de, 'a, 'p> EnumAccess<'de> for &'a mut Decoder<'p> {
    type Error = PacketError;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self), PacketError> {
        let index: U32Deserializer<PacketError> = self.packet.read_u32()?.into_deserializer();
        let variant = seed.deserialize(index)?;
        Ok((variant, self))
    }
}

impl<'de, 'a, 'p> VariantAccess<'de> for &'a mut Decoder<'p> {
    type Error = PacketError;

    fn unit_variant(self) -> Result<(), PacketError> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, PacketError> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, PacketError> {
        visitor.visit_seq(Elements {
            decoder: self,
            remaining: len,
        })
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, PacketError> {
        visitor.visit_seq(Elements {
            decoder: self,
            remaining: fields.len(),
        })
    }
}
