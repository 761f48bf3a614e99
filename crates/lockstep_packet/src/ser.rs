//! serde `Serializer` writing the positional wire format into any
//! [`WireSink`].

use serde::Serialize;
use serde::ser::{self, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant};
use serde::ser::{SerializeTuple, SerializeTupleStruct, SerializeTupleVariant};

use crate::error::PacketError;
use crate::sink::WireSink;

/// Serialize `value` into `sink` using the positional encoding.
///
/// Struct fields are written in declaration order with no names or framing,
/// `Option` becomes a present flag, sequences and maps carry an `i32` length,
/// and enum variants are a `u32` index.
///
/// # Errors
///
/// Returns [`PacketError::UnknownLength`] for sequences without a known length,
/// [`PacketError::LengthOverflow`] for oversized ones, or whatever the value's
/// `Serialize` implementation reports.
pub fn encode_into<S, T>(sink: &mut S, value: &T) -> Result<(), PacketError>
where
    S: WireSink + ?Sized,
    T: Serialize + ?Sized,
{
    value.serialize(&mut Encoder { sink })
}

pub(crate) struct Encoder<'s, S: ?Sized> {
    sink: &'s mut S,
}

impl<'a, 's, S: WireSink + ?Sized> ser::Serializer for &'a mut Encoder<'s, S> {
    type Ok = ();
    type Error = PacketError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, v: bool) -> Result<(), PacketError> {
        self.sink.write_bool(v);
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<(), PacketError> {
        self.sink.write_i8(v);
        Ok(())
    }

    fn serialize_i16(self, v: i16) -> Result<(), PacketError> {
        self.sink.write_i16(v);
        Ok(())
    }

    fn serialize_i32(self, v: i32) -> Result<(), PacketError> {
        self.sink.write_i32(v);
        Ok(())
    }

    fn serialize_i64(self, v: i64) -> Result<(), PacketError> {
        self.sink.write_i64(v);
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<(), PacketError> {
        self.sink.write_u8(v);
        Ok(())
    }

    fn serialize_u16(self, v: u16) -> Result<(), PacketError> {
        self.sink.write_u16(v);
        Ok(())
    }

    fn serialize_u32(self, v: u32) -> Result<(), PacketError> {
        self.sink.write_u32(v);
        Ok(())
    }

    fn serialize_u64(self, v: u64) -> Result<(), PacketError> {
        self.sink.write_u64(v);
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), PacketError> {
        self.sink.write_f32(v);
        Ok(())
    }

    fn serialize_f64(self, v: f64) -> Result<(), PacketError> {
        self.sink.write_f64(v);
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<(), PacketError> {
        self.sink.write_u32(u32::from(v));
        Ok(())
    }

    fn serialize_str(self, v: &str) -> Result<(), PacketError> {
        self.sink.write_string(Some(v))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<(), PacketError> {
        self.sink.write_bytes(Some(v))
    }

    fn serialize_none(self) -> Result<(), PacketError> {
        self.sink.write_bool(false);
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        self.sink.write_bool(true);
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), PacketError> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), PacketError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
    ) -> Result<(), PacketError> {
        self.sink.write_u32(variant_index);
        Ok(())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        self.sink.write_u32(variant_index);
        value.serialize(self)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, PacketError> {
        let len = len.ok_or(PacketError::UnknownLength)?;
        self.sink.write_len(len)?;
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, PacketError> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, PacketError> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, PacketError> {
        self.sink.write_u32(variant_index);
        Ok(self)
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, PacketError> {
        let len = len.ok_or(PacketError::UnknownLength)?;
        self.sink.write_len(len)?;
        Ok(self)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct, PacketError> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, PacketError> {
        self.sink.write_u32(variant_index);
        Ok(self)
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

impl<'a, 's, S: WireSink + ?Sized> SerializeSeq for &'a mut Encoder<'s, S> {
    type Ok = ();
    type Error = PacketError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), PacketError> {
        Ok(())
    }
}

impl<'a, 's, S: WireSink + ?Sized> SerializeTuple for &'a mut Encoder<'s, S> {
    type Ok = ();
    type Error = PacketError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), PacketError> {
        Ok(())
    }
}

impl<'a, 's, S: WireSink + ?Sized> SerializeTupleStruct for &'a mut Encoder<'s, S> {
    type Ok = ();
    type Error = PacketError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), PacketError> {
        Ok(())
    }
}

impl<'a, 's, S: WireSink + ?Sized> SerializeTupleVariant for &'a mut Encoder<'s, S> {
    type Ok = ();
    type Error = PacketError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), PacketError> {
        Ok(())
    }
}

impl<'a, 's, S: WireSink + ?Sized> SerializeMap for &'a mut Encoder<'s, S> {
    type Ok = ();
    type Error = PacketError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        key.serialize(&mut **self)
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), PacketError> {
        Ok(())
    }
}

impl<'a, 's, S: WireSink + ?Sized> SerializeStruct for &'a mut Encoder<'s, S> {
    type Ok = ();
    type Error = PacketError;

    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), PacketError> {
        Ok(())
    }
}

impl<'a, 's, S: WireSink + ?Sized> SerializeStructVariant for &'a mut Encoder<'s, S> {
    type Ok = ();
    type Error = PacketError;

    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<(), PacketError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), PacketError> {
        Ok(())
    }
}
