//! Binary wire format codec.
//!
//! Encoding walks present fields and extensions in ascending field-number
//! order, then appends retained unknown fields verbatim. A proto3 field
//! without presence is not written while it holds its zero value. Decoding is a single
//! left-to-right scan; a tag is matched against the regular fields first,
//! then the extensions registered for the message, and is otherwise kept as
//! an unknown field.

use super::Codec;
use crate::descriptor::{DescriptorPool, FieldDescriptor, FieldType, MessageDescriptor};
use crate::error::{Error, Result};
use crate::message::{DynamicMessage, UnknownField, Value};
use crate::wire::{self, Reader, Tag, WireType};
use bytes::{BufMut, Bytes};
use tracing::{debug, trace};

/// Codec for the protobuf binary wire format
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// Creates a binary codec
    pub fn new() -> Self {
        Self
    }

    /// Decodes `data` into an existing message, merging with what it holds.
    ///
    /// Scalars are overwritten, lists are appended to and embedded messages
    /// are merged recursively. On error `message` is left untouched.
    pub fn merge(
        &self,
        pool: &DescriptorPool,
        message: &mut DynamicMessage,
        data: &[u8],
    ) -> Result<()> {
        let descriptor = pool.get_message_by_name(message.type_name())?;
        let mut merged = message.clone();
        decode_into(pool, descriptor, &mut merged, data, 0)?;
        *message = merged;
        Ok(())
    }
}

impl Codec for BinaryCodec {
    fn encode(&self, pool: &DescriptorPool, message: &DynamicMessage) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        encode_message(pool, message, &mut buf)?;
        trace!("Encoded {} as {} bytes", message.type_name(), buf.len());
        Ok(buf)
    }

    fn decode(
        &self,
        pool: &DescriptorPool,
        type_name: &str,
        data: &[u8],
    ) -> Result<DynamicMessage> {
        let descriptor = pool.get_message_by_name(type_name)?;
        debug!("Decoding {} bytes as {}", data.len(), descriptor.full_name());
        let mut message = DynamicMessage::new(descriptor);
        decode_into(pool, descriptor, &mut message, data, 0)?;
        Ok(message)
    }
}

fn encode_message(pool: &DescriptorPool, message: &DynamicMessage, buf: &mut Vec<u8>) -> Result<()> {
    let descriptor = pool.get_message_by_name(message.type_name())?;

    let mut entries: Vec<(&FieldDescriptor, &Value)> = Vec::new();
    for (number, value) in message.fields() {
        let field = descriptor.field(number).ok_or_else(|| {
            Error::type_mismatch(
                format!("{}.{}", descriptor.full_name(), number),
                "a declared field number",
            )
        })?;
        if field.is_implicit_default(value) {
            continue;
        }
        entries.push((field, value));
    }
    for (key, value) in message.extensions() {
        let extension = pool
            .find_extension(key.extendee, key.number)
            .filter(|_| key.extendee == descriptor.id())
            .ok_or_else(|| {
                Error::type_mismatch(
                    format!("{}.[{}]", descriptor.full_name(), key.number),
                    "a registered extension",
                )
            })?;
        entries.push((extension, value));
    }
    entries.sort_by_key(|(field, _)| field.number());

    for (field, value) in entries {
        encode_field(pool, field, value, buf)?;
    }
    for unknown in message.unknown_fields() {
        buf.extend_from_slice(unknown.as_bytes());
    }
    Ok(())
}

fn encode_field(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    value: &Value,
    buf: &mut Vec<u8>,
) -> Result<()> {
    if !field.is_list() {
        wire::encode_tag(field.number(), field.wire_type(), buf);
        return encode_value(pool, field, value, buf);
    }

    let Value::List(values) = value else {
        return Err(Error::type_mismatch(field.full_name(), "a list value"));
    };
    if field.is_packed() {
        if values.is_empty() {
            return Ok(());
        }
        let mut payload = Vec::new();
        for element in values {
            encode_value(pool, field, element, &mut payload)?;
        }
        wire::encode_tag(field.number(), WireType::Len, buf);
        wire::encode_varint(payload.len() as u64, buf);
        buf.extend_from_slice(&payload);
    } else {
        for element in values {
            wire::encode_tag(field.number(), field.wire_type(), buf);
            encode_value(pool, field, element, buf)?;
        }
    }
    Ok(())
}

fn encode_len_delimited(data: &[u8], buf: &mut Vec<u8>) {
    wire::encode_varint(data.len() as u64, buf);
    buf.extend_from_slice(data);
}

/// Encodes one value without its tag
fn encode_value(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    value: &Value,
    buf: &mut Vec<u8>,
) -> Result<()> {
    match (field.field_type(), value) {
        // Negative int32 and enum values are sign-extended to ten bytes.
        (FieldType::Int32, Value::I32(v)) => wire::encode_varint(*v as i64 as u64, buf),
        (FieldType::Enum(_), Value::EnumNumber(v)) => wire::encode_varint(*v as i64 as u64, buf),
        (FieldType::Int64, Value::I64(v)) => wire::encode_varint(*v as u64, buf),
        (FieldType::Uint32, Value::U32(v)) => wire::encode_varint(*v as u64, buf),
        (FieldType::Uint64, Value::U64(v)) => wire::encode_varint(*v, buf),
        (FieldType::Sint32, Value::I32(v)) => {
            wire::encode_varint(wire::zigzag_encode32(*v) as u64, buf)
        }
        (FieldType::Sint64, Value::I64(v)) => wire::encode_varint(wire::zigzag_encode64(*v), buf),
        (FieldType::Bool, Value::Bool(v)) => wire::encode_varint(*v as u64, buf),
        (FieldType::Fixed32, Value::U32(v)) => buf.put_u32_le(*v),
        (FieldType::Sfixed32, Value::I32(v)) => buf.put_i32_le(*v),
        (FieldType::Float, Value::F32(v)) => buf.put_f32_le(*v),
        (FieldType::Fixed64, Value::U64(v)) => buf.put_u64_le(*v),
        (FieldType::Sfixed64, Value::I64(v)) => buf.put_i64_le(*v),
        (FieldType::Double, Value::F64(v)) => buf.put_f64_le(*v),
        (FieldType::String, Value::String(s)) => encode_len_delimited(s.as_bytes(), buf),
        (FieldType::Bytes, Value::Bytes(b)) => encode_len_delimited(b, buf),
        (FieldType::Message(_), Value::Message(message))
            if field.type_name() == Some(message.type_name()) =>
        {
            let mut nested = Vec::new();
            encode_message(pool, message, &mut nested)?;
            encode_len_delimited(&nested, buf);
        }
        _ => {
            return Err(Error::type_mismatch(
                field.full_name(),
                format!("a {} value", field.field_type().name()),
            ));
        }
    }
    Ok(())
}

/// Returns true if `wire_type` is a valid framing for `field`
fn accepts(field: &FieldDescriptor, wire_type: WireType) -> bool {
    wire_type == field.wire_type()
        || (field.is_list() && field.field_type().is_packable() && wire_type == WireType::Len)
}

fn decode_into(
    pool: &DescriptorPool,
    descriptor: &MessageDescriptor,
    message: &mut DynamicMessage,
    data: &[u8],
    base: usize,
) -> Result<()> {
    let mut reader = Reader::with_base(data, base);

    while !reader.is_empty() {
        let start = reader.position();
        let tag = reader.read_tag()?;

        let field = descriptor
            .field(tag.number)
            .or_else(|| pool.find_extension(descriptor.id(), tag.number))
            .filter(|field| accepts(field, tag.wire_type));

        match field {
            Some(field) => {
                clear_oneof_siblings(descriptor, message, field);
                decode_field(pool, message, field, tag, &mut reader)?
            }
            None => {
                reader.skip_value(tag)?;
                let span = reader.slice(start, reader.position());
                trace!(
                    "Keeping unknown field {} ({:?}, {} bytes) in {}",
                    tag.number,
                    tag.wire_type,
                    span.len(),
                    descriptor.full_name()
                );
                message.push_unknown(UnknownField::new(
                    tag.number,
                    tag.wire_type,
                    Bytes::copy_from_slice(span),
                ));
            }
        }
    }

    Ok(())
}

/// The last member of a oneof seen on the wire wins
fn clear_oneof_siblings(
    descriptor: &MessageDescriptor,
    message: &mut DynamicMessage,
    field: &FieldDescriptor,
) {
    let Some(oneof) = field.real_oneof_index() else {
        return;
    };
    for sibling in descriptor.fields() {
        if sibling.real_oneof_index() == Some(oneof) && sibling.number() != field.number() {
            message.clear(sibling);
        }
    }
}

fn decode_field(
    pool: &DescriptorPool,
    message: &mut DynamicMessage,
    field: &FieldDescriptor,
    tag: Tag,
    reader: &mut Reader<'_>,
) -> Result<()> {
    if let FieldType::Message(id) = field.field_type() {
        let nested_descriptor = pool.message(*id);
        let (payload, offset) = reader.read_len_delimited(Some(tag.number))?;
        if field.is_list() {
            let mut nested = DynamicMessage::new(nested_descriptor);
            decode_into(pool, nested_descriptor, &mut nested, payload, offset)?;
            message.list_mut(field).push(Value::Message(nested));
        } else {
            // Repeated occurrences of a singular message merge.
            let nested = message.message_mut(field, || DynamicMessage::new(nested_descriptor));
            decode_into(pool, nested_descriptor, nested, payload, offset)?;
        }
        return Ok(());
    }

    if field.is_list() && tag.wire_type == WireType::Len && field.wire_type() != WireType::Len {
        let (payload, offset) = reader.read_len_delimited(Some(tag.number))?;
        let mut packed = Reader::with_base(payload, offset);
        let mut values = Vec::new();
        while !packed.is_empty() {
            values.push(read_scalar(field, &mut packed)?);
        }
        message.list_mut(field).extend(values);
        return Ok(());
    }

    let value = read_scalar(field, reader)?;
    if field.is_list() {
        message.list_mut(field).push(value);
    } else {
        message.put(field, value);
    }
    Ok(())
}

/// Reads one non-message value in `field`'s own wire type
fn read_scalar(field: &FieldDescriptor, reader: &mut Reader<'_>) -> Result<Value> {
    let number = Some(field.number());
    let value = match field.field_type() {
        FieldType::Int32 => Value::I32(reader.read_varint(number)? as i32),
        FieldType::Int64 => Value::I64(reader.read_varint(number)? as i64),
        FieldType::Uint32 => Value::U32(reader.read_varint(number)? as u32),
        FieldType::Uint64 => Value::U64(reader.read_varint(number)?),
        FieldType::Sint32 => {
            Value::I32(wire::zigzag_decode32(reader.read_varint(number)? as u32))
        }
        FieldType::Sint64 => Value::I64(wire::zigzag_decode64(reader.read_varint(number)?)),
        FieldType::Bool => Value::Bool(reader.read_varint(number)? != 0),
        FieldType::Enum(_) => Value::EnumNumber(reader.read_varint(number)? as i32),
        FieldType::Fixed32 => Value::U32(reader.read_fixed32(number)?),
        FieldType::Sfixed32 => Value::I32(reader.read_fixed32(number)? as i32),
        FieldType::Float => Value::F32(f32::from_bits(reader.read_fixed32(number)?)),
        FieldType::Fixed64 => Value::U64(reader.read_fixed64(number)?),
        FieldType::Sfixed64 => Value::I64(reader.read_fixed64(number)? as i64),
        FieldType::Double => Value::F64(f64::from_bits(reader.read_fixed64(number)?)),
        FieldType::String => {
            let (payload, offset) = reader.read_len_delimited(number)?;
            let text = std::str::from_utf8(payload).map_err(|e| Error::InvalidUtf8 {
                offset: offset + e.valid_up_to(),
                field: field.number(),
            })?;
            Value::String(text.to_string())
        }
        FieldType::Bytes => {
            let (payload, _) = reader.read_len_delimited(number)?;
            Value::Bytes(Bytes::copy_from_slice(payload))
        }
        FieldType::Message(_) => {
            return Err(Error::type_mismatch(field.full_name(), "a scalar field"));
        }
    };
    Ok(value)
}
