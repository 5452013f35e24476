//! Dynamically typed field values.

use super::DynamicMessage;
use crate::descriptor::{FieldDescriptor, FieldType};
use bytes::Bytes;

/// A single field value, or the whole contents of a repeated field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `bool`
    Bool(bool),
    /// `int32`, `sint32`, `sfixed32`
    I32(i32),
    /// `int64`, `sint64`, `sfixed64`
    I64(i64),
    /// `uint32`, `fixed32`
    U32(u32),
    /// `uint64`, `fixed64`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Bytes),
    /// Enum number, known to the enum descriptor or not
    EnumNumber(i32),
    /// Embedded message, owned exclusively by its parent
    Message(DynamicMessage),
    /// Elements of a repeated field, in wire order
    List(Vec<Value>),
}

impl Value {
    /// The zero value of a scalar type; `None` for message types.
    pub fn default_for(field_type: &FieldType) -> Option<Value> {
        let value = match field_type {
            FieldType::Bool => Value::Bool(false),
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => Value::I32(0),
            FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => Value::I64(0),
            FieldType::Uint32 | FieldType::Fixed32 => Value::U32(0),
            FieldType::Uint64 | FieldType::Fixed64 => Value::U64(0),
            FieldType::Float => Value::F32(0.0),
            FieldType::Double => Value::F64(0.0),
            FieldType::String => Value::String(String::new()),
            FieldType::Bytes => Value::Bytes(Bytes::new()),
            FieldType::Enum(_) => Value::EnumNumber(0),
            FieldType::Message(_) => return None,
        };
        Some(value)
    }

    /// Returns true if this value can be stored as one element of `field`.
    ///
    /// Lists are never valid elements; use [`Value::is_valid_for_field`] to
    /// check a whole field value.
    pub fn is_valid_element(&self, field: &FieldDescriptor) -> bool {
        match (field.field_type(), self) {
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32, Value::I32(_)) => true,
            (FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64, Value::I64(_)) => true,
            (FieldType::Uint32 | FieldType::Fixed32, Value::U32(_)) => true,
            (FieldType::Uint64 | FieldType::Fixed64, Value::U64(_)) => true,
            (FieldType::Float, Value::F32(_)) => true,
            (FieldType::Double, Value::F64(_)) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Bytes, Value::Bytes(_)) => true,
            (FieldType::Enum(_), Value::EnumNumber(_)) => true,
            (FieldType::Message(_), Value::Message(message)) => {
                field.type_name() == Some(message.type_name())
            }
            _ => false,
        }
    }

    /// Returns true if this value can be stored as the whole value of `field`.
    pub fn is_valid_for_field(&self, field: &FieldDescriptor) -> bool {
        match (field.is_list(), self) {
            (true, Value::List(values)) => values.iter().all(|v| v.is_valid_element(field)),
            (true, _) => false,
            (false, value) => value.is_valid_element(field),
        }
    }

    /// Returns the value as a `bool`, if it is one
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as an `i32`, if it is one
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::I32(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as an `i64`, if it is one
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as a `u32`, if it is one
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::U32(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as a `u64`, if it is one
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U64(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as an `f32`, if it is one
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as an `f64`, if it is one
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as bytes, if it is one
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the enum number, if this is an enum value
    pub fn as_enum_number(&self) -> Option<i32> {
        match *self {
            Value::EnumNumber(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the embedded message, if this is one
    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the embedded message mutably, if this is one
    pub fn as_message_mut(&mut self) -> Option<&mut DynamicMessage> {
        match self {
            Value::Message(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the list elements, if this is a repeated value
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<DynamicMessage> for Value {
    fn from(v: DynamicMessage) -> Self {
        Value::Message(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}
