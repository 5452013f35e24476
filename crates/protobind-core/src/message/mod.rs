//! Mutable field-value container for one message occurrence.
//!
//! A [`DynamicMessage`] only remembers the qualified name of its type. Every
//! accessor takes the [`FieldDescriptor`] it operates on, resolved through the
//! number and name maps of a linked [`MessageDescriptor`]:
//!
//! | field kind | accessors |
//! |------------|-----------|
//! | singular   | [`get`], [`set`], [`has`], [`clear`] |
//! | repeated   | [`list`], [`push`], [`set`], [`clear`] |
//! | extension  | [`get_extension`], [`set_extension`], [`push_extension`], [`has_extension`], [`clear_extension`] |
//!
//! [`get`]: DynamicMessage::get
//! [`set`]: DynamicMessage::set
//! [`has`]: DynamicMessage::has
//! [`clear`]: DynamicMessage::clear
//! [`list`]: DynamicMessage::list
//! [`push`]: DynamicMessage::push
//! [`get_extension`]: DynamicMessage::get_extension
//! [`set_extension`]: DynamicMessage::set_extension
//! [`push_extension`]: DynamicMessage::push_extension
//! [`has_extension`]: DynamicMessage::has_extension
//! [`clear_extension`]: DynamicMessage::clear_extension

mod value;

use crate::descriptor::{FieldDescriptor, MessageDescriptor, MessageId};
use crate::error::{Error, Result};
use crate::wire::WireType;
use bytes::Bytes;
use std::collections::BTreeMap;

pub use value::Value;

/// Identity of an extension value: the extended type plus the field number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtensionKey {
    /// The extended message type
    pub extendee: MessageId,
    /// The extension's field number
    pub number: u32,
}

impl ExtensionKey {
    /// Key under which `field` is stored
    pub fn of(field: &FieldDescriptor) -> Self {
        Self {
            extendee: field.containing_message(),
            number: field.number(),
        }
    }
}

/// A field that was present on the wire but absent from the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    number: u32,
    wire_type: WireType,
    data: Bytes,
}

impl UnknownField {
    /// Creates an unknown field from its complete encoded span (tag included)
    pub fn new(number: u32, wire_type: WireType, data: impl Into<Bytes>) -> Self {
        Self {
            number,
            wire_type,
            data: data.into(),
        }
    }

    /// Field number from the tag
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Wire type from the tag
    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// The tag and payload bytes exactly as they were read
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Unknown fields in the order they were encountered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFieldSet {
    fields: Vec<UnknownField>,
}

impl UnknownFieldSet {
    /// Appends a field
    pub fn push(&mut self, field: UnknownField) {
        self.fields.push(field);
    }

    /// Iterates over the retained fields
    pub fn iter(&self) -> std::slice::Iter<'_, UnknownField> {
        self.fields.iter()
    }

    /// Number of retained fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if nothing was retained
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total encoded size of the retained fields
    pub fn encoded_len(&self) -> usize {
        self.fields.iter().map(|f| f.data.len()).sum()
    }

    /// Drops every retained field
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

impl<'a> IntoIterator for &'a UnknownFieldSet {
    type Item = &'a UnknownField;
    type IntoIter = std::slice::Iter<'a, UnknownField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// One message occurrence with its decoded or user-assigned values.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    type_name: String,
    fields: BTreeMap<u32, Value>,
    extensions: BTreeMap<ExtensionKey, Value>,
    unknown: UnknownFieldSet,
}

impl DynamicMessage {
    /// Creates an empty instance of the given message type
    pub fn new(descriptor: &MessageDescriptor) -> Self {
        Self {
            type_name: descriptor.full_name().to_string(),
            fields: BTreeMap::new(),
            extensions: BTreeMap::new(),
            unknown: UnknownFieldSet::default(),
        }
    }

    /// Qualified name of the message type, used to look up its descriptor
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns true when no field, extension or unknown field is present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.extensions.is_empty() && self.unknown.is_empty()
    }

    fn check_field(&self, field: &FieldDescriptor, extension: bool) -> Result<()> {
        if field.containing_type() != self.type_name {
            return Err(Error::type_mismatch(
                field.full_name(),
                format!("a field of '{}'", self.type_name),
            ));
        }
        if field.is_extension() != extension {
            let expected = if extension {
                "an extension field"
            } else {
                "a regular field (use the extension accessors)"
            };
            return Err(Error::type_mismatch(field.full_name(), expected));
        }
        Ok(())
    }

    fn check_value(field: &FieldDescriptor, value: &Value) -> Result<()> {
        if value.is_valid_for_field(field) {
            return Ok(());
        }
        let expected = if field.is_list() {
            format!("a list of {} values", field.field_type().name())
        } else {
            format!("a {} value", field.field_type().name())
        };
        Err(Error::type_mismatch(field.full_name(), expected))
    }

    fn check_element(field: &FieldDescriptor, value: &Value) -> Result<()> {
        if !field.is_list() {
            return Err(Error::type_mismatch(field.full_name(), "a repeated field"));
        }
        if !value.is_valid_element(field) {
            return Err(Error::type_mismatch(
                field.full_name(),
                format!("a {} element", field.field_type().name()),
            ));
        }
        Ok(())
    }

    /// Returns true if a regular field is present
    pub fn has(&self, field: &FieldDescriptor) -> bool {
        self.fields.contains_key(&field.number()) && !field.is_extension()
    }

    /// Returns the value of a regular field, if present
    pub fn get(&self, field: &FieldDescriptor) -> Option<&Value> {
        if field.is_extension() {
            return None;
        }
        self.fields.get(&field.number())
    }

    /// Returns a mutable reference to a present regular field
    pub fn get_mut(&mut self, field: &FieldDescriptor) -> Option<&mut Value> {
        if field.is_extension() {
            return None;
        }
        self.fields.get_mut(&field.number())
    }

    /// Returns the value of a field, or its declared default when absent.
    ///
    /// Absent message fields have no default and yield `None`.
    pub fn get_or_default(&self, field: &FieldDescriptor) -> Option<Value> {
        let stored = if field.is_extension() {
            self.extensions.get(&ExtensionKey::of(field))
        } else {
            self.fields.get(&field.number())
        };
        match stored {
            Some(value) => Some(value.clone()),
            None if field.is_list() => Some(Value::List(Vec::new())),
            None => field.default_value().cloned(),
        }
    }

    /// Sets a regular field, replacing any previous value.
    ///
    /// Repeated fields take a [`Value::List`].
    pub fn set(&mut self, field: &FieldDescriptor, value: impl Into<Value>) -> Result<()> {
        self.check_field(field, false)?;
        let value = value.into();
        Self::check_value(field, &value)?;
        self.fields.insert(field.number(), value);
        Ok(())
    }

    /// Removes a regular field and returns its value
    pub fn clear(&mut self, field: &FieldDescriptor) -> Option<Value> {
        if field.is_extension() {
            return None;
        }
        self.fields.remove(&field.number())
    }

    /// Elements of a repeated regular field; empty when absent
    pub fn list(&self, field: &FieldDescriptor) -> &[Value] {
        self.get(field).and_then(Value::as_list).unwrap_or(&[])
    }

    /// Appends one element to a repeated regular field
    pub fn push(&mut self, field: &FieldDescriptor, value: impl Into<Value>) -> Result<()> {
        self.check_field(field, false)?;
        let value = value.into();
        Self::check_element(field, &value)?;
        self.list_mut(field).push(value);
        Ok(())
    }

    /// Returns true if an extension is present
    pub fn has_extension(&self, extension: &FieldDescriptor) -> bool {
        self.extensions.contains_key(&ExtensionKey::of(extension))
    }

    /// Returns the value of an extension, if present
    pub fn get_extension(&self, extension: &FieldDescriptor) -> Option<&Value> {
        if !extension.is_extension() {
            return None;
        }
        self.extensions.get(&ExtensionKey::of(extension))
    }

    /// Sets an extension, replacing any previous value
    pub fn set_extension(
        &mut self,
        extension: &FieldDescriptor,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.check_field(extension, true)?;
        let value = value.into();
        Self::check_value(extension, &value)?;
        self.extensions.insert(ExtensionKey::of(extension), value);
        Ok(())
    }

    /// Appends one element to a repeated extension
    pub fn push_extension(
        &mut self,
        extension: &FieldDescriptor,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.check_field(extension, true)?;
        let value = value.into();
        Self::check_element(extension, &value)?;
        self.list_mut(extension).push(value);
        Ok(())
    }

    /// Elements of a repeated extension; empty when absent
    pub fn extension_list(&self, extension: &FieldDescriptor) -> &[Value] {
        self.get_extension(extension)
            .and_then(Value::as_list)
            .unwrap_or(&[])
    }

    /// Removes an extension and returns its value
    pub fn clear_extension(&mut self, extension: &FieldDescriptor) -> Option<Value> {
        self.extensions.remove(&ExtensionKey::of(extension))
    }

    /// Present regular fields in field-number order
    pub fn fields(&self) -> impl Iterator<Item = (u32, &Value)> + '_ {
        self.fields.iter().map(|(number, value)| (*number, value))
    }

    /// Present extensions in field-number order
    pub fn extensions(&self) -> impl Iterator<Item = (ExtensionKey, &Value)> + '_ {
        self.extensions.iter().map(|(key, value)| (*key, value))
    }

    /// Fields retained from the wire that the descriptor does not describe
    pub fn unknown_fields(&self) -> &UnknownFieldSet {
        &self.unknown
    }

    /// Drops retained unknown fields, recursively.
    pub fn clear_unknown_fields(&mut self) {
        self.unknown.clear();
        for value in self.fields.values_mut().chain(self.extensions.values_mut()) {
            match value {
                Value::Message(message) => message.clear_unknown_fields(),
                Value::List(values) => values
                    .iter_mut()
                    .filter_map(Value::as_message_mut)
                    .for_each(DynamicMessage::clear_unknown_fields),
                _ => {}
            }
        }
    }

    fn slot_mut(&mut self, field: &FieldDescriptor) -> Option<&mut Value> {
        if field.is_extension() {
            self.extensions.get_mut(&ExtensionKey::of(field))
        } else {
            self.fields.get_mut(&field.number())
        }
    }

    /// Stores a value without validation. Decoders only build valid values.
    pub(crate) fn put(&mut self, field: &FieldDescriptor, value: Value) {
        if field.is_extension() {
            self.extensions.insert(ExtensionKey::of(field), value);
        } else {
            self.fields.insert(field.number(), value);
        }
    }

    /// The element list of a repeated field, created empty when absent.
    pub(crate) fn list_mut(&mut self, field: &FieldDescriptor) -> &mut Vec<Value> {
        if !matches!(self.slot_mut(field), Some(Value::List(_))) {
            self.put(field, Value::List(Vec::new()));
        }
        match self.slot_mut(field) {
            Some(Value::List(values)) => values,
            _ => unreachable!("repeated slot was just initialised"),
        }
    }

    /// The embedded message of a singular field, created by `init` when absent.
    pub(crate) fn message_mut(
        &mut self,
        field: &FieldDescriptor,
        init: impl FnOnce() -> DynamicMessage,
    ) -> &mut DynamicMessage {
        if !matches!(self.slot_mut(field), Some(Value::Message(_))) {
            self.put(field, Value::Message(init()));
        }
        match self.slot_mut(field) {
            Some(Value::Message(message)) => message,
            _ => unreachable!("message slot was just initialised"),
        }
    }

    pub(crate) fn push_unknown(&mut self, field: UnknownField) {
        self.unknown.push(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_pool;

    #[test]
    fn test_singular_accessors() {
        let pool = fixture_pool();
        let simple = pool.get_message_by_name("test.Simple").unwrap();
        let string = simple.field_by_name("string").unwrap();
        let int32 = simple.field_by_name("int32").unwrap();

        let mut msg = DynamicMessage::new(simple);
        assert!(msg.is_empty());
        assert!(!msg.has(string));
        assert_eq!(msg.get_or_default(int32), Some(Value::I32(0)));

        msg.set(string, "foo").unwrap();
        msg.set(int32, -123_456_789).unwrap();
        assert!(msg.has(string));
        assert_eq!(msg.get(string).and_then(Value::as_str), Some("foo"));
        assert_eq!(msg.get(int32).and_then(Value::as_i32), Some(-123_456_789));

        assert!(matches!(
            msg.set(int32, "not a number"),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(msg.clear(string), Some(Value::from("foo")));
        assert!(!msg.has(string));
    }

    #[test]
    fn test_repeated_accessors() {
        let pool = fixture_pool();
        let repeated = pool.get_message_by_name("test.Repeated").unwrap();
        let int = repeated.field_by_name("int").unwrap();
        let string = repeated.field_by_name("string").unwrap();

        let mut msg = DynamicMessage::new(repeated);
        assert!(msg.list(int).is_empty());

        msg.push(int, 1).unwrap();
        msg.push(int, 2).unwrap();
        assert_eq!(msg.list(int), &[Value::I32(1), Value::I32(2)]);

        // Present but empty is distinct from absent.
        msg.set(string, Value::List(Vec::new())).unwrap();
        assert!(msg.has(string));
        assert!(msg.list(string).is_empty());

        assert!(msg.set(int, 5).is_err());
        assert!(msg.push(int, "five").is_err());
    }

    #[test]
    fn test_field_of_other_type_rejected() {
        let pool = fixture_pool();
        let simple = pool.get_message_by_name("test.Simple").unwrap();
        let repeated = pool.get_message_by_name("test.Repeated").unwrap();
        let foreign = repeated.field_by_name("int").unwrap();

        let mut msg = DynamicMessage::new(simple);
        assert!(matches!(
            msg.push(foreign, 1),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_nested_message_type_checked() {
        let pool = fixture_pool();
        let complex = pool.get_message_by_name("test.Complex").unwrap();
        let nested_field = complex.field_by_name("nested").unwrap();
        let nested = pool.get_message_by_name("test.Complex.Nested").unwrap();

        let mut msg = DynamicMessage::new(complex);
        msg.set(nested_field, DynamicMessage::new(nested)).unwrap();
        assert!(msg
            .set(nested_field, DynamicMessage::new(complex))
            .is_err());
    }

    #[test]
    fn test_extension_accessors() {
        let pool = fixture_pool();
        let ext_a = pool.get_message_by_name("test.ExtA").unwrap();
        let first = ext_a.field_by_name("first").unwrap();
        let second = pool.get_extension_by_name("test.ExtB.second").unwrap();

        let mut msg = DynamicMessage::new(ext_a);
        msg.set(first, "FIRST").unwrap();
        msg.set_extension(second, "SECOND").unwrap();

        assert!(msg.has_extension(second));
        assert_eq!(
            msg.get_extension(second).and_then(Value::as_str),
            Some("SECOND")
        );
        // Extensions are not reachable through the regular accessors.
        assert!(msg.get(second).is_none());
        assert!(msg.set(second, "x").is_err());
        assert!(msg.set_extension(first, "x").is_err());

        let keys: Vec<_> = msg.extensions().map(|(key, _)| key.number).collect();
        assert_eq!(keys, vec![second.number()]);
        assert_eq!(msg.clear_extension(second), Some(Value::from("SECOND")));
        assert!(!msg.has_extension(second));
    }
}
