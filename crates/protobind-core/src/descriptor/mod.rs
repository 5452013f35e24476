//! In-memory descriptor model.
//!
//! Descriptors live in a [`DescriptorPool`] arena and refer to each other by
//! stable ids ([`MessageId`], [`EnumId`], [`ExtensionId`]), which lets
//! self-referential and mutually recursive types link without owning cycles.
//! A pool is produced once by the [`Compiler`](crate::compiler::Compiler) and
//! is read-only afterwards.

mod pool;

use crate::error::{Error, Result};
use crate::message::Value;
use crate::wire::{self, WireType};
use std::collections::HashMap;
use std::ops::Range;

pub use pool::{DescriptorPool, TypeRef};

/// Index of a message in its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub(crate) usize);

/// Index of an enum in its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnumId(pub(crate) usize);

/// Index of an extension field in its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtensionId(pub(crate) usize);

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Proto2 syntax
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl Syntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for Syntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(Syntax::Proto2),
            "proto3" => Ok(Syntax::Proto3),
            _ => Err(Error::schema("syntax", format!("unsupported syntax '{}'", value))),
        }
    }
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// At most one value
    Optional,
    /// Exactly one value (proto2)
    Required,
    /// Any number of values
    Repeated,
}

impl Label {
    /// Keyword used in schema text
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Optional => "optional",
            Label::Required => "required",
            Label::Repeated => "repeated",
        }
    }
}

/// Declared field type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    Uint32,
    /// `uint64`
    Uint64,
    /// `sint32`
    Sint32,
    /// `sint64`
    Sint64,
    /// `fixed32`
    Fixed32,
    /// `fixed64`
    Fixed64,
    /// `sfixed32`
    Sfixed32,
    /// `sfixed64`
    Sfixed64,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `bytes`
    Bytes,
    /// `float`
    Float,
    /// `double`
    Double,
    /// Reference to an enum
    Enum(EnumId),
    /// Reference to a message
    Message(MessageId),
}

impl FieldType {
    /// Wire type of a single (unpacked) value
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Int32
            | FieldType::Int64
            | FieldType::Uint32
            | FieldType::Uint64
            | FieldType::Sint32
            | FieldType::Sint64
            | FieldType::Bool
            | FieldType::Enum(_) => WireType::Varint,
            FieldType::Fixed64 | FieldType::Sfixed64 | FieldType::Double => WireType::I64,
            FieldType::Fixed32 | FieldType::Sfixed32 | FieldType::Float => WireType::I32,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => WireType::Len,
        }
    }

    /// Returns true for scalar numeric types, which may use packed encoding
    pub fn is_packable(&self) -> bool {
        self.wire_type() != WireType::Len
    }

    /// Returns true for the integer types that JSON renders as strings
    pub fn is_64bit_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Int64
                | FieldType::Uint64
                | FieldType::Sint64
                | FieldType::Fixed64
                | FieldType::Sfixed64
        )
    }

    /// Keyword used in schema text (`enum`/`message` for references)
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Uint32 => "uint32",
            FieldType::Uint64 => "uint64",
            FieldType::Sint32 => "sint32",
            FieldType::Sint64 => "sint64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Fixed64 => "fixed64",
            FieldType::Sfixed32 => "sfixed32",
            FieldType::Sfixed64 => "sfixed64",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Enum(_) => "enum",
            FieldType::Message(_) => "message",
        }
    }
}

/// A field of a message, or an extension field
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) json_name: String,
    pub(crate) full_name: String,
    pub(crate) number: u32,
    pub(crate) label: Label,
    pub(crate) field_type: FieldType,
    /// Resolved qualified name of the enum or message type
    pub(crate) type_name: Option<String>,
    pub(crate) packed: bool,
    pub(crate) default: Option<Value>,
    pub(crate) declared_default: Option<String>,
    pub(crate) containing: MessageId,
    pub(crate) containing_name: String,
    pub(crate) extension: bool,
    /// Index into the containing message's oneofs
    pub(crate) oneof: Option<usize>,
    pub(crate) proto3_optional: bool,
    /// Set for proto3 singular fields without `optional`, outside any oneof
    pub(crate) implicit_presence: bool,
    pub(crate) comments: Option<String>,
}

impl FieldDescriptor {
    /// Schema name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// JSON name (lowerCamelCase unless overridden in the schema)
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Field number
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Cardinality
    pub fn label(&self) -> Label {
        self.label
    }

    /// Declared type
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Wire type of a single value
    pub fn wire_type(&self) -> WireType {
        self.field_type.wire_type()
    }

    /// Qualified name of the referenced enum or message type
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Returns true for repeated fields
    pub fn is_list(&self) -> bool {
        self.label == Label::Repeated
    }

    /// Returns true if repeated values are encoded as one packed run
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    /// Returns true if this field is an extension
    pub fn is_extension(&self) -> bool {
        self.extension
    }

    /// The message this field belongs to (the extendee, for extensions)
    pub fn containing_message(&self) -> MessageId {
        self.containing
    }

    /// Qualified name of [`Self::containing_message`]
    pub fn containing_type(&self) -> &str {
        &self.containing_name
    }

    /// Value reported for an absent singular scalar field.
    ///
    /// This is the declared default when there is one, the type's zero value
    /// otherwise (the first declared value for enums). Message fields have none.
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The default exactly as written in the schema
    pub fn declared_default(&self) -> Option<&str> {
        self.declared_default.as_deref()
    }

    /// Index of the oneof this field belongs to.
    ///
    /// A proto3 `optional` field reports the synthetic oneof protoc wraps it in.
    pub fn oneof_index(&self) -> Option<usize> {
        self.oneof
    }

    /// Index of the declared oneof this field belongs to, ignoring the
    /// synthetic oneof of a proto3 `optional` field
    pub fn real_oneof_index(&self) -> Option<usize> {
        self.oneof.filter(|_| !self.proto3_optional)
    }

    /// Returns true for a proto3 field declared `optional`
    pub fn is_proto3_optional(&self) -> bool {
        self.proto3_optional
    }

    /// Returns true if a singular value equal to the zero value is still
    /// distinguishable from an absent one
    pub fn has_presence(&self) -> bool {
        !self.is_list() && !self.implicit_presence
    }

    /// Returns true if `value` is the zero value of a field without presence.
    ///
    /// Such values are left out when encoding.
    pub fn is_implicit_default(&self, value: &Value) -> bool {
        self.implicit_presence && Value::default_for(&self.field_type).as_ref() == Some(value)
    }

    /// Leading source comment, when the schema carried source info
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }
}

/// A message type
#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    pub(crate) id: MessageId,
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) file: usize,
    pub(crate) parent: Option<MessageId>,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) by_number: HashMap<u32, usize>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) by_json_name: HashMap<String, usize>,
    pub(crate) nested_messages: Vec<MessageId>,
    pub(crate) nested_enums: Vec<EnumId>,
    pub(crate) scoped_extensions: Vec<ExtensionId>,
    pub(crate) extension_ranges: Vec<Range<u32>>,
    pub(crate) reserved_ranges: Vec<Range<u32>>,
    pub(crate) reserved_names: Vec<String>,
    pub(crate) map_entry: bool,
    pub(crate) oneofs: Vec<String>,
    pub(crate) comments: Option<String>,
}

impl MessageDescriptor {
    pub(crate) fn shell(
        id: MessageId,
        name: impl Into<String>,
        full_name: impl Into<String>,
        file: usize,
        parent: Option<MessageId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            full_name: full_name.into(),
            file,
            parent,
            fields: Vec::new(),
            by_number: HashMap::new(),
            by_name: HashMap::new(),
            by_json_name: HashMap::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            scoped_extensions: Vec::new(),
            extension_ranges: Vec::new(),
            reserved_ranges: Vec::new(),
            reserved_names: Vec::new(),
            map_entry: false,
            oneofs: Vec::new(),
            comments: None,
        }
    }

    /// Adds a regular field, enforcing number and name uniqueness.
    pub(crate) fn add_field(&mut self, field: FieldDescriptor) -> Result<()> {
        let number = field.number;
        if !wire::is_valid_field_number(number) {
            return Err(Error::schema(
                &field.full_name,
                format!("field number {} is not allowed", number),
            ));
        }
        if let Some(range) = self.reserved_ranges.iter().find(|r| r.contains(&number)) {
            return Err(Error::schema(
                &field.full_name,
                format!(
                    "field number {} is reserved ({} to {})",
                    number,
                    range.start,
                    range.end - 1
                ),
            ));
        }
        if self.reserved_names.iter().any(|n| n == &field.name) {
            return Err(Error::schema(
                &field.full_name,
                format!("field name '{}' is reserved", field.name),
            ));
        }
        if self.extension_ranges.iter().any(|r| r.contains(&number)) {
            return Err(Error::schema(
                &field.full_name,
                format!("field number {} lies in an extension range", number),
            ));
        }
        if let Some(&existing) = self.by_number.get(&number) {
            return Err(Error::schema(
                &field.full_name,
                format!(
                    "field number {} is already used by '{}'",
                    number, self.fields[existing].name
                ),
            ));
        }
        if self.by_name.contains_key(&field.name) {
            return Err(Error::schema(
                &field.full_name,
                format!("duplicate field name '{}'", field.name),
            ));
        }

        let index = self.fields.len();
        self.by_number.insert(number, index);
        self.by_name.insert(field.name.clone(), index);
        self.by_json_name.entry(field.json_name.clone()).or_insert(index);
        self.fields.push(field);
        Ok(())
    }

    /// Position of this message in its pool
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name, without a leading dot
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Enclosing message, for nested types
    pub fn parent(&self) -> Option<MessageId> {
        self.parent
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Names of the declared oneofs, synthetic ones included, by index
    pub fn oneofs(&self) -> &[String] {
        &self.oneofs
    }

    /// Looks up a field by number
    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    /// Looks up a field by schema name, falling back to the JSON name
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name
            .get(name)
            .or_else(|| self.by_json_name.get(name))
            .map(|&i| &self.fields[i])
    }

    /// Nested message types
    pub fn nested_messages(&self) -> &[MessageId] {
        &self.nested_messages
    }

    /// Nested enum types
    pub fn nested_enums(&self) -> &[EnumId] {
        &self.nested_enums
    }

    /// Extensions declared inside this message's scope (not necessarily extending it)
    pub fn scoped_extensions(&self) -> &[ExtensionId] {
        &self.scoped_extensions
    }

    /// Half-open number ranges open to extensions
    pub fn extension_ranges(&self) -> &[Range<u32>] {
        &self.extension_ranges
    }

    /// Returns true if `number` lies in a declared extension range
    pub fn is_extension_number(&self, number: u32) -> bool {
        self.extension_ranges.iter().any(|r| r.contains(&number))
    }

    /// Half-open reserved number ranges
    pub fn reserved_ranges(&self) -> &[Range<u32>] {
        &self.reserved_ranges
    }

    /// Reserved field names
    pub fn reserved_names(&self) -> &[String] {
        &self.reserved_names
    }

    /// Returns true for the synthetic entry types generated for map fields
    pub fn is_map_entry(&self) -> bool {
        self.map_entry
    }

    /// Leading source comment
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }
}

/// One symbolic value of an enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    /// Symbolic name
    pub name: String,
    /// Integer value
    pub number: i32,
}

/// An enum type
#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    pub(crate) id: EnumId,
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) file: usize,
    pub(crate) parent: Option<MessageId>,
    pub(crate) values: Vec<EnumValue>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) by_number: HashMap<i32, usize>,
    pub(crate) comments: Option<String>,
}

impl EnumDescriptor {
    pub(crate) fn shell(
        id: EnumId,
        name: impl Into<String>,
        full_name: impl Into<String>,
        file: usize,
        parent: Option<MessageId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            full_name: full_name.into(),
            file,
            parent,
            values: Vec::new(),
            by_name: HashMap::new(),
            by_number: HashMap::new(),
            comments: None,
        }
    }

    /// Installs the declared values. Aliases keep the first name per number.
    pub(crate) fn set_values(&mut self, values: Vec<EnumValue>) -> Result<()> {
        if values.is_empty() {
            return Err(Error::schema(&self.full_name, "enum declares no values"));
        }
        for (index, value) in values.iter().enumerate() {
            if self.by_name.insert(value.name.clone(), index).is_some() {
                return Err(Error::schema(
                    &self.full_name,
                    format!("duplicate enum value name '{}'", value.name),
                ));
            }
            self.by_number.entry(value.number).or_insert(index);
        }
        self.values = values;
        Ok(())
    }

    /// Position of this enum in its pool
    pub fn id(&self) -> EnumId {
        self.id
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Enclosing message, for nested enums
    pub fn parent(&self) -> Option<MessageId> {
        self.parent
    }

    /// Values in declaration order
    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    /// Looks up a value by number
    pub fn value_by_number(&self, number: i32) -> Option<&EnumValue> {
        self.by_number.get(&number).map(|&i| &self.values[i])
    }

    /// Looks up a value by symbolic name
    pub fn value_by_name(&self, name: &str) -> Option<&EnumValue> {
        self.by_name.get(name).map(|&i| &self.values[i])
    }

    /// Number of the first declared value
    pub fn default_number(&self) -> i32 {
        self.values.first().map(|v| v.number).unwrap_or(0)
    }

    /// Leading source comment
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }
}

/// An RPC method
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub(crate) name: String,
    pub(crate) input: MessageId,
    pub(crate) output: MessageId,
    pub(crate) client_streaming: bool,
    pub(crate) server_streaming: bool,
}

impl MethodDescriptor {
    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request message type
    pub fn input(&self) -> MessageId {
        self.input
    }

    /// Response message type
    pub fn output(&self) -> MessageId {
        self.output
    }

    /// Returns true if the client sends a stream
    pub fn is_client_streaming(&self) -> bool {
        self.client_streaming
    }

    /// Returns true if the server sends a stream
    pub fn is_server_streaming(&self) -> bool {
        self.server_streaming
    }
}

/// An RPC service
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Methods in declaration order
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }
}

/// A linked `.proto` file
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub(crate) name: String,
    pub(crate) package: String,
    pub(crate) syntax: Syntax,
    pub(crate) dependencies: Vec<String>,
    pub(crate) messages: Vec<MessageId>,
    pub(crate) enums: Vec<EnumId>,
    pub(crate) extensions: Vec<ExtensionId>,
    pub(crate) services: Vec<ServiceDescriptor>,
}

impl FileDescriptor {
    /// File name relative to its include path
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package, possibly empty
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Syntax version
    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Imported file names
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Top-level messages
    pub fn messages(&self) -> &[MessageId] {
        &self.messages
    }

    /// Top-level enums
    pub fn enums(&self) -> &[EnumId] {
        &self.enums
    }

    /// Top-level extensions
    pub fn extensions(&self) -> &[ExtensionId] {
        &self.extensions
    }

    /// Services
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, number: u32) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            json_name: name.to_string(),
            full_name: format!("test.M.{}", name),
            number,
            label: Label::Optional,
            field_type: FieldType::Int32,
            type_name: None,
            packed: false,
            default: Some(Value::I32(0)),
            declared_default: None,
            containing: MessageId(0),
            containing_name: "test.M".to_string(),
            extension: false,
            oneof: None,
            proto3_optional: false,
            implicit_presence: false,
            comments: None,
        }
    }

    fn message() -> MessageDescriptor {
        MessageDescriptor::shell(MessageId(0), "M", "test.M", 0, None)
    }

    #[test]
    fn test_add_field_lookups() {
        let mut msg = message();
        let mut f = field("my_field", 3);
        f.json_name = "myField".to_string();
        msg.add_field(f).unwrap();

        assert_eq!(msg.field(3).unwrap().name(), "my_field");
        assert_eq!(msg.field_by_name("my_field").unwrap().number(), 3);
        assert_eq!(msg.field_by_name("myField").unwrap().number(), 3);
        assert!(msg.field(4).is_none());
    }

    #[test]
    fn test_implicit_presence() {
        let mut f = field("f", 1);
        assert!(f.has_presence());
        assert!(!f.is_implicit_default(&Value::I32(0)));

        f.implicit_presence = true;
        assert!(!f.has_presence());
        assert!(f.is_implicit_default(&Value::I32(0)));
        assert!(!f.is_implicit_default(&Value::I32(1)));

        let mut g = field("g", 2);
        g.oneof = Some(0);
        g.proto3_optional = true;
        assert_eq!(g.oneof_index(), Some(0));
        assert_eq!(g.real_oneof_index(), None);
    }

    #[test]
    fn test_add_field_rejects_invalid_numbers() {
        let mut msg = message();
        assert!(matches!(
            msg.add_field(field("zero", 0)),
            Err(Error::SchemaError { .. })
        ));
        assert!(msg.add_field(field("reserved", 19_500)).is_err());
        assert!(msg.add_field(field("huge", wire::MAX_FIELD_NUMBER + 1)).is_err());

        msg.reserved_ranges.push(10..20);
        assert!(msg.add_field(field("declared_reserved", 15)).is_err());

        msg.extension_ranges.push(100..200);
        assert!(msg.add_field(field("in_ext_range", 150)).is_err());
    }

    #[test]
    fn test_add_field_rejects_duplicates() {
        let mut msg = message();
        msg.add_field(field("a", 1)).unwrap();
        assert!(msg.add_field(field("b", 1)).is_err());
        assert!(msg.add_field(field("a", 2)).is_err());
    }

    #[test]
    fn test_enum_values() {
        let mut e = EnumDescriptor::shell(EnumId(0), "E", "test.E", 0, None);
        assert!(e.clone().set_values(Vec::new()).is_err());

        e.set_values(vec![
            EnumValue { name: "FOO".into(), number: 1 },
            EnumValue { name: "BAR".into(), number: 2 },
            EnumValue { name: "ALIAS".into(), number: 1 },
        ])
        .unwrap();
        assert_eq!(e.default_number(), 1);
        assert_eq!(e.value_by_number(1).unwrap().name, "FOO");
        assert_eq!(e.value_by_name("ALIAS").unwrap().number, 1);
        assert!(e.value_by_number(7).is_none());
    }

    #[test]
    fn test_field_type_wire_types() {
        assert_eq!(FieldType::Sint64.wire_type(), WireType::Varint);
        assert_eq!(FieldType::Double.wire_type(), WireType::I64);
        assert_eq!(FieldType::Float.wire_type(), WireType::I32);
        assert_eq!(FieldType::Bytes.wire_type(), WireType::Len);
        assert!(FieldType::Enum(EnumId(0)).is_packable());
        assert!(!FieldType::String.is_packable());
        assert!(FieldType::Fixed64.is_64bit_integer());
        assert!(!FieldType::Fixed32.is_64bit_integer());
    }

    #[test]
    fn test_syntax() {
        assert_eq!(Syntax::try_from("").unwrap(), Syntax::Proto2);
        assert_eq!(Syntax::try_from("proto3").unwrap(), Syntax::Proto3);
        assert!(Syntax::try_from("proto4").is_err());
    }
}
