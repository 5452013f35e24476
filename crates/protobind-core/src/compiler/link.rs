//! Two-phase linking of file descriptor protos into a [`DescriptorPool`].
//!
//! Phase one allocates a slot for every message and enum so that forward,
//! self and mutually recursive references resolve. Phase two fills in enum
//! values, fields, extensions and services. Errors are collected per file;
//! files whose dependencies failed are skipped without further noise.

use crate::descriptor::{
    DescriptorPool, EnumId, EnumValue, FieldDescriptor, FieldType, FileDescriptor, Label,
    MessageId, MethodDescriptor, ServiceDescriptor, Syntax, TypeRef,
};
use crate::error::{Error, Result};
use crate::message::Value;
use bytes::Bytes;
use prost_types::field_descriptor_proto::{Label as ProtoLabel, Type as ProtoType};
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

// Field numbers inside descriptor.proto, used to address source locations.
const FILE_MESSAGE_TYPE: i32 = 4;
const FILE_ENUM_TYPE: i32 = 5;
const FILE_EXTENSION: i32 = 7;
const MESSAGE_FIELD: i32 = 2;
const MESSAGE_NESTED_TYPE: i32 = 3;
const MESSAGE_ENUM_TYPE: i32 = 4;
const MESSAGE_EXTENSION: i32 = 6;

struct FileContext {
    syntax: Syntax,
    package: String,
    comments: HashMap<Vec<i32>, String>,
}

struct PendingMessage<'a> {
    id: MessageId,
    proto: &'a DescriptorProto,
    file: usize,
    path: Vec<i32>,
}

struct PendingEnum<'a> {
    id: EnumId,
    proto: &'a EnumDescriptorProto,
    file: usize,
    path: Vec<i32>,
}

struct PendingExtension<'a> {
    proto: &'a FieldDescriptorProto,
    scope: Option<MessageId>,
    scope_name: String,
    file: usize,
    path: Vec<i32>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

pub(crate) struct Linker<'a> {
    protos: HashMap<&'a str, &'a FileDescriptorProto>,
    pool: DescriptorPool,
    contexts: Vec<FileContext>,
    messages: Vec<PendingMessage<'a>>,
    enums: Vec<PendingEnum<'a>>,
    extensions: Vec<PendingExtension<'a>>,
    failed: HashSet<String>,
    errors: Vec<Error>,
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

/// Convert a snake_case name to lowerCamelCase
pub(crate) fn to_lower_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

impl<'a> Linker<'a> {
    pub(crate) fn new(files: &'a [FileDescriptorProto]) -> Self {
        let mut linker = Self {
            protos: HashMap::new(),
            pool: DescriptorPool::default(),
            contexts: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            failed: HashSet::new(),
            errors: Vec::new(),
        };
        for file in files {
            if linker.protos.insert(file.name(), file).is_some() {
                linker
                    .errors
                    .push(Error::schema(file.name(), "file is defined more than once"));
            }
        }
        linker
    }

    /// Links the dependency closure of `roots`, returning the pool and the
    /// linked file names in dependency order.
    pub(crate) fn link(mut self, roots: &[String]) -> Result<(DescriptorPool, Vec<String>)> {
        let order = self.order(roots);
        debug!("Linking {} files ({} roots)", order.len(), roots.len());

        for name in &order {
            self.declare_file(name);
        }
        self.populate_enums();
        self.populate_messages();
        self.populate_extensions();
        for name in &order {
            self.populate_services(name);
        }

        Error::collect(self.errors)?;
        Ok((self.pool, order))
    }

    /// Depth-first closure over imports, dependencies before dependents.
    fn order(&mut self, roots: &[String]) -> Vec<String> {
        let mut state = HashMap::new();
        let mut order = Vec::new();
        for root in roots {
            if !self.protos.contains_key(root.as_str()) {
                self.errors.push(Error::MissingDependency {
                    file: "<input>".to_string(),
                    dependency: root.clone(),
                });
                continue;
            }
            self.visit(root, &mut state, &mut order);
        }
        order
    }

    fn visit(&mut self, name: &str, state: &mut HashMap<String, Visit>, order: &mut Vec<String>) {
        match state.get(name) {
            Some(Visit::Done) => return,
            Some(Visit::InProgress) => {
                self.errors
                    .push(Error::schema(name, "import cycle detected"));
                self.failed.insert(name.to_string());
                return;
            }
            None => {}
        }
        state.insert(name.to_string(), Visit::InProgress);

        let proto = self.protos[name];
        for dependency in &proto.dependency {
            if !self.protos.contains_key(dependency.as_str()) {
                self.errors.push(Error::MissingDependency {
                    file: name.to_string(),
                    dependency: dependency.clone(),
                });
                self.failed.insert(name.to_string());
                continue;
            }
            self.visit(dependency, state, order);
            if self.failed.contains(dependency.as_str()) {
                self.failed.insert(name.to_string());
            }
        }

        state.insert(name.to_string(), Visit::Done);
        order.push(name.to_string());
    }

    fn record(&mut self, file: &str, result: Result<()>) {
        if let Err(e) = result {
            self.failed.insert(file.to_string());
            self.errors.push(e);
        }
    }

    fn declare_file(&mut self, name: &str) {
        if self.failed.contains(name) {
            trace!("Skipping {}: a dependency failed to link", name);
            return;
        }
        let proto: &'a FileDescriptorProto = self.protos[name];
        let result = self.declare_file_types(proto);
        self.record(name, result);
    }

    fn declare_file_types(&mut self, proto: &'a FileDescriptorProto) -> Result<()> {
        let syntax = Syntax::try_from(proto.syntax())
            .map_err(|_| Error::schema(proto.name(), format!("unsupported syntax '{}'", proto.syntax())))?;
        let index = self.pool.add_file(FileDescriptor {
            name: proto.name().to_string(),
            package: proto.package().to_string(),
            syntax,
            dependencies: proto.dependency.clone(),
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            services: Vec::new(),
        })?;

        let comments = proto
            .source_code_info
            .iter()
            .flat_map(|info| &info.location)
            .filter_map(|location| {
                let text = location.leading_comments.as_deref()?.trim();
                (!text.is_empty()).then(|| (location.path.clone(), text.to_string()))
            })
            .collect();
        self.contexts.push(FileContext {
            syntax,
            package: proto.package().to_string(),
            comments,
        });

        let package = proto.package();
        for (i, message) in proto.message_type.iter().enumerate() {
            self.declare_message(message, package, None, index, vec![FILE_MESSAGE_TYPE, i as i32])?;
        }
        for (i, enum_type) in proto.enum_type.iter().enumerate() {
            self.declare_enum(enum_type, package, None, index, vec![FILE_ENUM_TYPE, i as i32])?;
        }
        for (i, extension) in proto.extension.iter().enumerate() {
            self.extensions.push(PendingExtension {
                proto: extension,
                scope: None,
                scope_name: package.to_string(),
                file: index,
                path: vec![FILE_EXTENSION, i as i32],
            });
        }
        Ok(())
    }

    fn declare_message(
        &mut self,
        proto: &'a DescriptorProto,
        scope: &str,
        parent: Option<MessageId>,
        file: usize,
        path: Vec<i32>,
    ) -> Result<()> {
        let name = proto.name();
        if name.is_empty() {
            return Err(Error::schema(scope, "message without a name"));
        }
        let full_name = qualify(scope, name);
        let id = self.pool.reserve_message(name, &full_name, file, parent)?;
        trace!("Declared message {}", full_name);

        {
            let comments = self.contexts[file].comments.get(&path).cloned();
            let message = self.pool.message_mut(id);
            message.comments = comments;
            message.map_entry = proto
                .options
                .as_ref()
                .and_then(|o| o.map_entry)
                .unwrap_or(false);
            for range in &proto.extension_range {
                let (start, end) = (range.start(), range.end());
                if start <= 0 || end <= start {
                    return Err(Error::schema(
                        &full_name,
                        format!("invalid extension range {} to {}", start, end),
                    ));
                }
                message.extension_ranges.push(start as u32..end as u32);
            }
            for range in &proto.reserved_range {
                let (start, end) = (range.start(), range.end());
                if start <= 0 || end <= start {
                    return Err(Error::schema(
                        &full_name,
                        format!("invalid reserved range {} to {}", start, end),
                    ));
                }
                message.reserved_ranges.push(start as u32..end as u32);
            }
            message.reserved_names = proto.reserved_name.clone();
            message.oneofs = proto
                .oneof_decl
                .iter()
                .map(|oneof| oneof.name().to_string())
                .collect();
        }

        for (i, nested) in proto.nested_type.iter().enumerate() {
            let mut nested_path = path.clone();
            nested_path.extend([MESSAGE_NESTED_TYPE, i as i32]);
            self.declare_message(nested, &full_name, Some(id), file, nested_path)?;
        }
        for (i, enum_type) in proto.enum_type.iter().enumerate() {
            let mut enum_path = path.clone();
            enum_path.extend([MESSAGE_ENUM_TYPE, i as i32]);
            self.declare_enum(enum_type, &full_name, Some(id), file, enum_path)?;
        }
        for (i, extension) in proto.extension.iter().enumerate() {
            let mut ext_path = path.clone();
            ext_path.extend([MESSAGE_EXTENSION, i as i32]);
            self.extensions.push(PendingExtension {
                proto: extension,
                scope: Some(id),
                scope_name: full_name.clone(),
                file,
                path: ext_path,
            });
        }

        self.messages.push(PendingMessage {
            id,
            proto,
            file,
            path,
        });
        Ok(())
    }

    fn declare_enum(
        &mut self,
        proto: &'a EnumDescriptorProto,
        scope: &str,
        parent: Option<MessageId>,
        file: usize,
        path: Vec<i32>,
    ) -> Result<()> {
        let name = proto.name();
        if name.is_empty() {
            return Err(Error::schema(scope, "enum without a name"));
        }
        let full_name = qualify(scope, name);
        let id = self.pool.reserve_enum(name, &full_name, file, parent)?;
        trace!("Declared enum {}", full_name);
        self.enums.push(PendingEnum {
            id,
            proto,
            file,
            path,
        });
        Ok(())
    }

    fn file_name(&self, file: usize) -> String {
        self.pool.files[file].name.clone()
    }

    fn populate_enums(&mut self) {
        for pending in std::mem::take(&mut self.enums) {
            let values = pending
                .proto
                .value
                .iter()
                .map(|v| EnumValue {
                    name: v.name().to_string(),
                    number: v.number(),
                })
                .collect();
            let comments = self.contexts[pending.file].comments.get(&pending.path).cloned();
            let enum_type = self.pool.enum_mut(pending.id);
            enum_type.comments = comments;
            let result = enum_type.set_values(values);
            let file = self.file_name(pending.file);
            self.record(&file, result);
        }
    }

    fn populate_messages(&mut self) {
        for pending in std::mem::take(&mut self.messages) {
            let file = self.file_name(pending.file);
            for (i, field) in pending.proto.field.iter().enumerate() {
                let mut path = pending.path.clone();
                path.extend([MESSAGE_FIELD, i as i32]);
                let result = self.add_field(pending.id, pending.file, field, path);
                self.record(&file, result);
            }
        }
    }

    fn add_field(
        &mut self,
        id: MessageId,
        file: usize,
        proto: &FieldDescriptorProto,
        path: Vec<i32>,
    ) -> Result<()> {
        let owner = self.pool.message(id);
        let owner_name = owner.full_name.clone();
        if let Some(extendee) = proto.extendee.as_deref().filter(|e| !e.is_empty()) {
            return Err(Error::schema(
                qualify(&owner_name, proto.name()),
                format!("regular field declares extendee '{}'", extendee),
            ));
        }
        let sibling = qualify(&owner_name, proto.name());
        if self.pool.types.contains_key(&sibling) {
            return Err(Error::schema(
                &sibling,
                "field name collides with a nested type",
            ));
        }

        let field = self.build_field(proto, &owner_name, id, &owner_name, file, false, &path)?;
        self.pool.message_mut(id).add_field(field)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_field(
        &self,
        proto: &FieldDescriptorProto,
        scope: &str,
        containing: MessageId,
        containing_name: &str,
        file: usize,
        extension: bool,
        path: &[i32],
    ) -> Result<FieldDescriptor> {
        let name = proto.name();
        let full_name = qualify(scope, name);
        if name.is_empty() {
            return Err(Error::schema(scope, "field without a name"));
        }
        if proto.number() <= 0 {
            return Err(Error::schema(
                &full_name,
                format!("field number {} is not allowed", proto.number()),
            ));
        }
        let number = proto.number() as u32;

        let label = match proto.label() {
            ProtoLabel::Optional => Label::Optional,
            ProtoLabel::Required => Label::Required,
            ProtoLabel::Repeated => Label::Repeated,
        };

        let (field_type, type_name) = self.resolve_field_type(proto, scope, &full_name)?;
        let context = &self.contexts[file];

        let explicit_packed = proto.options.as_ref().and_then(|o| o.packed);
        if explicit_packed == Some(true) && !(label == Label::Repeated && field_type.is_packable()) {
            return Err(Error::schema(
                &full_name,
                "[packed = true] is only valid for repeated scalar numeric fields",
            ));
        }
        let packed = label == Label::Repeated
            && field_type.is_packable()
            && explicit_packed.unwrap_or(context.syntax == Syntax::Proto3);

        let proto3_optional = proto.proto3_optional();
        if proto3_optional && context.syntax != Syntax::Proto3 {
            return Err(Error::schema(
                &full_name,
                "proto3_optional is only valid in proto3 files",
            ));
        }
        let oneof = match proto.oneof_index {
            None if proto3_optional => {
                return Err(Error::schema(
                    &full_name,
                    "proto3 optional field is not wrapped in a oneof",
                ));
            }
            None => None,
            Some(_) if extension => {
                return Err(Error::schema(&full_name, "extensions cannot belong to a oneof"));
            }
            Some(_) if label != Label::Optional => {
                return Err(Error::schema(
                    &full_name,
                    "oneof members must be singular and not required",
                ));
            }
            Some(index) => {
                let declared = self.pool.message(containing).oneofs.len();
                match usize::try_from(index) {
                    Ok(index) if index < declared => Some(index),
                    _ => {
                        return Err(Error::schema(
                            &full_name,
                            format!("oneof index {} is out of range", index),
                        ));
                    }
                }
            }
        };
        let implicit_presence = context.syntax == Syntax::Proto3
            && label == Label::Optional
            && !matches!(field_type, FieldType::Message(_))
            && !extension
            && oneof.is_none();

        let declared_default = proto.default_value.clone();
        let default = match (&declared_default, label, field_type) {
            (Some(_), Label::Repeated, _) | (Some(_), _, FieldType::Message(_)) => {
                return Err(Error::schema(
                    &full_name,
                    "only singular scalar fields may declare a default",
                ));
            }
            (Some(text), _, _) => Some(
                self.parse_default(&field_type, text)
                    .map_err(|details| Error::schema(&full_name, details))?,
            ),
            (None, _, FieldType::Enum(id)) => {
                Some(Value::EnumNumber(self.pool.enum_type(id).default_number()))
            }
            (None, _, field_type) => Value::default_for(&field_type),
        };

        let json_name = proto
            .json_name
            .clone()
            .unwrap_or_else(|| to_lower_camel_case(name));

        Ok(FieldDescriptor {
            name: name.to_string(),
            json_name,
            full_name,
            number,
            label,
            field_type,
            type_name,
            packed,
            default,
            declared_default,
            containing,
            containing_name: containing_name.to_string(),
            extension,
            oneof,
            proto3_optional,
            implicit_presence,
            comments: context.comments.get(path).cloned(),
        })
    }

    fn resolve_field_type(
        &self,
        proto: &FieldDescriptorProto,
        scope: &str,
        full_name: &str,
    ) -> Result<(FieldType, Option<String>)> {
        let scalar = match proto.r#type {
            None => None,
            Some(_) => match proto.r#type() {
                ProtoType::Double => Some(FieldType::Double),
                ProtoType::Float => Some(FieldType::Float),
                ProtoType::Int64 => Some(FieldType::Int64),
                ProtoType::Uint64 => Some(FieldType::Uint64),
                ProtoType::Int32 => Some(FieldType::Int32),
                ProtoType::Fixed64 => Some(FieldType::Fixed64),
                ProtoType::Fixed32 => Some(FieldType::Fixed32),
                ProtoType::Bool => Some(FieldType::Bool),
                ProtoType::String => Some(FieldType::String),
                ProtoType::Bytes => Some(FieldType::Bytes),
                ProtoType::Uint32 => Some(FieldType::Uint32),
                ProtoType::Sfixed32 => Some(FieldType::Sfixed32),
                ProtoType::Sfixed64 => Some(FieldType::Sfixed64),
                ProtoType::Sint32 => Some(FieldType::Sint32),
                ProtoType::Sint64 => Some(FieldType::Sint64),
                ProtoType::Group => {
                    return Err(Error::schema(full_name, "group fields are not supported"));
                }
                ProtoType::Message | ProtoType::Enum => None,
            },
        };
        if let Some(scalar) = scalar {
            return Ok((scalar, None));
        }

        let type_name = proto.type_name();
        let resolved = self
            .resolve_name(scope, type_name)
            .ok_or_else(|| Error::unresolved_type(full_name, type_name))?;

        let field_type = match (proto.r#type.map(|_| proto.r#type()), resolved) {
            (None | Some(ProtoType::Message), TypeRef::Message(id)) => FieldType::Message(id),
            (None | Some(ProtoType::Enum), TypeRef::Enum(id)) => FieldType::Enum(id),
            (_, TypeRef::Message(_)) => {
                return Err(Error::schema(full_name, format!("'{}' is not an enum", type_name)));
            }
            (_, TypeRef::Enum(_)) => {
                return Err(Error::schema(full_name, format!("'{}' is not a message", type_name)));
            }
        };
        let qualified = match resolved {
            TypeRef::Message(id) => self.pool.message(id).full_name.clone(),
            TypeRef::Enum(id) => self.pool.enum_type(id).full_name.clone(),
        };
        Ok((field_type, Some(qualified)))
    }

    /// Resolves a type reference the way protoc scopes names: fully
    /// qualified when it starts with a dot, otherwise searched from the
    /// innermost enclosing scope outwards.
    fn resolve_name(&self, scope: &str, name: &str) -> Option<TypeRef> {
        if name.is_empty() {
            return None;
        }
        if let Some(absolute) = name.strip_prefix('.') {
            return self.pool.resolve_type(absolute);
        }
        let mut scope = scope;
        loop {
            if let Some(found) = self.pool.resolve_type(&qualify(scope, name)) {
                return Some(found);
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rfind('.').map(|i| &scope[..i]).unwrap_or("");
        }
    }

    fn parse_default(&self, field_type: &FieldType, text: &str) -> std::result::Result<Value, String> {
        let invalid = || format!("invalid {} default '{}'", field_type.name(), text);
        let value = match field_type {
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => {
                Value::I32(text.parse().map_err(|_| invalid())?)
            }
            FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => {
                Value::I64(text.parse().map_err(|_| invalid())?)
            }
            FieldType::Uint32 | FieldType::Fixed32 => {
                Value::U32(text.parse().map_err(|_| invalid())?)
            }
            FieldType::Uint64 | FieldType::Fixed64 => {
                Value::U64(text.parse().map_err(|_| invalid())?)
            }
            FieldType::Float => Value::F32(parse_float(text).ok_or_else(invalid)? as f32),
            FieldType::Double => Value::F64(parse_float(text).ok_or_else(invalid)?),
            FieldType::Bool => match text {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            FieldType::String => Value::String(text.to_string()),
            FieldType::Bytes => Value::Bytes(unescape_bytes(text).ok_or_else(invalid)?),
            FieldType::Enum(id) => {
                let enum_type = self.pool.enum_type(*id);
                let value = enum_type.value_by_name(text).ok_or_else(|| {
                    format!("default '{}' is not a value of '{}'", text, enum_type.full_name)
                })?;
                Value::EnumNumber(value.number)
            }
            FieldType::Message(_) => return Err("message fields have no default".to_string()),
        };
        Ok(value)
    }

    fn populate_extensions(&mut self) {
        for pending in std::mem::take(&mut self.extensions) {
            let file = self.file_name(pending.file);
            let result = self.add_extension(&pending);
            self.record(&file, result);
        }
    }

    fn add_extension(&mut self, pending: &PendingExtension<'_>) -> Result<()> {
        let proto = pending.proto;
        let full_name = qualify(&pending.scope_name, proto.name());
        let extendee_name = proto.extendee();
        let extendee = match self.resolve_name(&pending.scope_name, extendee_name) {
            Some(TypeRef::Message(id)) => id,
            Some(TypeRef::Enum(_)) => {
                return Err(Error::schema(
                    &full_name,
                    format!("extendee '{}' is an enum", extendee_name),
                ));
            }
            None => return Err(Error::unresolved_type(&full_name, extendee_name)),
        };
        let containing_name = self.pool.message(extendee).full_name.clone();

        let field = self.build_field(
            proto,
            &pending.scope_name,
            extendee,
            &containing_name,
            pending.file,
            true,
            &pending.path,
        )?;
        if field.label == Label::Required {
            return Err(Error::schema(&full_name, "extensions cannot be required"));
        }
        trace!("Registering extension {} on {}", full_name, containing_name);
        self.pool.add_extension(field, pending.scope, pending.file)?;
        Ok(())
    }

    fn populate_services(&mut self, name: &str) {
        if self.failed.contains(name) {
            return;
        }
        let Some(&index) = self.pool.file_names.get(name) else {
            return;
        };
        let proto: &'a FileDescriptorProto = self.protos[name];
        for service in &proto.service {
            let result = self.add_service(index, service);
            self.record(name, result);
        }
    }

    fn add_service(&mut self, file: usize, proto: &prost_types::ServiceDescriptorProto) -> Result<()> {
        let package = self.contexts[file].package.clone();
        let full_name = qualify(&package, proto.name());

        let mut methods = Vec::with_capacity(proto.method.len());
        for method in &proto.method {
            let method_name = qualify(&full_name, method.name());
            let resolve = |type_name: &str| match self.resolve_name(&package, type_name) {
                Some(TypeRef::Message(id)) => Ok(id),
                _ => Err(Error::unresolved_type(&method_name, type_name)),
            };
            methods.push(MethodDescriptor {
                name: method.name().to_string(),
                input: resolve(method.input_type())?,
                output: resolve(method.output_type())?,
                client_streaming: method.client_streaming(),
                server_streaming: method.server_streaming(),
            });
        }

        self.pool.add_service(
            file,
            ServiceDescriptor {
                name: proto.name().to_string(),
                full_name,
                methods,
            },
        )
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

/// Reverses the C-style escaping protoc applies to `bytes` defaults.
fn unescape_bytes(text: &str) -> Option<Bytes> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next()? {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'v' => out.push(0x0B),
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'?' => out.push(b'?'),
            b'x' | b'X' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while let Some(d) = bytes.peek().and_then(|c| (*c as char).to_digit(16)) {
                    if digits == 2 {
                        break;
                    }
                    value = value * 16 + d;
                    digits += 1;
                    bytes.next();
                }
                if digits == 0 {
                    return None;
                }
                out.push(value as u8);
            }
            first @ b'0'..=b'7' => {
                let mut value = (first - b'0') as u32;
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(c @ b'0'..=b'7') => {
                            value = value * 8 + (c - b'0') as u32;
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            _ => return None,
        }
    }
    Some(Bytes::from(out))
}
