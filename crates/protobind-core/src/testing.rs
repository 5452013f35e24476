//! Descriptor fixtures shared by the unit tests.
//!
//! The same serialized set feeds both our compiler and prost-reflect, which
//! serves as the reference encoder in byte-exact comparisons.

use crate::compiler::Compiler;
use crate::descriptor::DescriptorPool;
use prost::Message;
use prost_types::descriptor_proto::ExtensionRange;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FieldOptions, FileDescriptorProto, FileDescriptorSet, MethodDescriptorProto,
    OneofDescriptorProto, ServiceDescriptorProto,
};

pub(crate) fn field(name: &str, number: i32, label: Label, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

pub(crate) fn typed_field(
    name: &str,
    number: i32,
    label: Label,
    ty: Type,
    type_name: &str,
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, label, ty)
    }
}

pub(crate) fn packed(mut field: FieldDescriptorProto, packed: bool) -> FieldDescriptorProto {
    field.options = Some(FieldOptions {
        packed: Some(packed),
        ..Default::default()
    });
    field
}

pub(crate) fn with_default(mut field: FieldDescriptorProto, default: &str) -> FieldDescriptorProto {
    field.default_value = Some(default.to_string());
    field
}

pub(crate) fn extension(
    mut field: FieldDescriptorProto,
    extendee: &str,
) -> FieldDescriptorProto {
    field.extendee = Some(extendee.to_string());
    field
}

pub(crate) fn in_oneof(mut field: FieldDescriptorProto, index: i32) -> FieldDescriptorProto {
    field.oneof_index = Some(index);
    field
}

/// A proto3 `optional` field, wrapped in synthetic oneof `index`
pub(crate) fn proto3_optional(field: FieldDescriptorProto, index: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        proto3_optional: Some(true),
        ..in_oneof(field, index)
    }
}

pub(crate) fn oneof(name: &str) -> OneofDescriptorProto {
    OneofDescriptorProto {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

pub(crate) fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

pub(crate) fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: values
            .iter()
            .map(|(name, number)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(*number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub(crate) fn extension_range(start: i32, end_inclusive: i32) -> ExtensionRange {
    ExtensionRange {
        start: Some(start),
        end: Some(end_inclusive + 1),
        ..Default::default()
    }
}

pub(crate) fn file(name: &str, package: &str, messages: Vec<DescriptorProto>) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some(package.to_string()),
        message_type: messages,
        syntax: Some("proto2".to_string()),
        ..Default::default()
    }
}

fn simple_file() -> FileDescriptorProto {
    use Label::Optional;
    file(
        "test/simple.proto",
        "test",
        vec![message(
            "Simple",
            vec![
                field("string", 1, Optional, Type::String),
                field("int32", 2, Optional, Type::Int32),
                field("double", 3, Optional, Type::Double),
                field("float", 4, Optional, Type::Float),
                field("int64", 5, Optional, Type::Int64),
                field("uint64", 6, Optional, Type::Uint64),
                field("fixed64", 7, Optional, Type::Fixed64),
                field("fixed32", 8, Optional, Type::Fixed32),
                field("bool", 9, Optional, Type::Bool),
                field("bytes", 10, Optional, Type::Bytes),
                field("uint32", 11, Optional, Type::Uint32),
                field("sfixed32", 12, Optional, Type::Sfixed32),
                field("sfixed64", 13, Optional, Type::Sfixed64),
                field("sint32", 14, Optional, Type::Sint32),
                field("sint64", 15, Optional, Type::Sint64),
            ],
        )],
    )
}

fn repeated_file() -> FileDescriptorProto {
    use Label::{Optional, Repeated};
    let mut repeated = message(
        "Repeated",
        vec![
            field("string", 1, Repeated, Type::String),
            field("int", 2, Repeated, Type::Int32),
            typed_field("nested", 3, Repeated, Type::Message, ".test.Repeated.Nested"),
            packed(field("packed", 4, Repeated, Type::Int32), true),
            packed(field("packed_sint", 5, Repeated, Type::Sint64), true),
            packed(field("packed_double", 6, Repeated, Type::Double), true),
        ],
    );
    repeated
        .nested_type
        .push(message("Nested", vec![field("id", 1, Optional, Type::Int32)]));
    file("test/repeated.proto", "test", vec![repeated])
}

fn complex_file() -> FileDescriptorProto {
    use Label::{Optional, Repeated};
    let mut complex = message(
        "Complex",
        vec![
            typed_field("enum", 1, Optional, Type::Enum, ".test.Complex.Enum"),
            typed_field("nested", 2, Optional, Type::Message, ".test.Complex.Nested"),
            typed_field("enums", 3, Repeated, Type::Enum, ".test.Complex.Enum"),
            typed_field("child", 4, Optional, Type::Message, ".test.Complex"),
            with_default(field("with_default", 5, Optional, Type::String), "hello"),
            with_default(
                typed_field("enum_default", 6, Optional, Type::Enum, ".test.Complex.Enum"),
                "BAR",
            ),
        ],
    );
    complex
        .nested_type
        .push(message("Nested", vec![field("foo", 1, Optional, Type::String)]));
    complex
        .enum_type
        .push(enumeration("Enum", &[("FOO", 1), ("BAR", 2), ("BAZ", 10)]));
    file("test/complex.proto", "test", vec![complex])
}

fn addressbook_file() -> FileDescriptorProto {
    use Label::{Optional, Repeated, Required};
    let mut addressbook = file(
        "test/addressbook.proto",
        "test",
        vec![
            message(
                "PhoneNumber",
                vec![
                    field("number", 1, Required, Type::String),
                    with_default(
                        typed_field("type", 2, Optional, Type::Enum, ".test.PhoneType"),
                        "HOME",
                    ),
                ],
            ),
            message(
                "Person",
                vec![
                    field("name", 1, Required, Type::String),
                    field("id", 2, Required, Type::Int32),
                    field("email", 3, Optional, Type::String),
                    typed_field("phone", 4, Repeated, Type::Message, ".test.PhoneNumber"),
                ],
            ),
            message(
                "AddressBook",
                vec![typed_field("person", 1, Repeated, Type::Message, ".test.Person")],
            ),
        ],
    );
    addressbook
        .enum_type
        .push(enumeration("PhoneType", &[("MOBILE", 0), ("HOME", 1), ("WORK", 2)]));
    addressbook.service.push(ServiceDescriptorProto {
        name: Some("Directory".to_string()),
        method: vec![MethodDescriptorProto {
            name: Some("Lookup".to_string()),
            input_type: Some(".test.Person".to_string()),
            output_type: Some(".test.AddressBook".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    });
    addressbook
}

fn extension_file() -> FileDescriptorProto {
    use Label::Optional;
    let mut ext_a = message("ExtA", vec![field("first", 1, Optional, Type::String)]);
    ext_a.extension_range.push(extension_range(100, 200));

    let mut ext_b = message("ExtB", Vec::new());
    ext_b.extension.push(extension(
        field("second", 100, Optional, Type::String),
        ".test.ExtA",
    ));
    file("test/extension.proto", "test", vec![ext_a, ext_b])
}

fn proto3_file() -> FileDescriptorProto {
    use Label::{Optional, Repeated};
    let mut scalars = message(
        "Scalar3",
        vec![
            field("count", 1, Optional, Type::Int32),
            field("label", 2, Optional, Type::String),
            typed_field("kind", 3, Optional, Type::Enum, ".test3.Scalar3.Kind"),
            field("ratio", 4, Optional, Type::Double),
            field("data", 5, Optional, Type::Bytes),
            typed_field("child", 6, Optional, Type::Message, ".test3.Scalar3"),
            in_oneof(field("number", 7, Optional, Type::Int32), 0),
            in_oneof(field("text", 8, Optional, Type::String), 0),
            proto3_optional(field("maybe", 9, Optional, Type::Int32), 1),
        ],
    );
    scalars.oneof_decl = vec![oneof("choice"), oneof("_maybe")];
    scalars
        .enum_type
        .push(enumeration("Kind", &[("KIND_UNSPECIFIED", 0), ("KIND_ONE", 1)]));

    let mut proto3 = file(
        "test/proto3.proto",
        "test3",
        vec![
            message(
                "Packed3",
                vec![
                    field("values", 1, Repeated, Type::Int32),
                    field("zig", 2, Repeated, Type::Sint64),
                    packed(field("loose", 3, Repeated, Type::Uint32), false),
                    field("names", 4, Repeated, Type::String),
                ],
            ),
            scalars,
        ],
    );
    proto3.syntax = Some("proto3".to_string());
    proto3
}

/// Every fixture file, dependencies first
pub(crate) fn fixture_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![
            simple_file(),
            repeated_file(),
            complex_file(),
            addressbook_file(),
            extension_file(),
            proto3_file(),
        ],
    }
}

pub(crate) fn encode_set(set: &FileDescriptorSet) -> Vec<u8> {
    set.encode_to_vec()
}

/// The fixtures linked by our compiler
pub(crate) fn fixture_pool() -> DescriptorPool {
    Compiler::new()
        .compile_descriptor_set(&encode_set(&fixture_set()))
        .expect("fixtures link")
        .into_pool()
}

/// The fixtures loaded by the reference implementation
pub(crate) fn reference_pool() -> prost_reflect::DescriptorPool {
    prost_reflect::DescriptorPool::decode(encode_set(&fixture_set()).as_slice())
        .expect("reference pool accepts fixtures")
}
