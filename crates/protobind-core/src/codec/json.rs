//! JSON codec.
//!
//! Messages map to JSON objects keyed by schema field names. Extensions use
//! the bracketed qualified name (`"[pkg.ext]"`). Conversions follow the
//! usual protobuf JSON conventions where they do not conflict with that:
//!
//! | field type | JSON |
//! |------------|------|
//! | 32-bit integers | number |
//! | 64-bit integers | decimal string |
//! | float, double | number, or `"NaN"`, `"Infinity"`, `"-Infinity"` |
//! | bytes | standard base64 |
//! | enum | value name, or the number when it is not declared |
//!
//! Unknown binary fields have no JSON form and are dropped on encode. Proto3
//! fields without presence are omitted while they hold their zero value.

use super::Codec;
use crate::descriptor::{DescriptorPool, FieldDescriptor, FieldType, MessageDescriptor};
use crate::error::{Error, Result};
use crate::message::{DynamicMessage, Value};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde_json::{Map, Number, Value as Json};
use tracing::{debug, trace};

/// Codec for the JSON representation
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Creates a codec producing compact output
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables indented output
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Converts a message to a JSON value
    pub fn to_json(&self, pool: &DescriptorPool, message: &DynamicMessage) -> Result<Json> {
        message_to_json(pool, message)
    }

    /// Builds a message of type `type_name` from a JSON value
    pub fn from_json(
        &self,
        pool: &DescriptorPool,
        type_name: &str,
        json: &Json,
    ) -> Result<DynamicMessage> {
        let descriptor = pool.get_message_by_name(type_name)?;
        message_from_json(pool, descriptor, json)
    }
}

impl Codec for JsonCodec {
    fn encode(&self, pool: &DescriptorPool, message: &DynamicMessage) -> Result<Vec<u8>> {
        let json = message_to_json(pool, message)?;
        if !message.unknown_fields().is_empty() {
            debug!(
                "Dropping {} unknown fields of {} in JSON output",
                message.unknown_fields().len(),
                message.type_name()
            );
        }
        let out = if self.pretty {
            serde_json::to_vec_pretty(&json)?
        } else {
            serde_json::to_vec(&json)?
        };
        Ok(out)
    }

    fn decode(
        &self,
        pool: &DescriptorPool,
        type_name: &str,
        data: &[u8],
    ) -> Result<DynamicMessage> {
        let descriptor = pool.get_message_by_name(type_name)?;
        let json: Json = serde_json::from_slice(data)?;
        debug!("Decoding JSON document as {}", descriptor.full_name());
        message_from_json(pool, descriptor, &json)
    }
}

fn message_to_json(pool: &DescriptorPool, message: &DynamicMessage) -> Result<Json> {
    let descriptor = pool.get_message_by_name(message.type_name())?;
    let mut object = Map::new();

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
        object.insert(field.name().to_string(), field_to_json(pool, field, value)?);
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
        object.insert(
            format!("[{}]", extension.full_name()),
            field_to_json(pool, extension, value)?,
        );
    }

    Ok(Json::Object(object))
}

fn field_to_json(pool: &DescriptorPool, field: &FieldDescriptor, value: &Value) -> Result<Json> {
    match value {
        Value::List(values) if field.is_list() => values
            .iter()
            .map(|element| element_to_json(pool, field, element))
            .collect::<Result<Vec<_>>>()
            .map(Json::Array),
        _ if field.is_list() => Err(Error::type_mismatch(field.full_name(), "a list value")),
        _ => element_to_json(pool, field, value),
    }
}

fn element_to_json(pool: &DescriptorPool, field: &FieldDescriptor, value: &Value) -> Result<Json> {
    let json = match (field.field_type(), value) {
        (_, Value::Bool(v)) => Json::Bool(*v),
        (_, Value::I32(v)) => Json::from(*v),
        (_, Value::U32(v)) => Json::from(*v),
        (_, Value::I64(v)) => Json::String(v.to_string()),
        (_, Value::U64(v)) => Json::String(v.to_string()),
        (_, Value::F32(v)) => {
            // Go through the shortest f32 text so 0.1f32 prints as 0.1.
            let widened = v.to_string().parse::<f64>().unwrap_or(f64::from(*v));
            float_to_json(widened)
        }
        (_, Value::F64(v)) => float_to_json(*v),
        (_, Value::String(s)) => Json::String(s.clone()),
        (_, Value::Bytes(b)) => Json::String(STANDARD.encode(b)),
        (FieldType::Enum(id), Value::EnumNumber(n)) => {
            match pool.enum_type(*id).value_by_number(*n) {
                Some(value) => Json::String(value.name.clone()),
                None => Json::from(*n),
            }
        }
        (_, Value::Message(message)) => message_to_json(pool, message)?,
        _ => {
            return Err(Error::type_mismatch(
                field.full_name(),
                format!("a {} value", field.field_type().name()),
            ));
        }
    };
    Ok(json)
}

fn float_to_json(v: f64) -> Json {
    if v.is_nan() {
        Json::String("NaN".to_string())
    } else if v.is_infinite() {
        let text = if v > 0.0 { "Infinity" } else { "-Infinity" };
        Json::String(text.to_string())
    } else {
        Number::from_f64(v).map_or(Json::Null, Json::Number)
    }
}

fn message_from_json(
    pool: &DescriptorPool,
    descriptor: &MessageDescriptor,
    json: &Json,
) -> Result<DynamicMessage> {
    let Json::Object(object) = json else {
        return Err(Error::invalid_json(
            descriptor.full_name(),
            format!("expected an object, found {}", kind(json)),
        ));
    };

    let mut message = DynamicMessage::new(descriptor);
    for (key, value) in object {
        let Some(field) = lookup(pool, descriptor, key) else {
            debug!("Skipping unknown key '{}' in {}", key, descriptor.full_name());
            continue;
        };
        if value.is_null() {
            continue;
        }
        trace!("Reading {} from key '{}'", field.full_name(), key);

        let decoded = if field.is_list() {
            let Json::Array(elements) = value else {
                return Err(Error::invalid_json(
                    field.full_name(),
                    format!("expected an array, found {}", kind(value)),
                ));
            };
            let values = elements
                .iter()
                .map(|element| element_from_json(pool, field, element))
                .collect::<Result<Vec<_>>>()?;
            Value::List(values)
        } else {
            element_from_json(pool, field, value)?
        };
        message.put(field, decoded);
    }

    Ok(message)
}

/// Resolves an object key to a field or an extension of `descriptor`
fn lookup<'a>(
    pool: &'a DescriptorPool,
    descriptor: &'a MessageDescriptor,
    key: &str,
) -> Option<&'a FieldDescriptor> {
    match key.strip_prefix('[').and_then(|k| k.strip_suffix(']')) {
        Some(name) => pool
            .get_extension_by_name(name)
            .filter(|ext| ext.containing_message() == descriptor.id()),
        None => descriptor.field_by_name(key),
    }
}

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn element_from_json(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    json: &Json,
) -> Result<Value> {
    let invalid = |details: String| Error::invalid_json(field.full_name(), details);
    let expected = |what: &str| invalid(format!("expected {}, found {}", what, kind(json)));

    let value = match field.field_type() {
        FieldType::Bool => Value::Bool(json.as_bool().ok_or_else(|| expected("a boolean"))?),
        FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => {
            let n = json_i64(json).ok_or_else(|| expected("an integer"))?;
            Value::I32(i32::try_from(n).map_err(|_| invalid(format!("{} is out of range", n)))?)
        }
        FieldType::Uint32 | FieldType::Fixed32 => {
            let n = json_u64(json).ok_or_else(|| expected("an unsigned integer"))?;
            Value::U32(u32::try_from(n).map_err(|_| invalid(format!("{} is out of range", n)))?)
        }
        FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => {
            Value::I64(json_i64(json).ok_or_else(|| expected("an integer"))?)
        }
        FieldType::Uint64 | FieldType::Fixed64 => {
            Value::U64(json_u64(json).ok_or_else(|| expected("an unsigned integer"))?)
        }
        FieldType::Float => Value::F32(json_f64(json).ok_or_else(|| expected("a number"))? as f32),
        FieldType::Double => Value::F64(json_f64(json).ok_or_else(|| expected("a number"))?),
        FieldType::String => Value::String(
            json.as_str()
                .ok_or_else(|| expected("a string"))?
                .to_string(),
        ),
        FieldType::Bytes => {
            let text = json.as_str().ok_or_else(|| expected("a base64 string"))?;
            let decoded = STANDARD
                .decode(text)
                .map_err(|e| invalid(format!("invalid base64: {}", e)))?;
            Value::Bytes(Bytes::from(decoded))
        }
        FieldType::Enum(id) => {
            let enum_type = pool.enum_type(*id);
            match json {
                Json::String(name) => {
                    let value = enum_type.value_by_name(name).ok_or_else(|| {
                        invalid(format!(
                            "'{}' is not a value of {}",
                            name,
                            enum_type.full_name()
                        ))
                    })?;
                    Value::EnumNumber(value.number)
                }
                _ => {
                    let n = json_i64(json).ok_or_else(|| expected("an enum name or number"))?;
                    Value::EnumNumber(
                        i32::try_from(n).map_err(|_| invalid(format!("{} is out of range", n)))?,
                    )
                }
            }
        }
        FieldType::Message(id) => {
            Value::Message(message_from_json(pool, pool.message(*id), json)?)
        }
    };
    Ok(value)
}

fn json_i64(json: &Json) -> Option<i64> {
    match json {
        Json::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_u64(json: &Json) -> Option<u64> {
    match json {
        Json::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_f64(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.trim().parse().ok(),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BinaryCodec;
    use crate::testing::fixture_pool;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn field<'a>(pool: &'a DescriptorPool, message: &str, name: &str) -> &'a FieldDescriptor {
        pool.get_message_by_name(message)
            .unwrap()
            .field_by_name(name)
            .unwrap()
    }

    fn new_message(pool: &DescriptorPool, name: &str) -> DynamicMessage {
        DynamicMessage::new(pool.get_message_by_name(name).unwrap())
    }

    #[test]
    fn test_simple_scenario() {
        let pool = fixture_pool();
        let mut msg = new_message(&pool, "test.Simple");
        msg.set(field(&pool, "test.Simple", "string"), "foo").unwrap();
        msg.set(field(&pool, "test.Simple", "int32"), -123456789).unwrap();

        let out = JsonCodec::new().encode(&pool, &msg).unwrap();
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            r#"{"int32":-123456789,"string":"foo"}"#
        );
        assert_eq!(JsonCodec::new().decode(&pool, "test.Simple", &out).unwrap(), msg);
    }

    #[test]
    fn test_scalar_representations() {
        let pool = fixture_pool();
        let f = |name| field(&pool, "test.Simple", name);
        let mut msg = new_message(&pool, "test.Simple");
        msg.set(f("int64"), i64::MIN).unwrap();
        msg.set(f("uint64"), u64::MAX).unwrap();
        msg.set(f("fixed32"), 7u32).unwrap();
        msg.set(f("bytes"), vec![0u8, 1, 2, 255]).unwrap();
        msg.set(f("float"), 0.1f32).unwrap();
        msg.set(f("double"), f64::NEG_INFINITY).unwrap();
        msg.set(f("bool"), true).unwrap();

        let json = JsonCodec::new().to_json(&pool, &msg).unwrap();
        assert_eq!(
            json,
            json!({
                "int64": "-9223372036854775808",
                "uint64": "18446744073709551615",
                "fixed32": 7,
                "bytes": "AAEC/w==",
                "float": 0.1,
                "double": "-Infinity",
                "bool": true,
            })
        );

        let back = JsonCodec::new().from_json(&pool, "test.Simple", &json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_nan_round_trip() {
        let pool = fixture_pool();
        let double = field(&pool, "test.Simple", "double");
        let mut msg = new_message(&pool, "test.Simple");
        msg.set(double, f64::NAN).unwrap();

        let out = JsonCodec::new().encode(&pool, &msg).unwrap();
        assert_eq!(out, br#"{"double":"NaN"}"#);
        let back = JsonCodec::new().decode(&pool, "test.Simple", &out).unwrap();
        assert!(back.get(double).and_then(Value::as_f64).unwrap().is_nan());
    }

    #[test]
    fn test_enums_and_nested_messages() {
        let pool = fixture_pool();
        let mut nested = new_message(&pool, "test.Complex.Nested");
        nested.set(field(&pool, "test.Complex.Nested", "foo"), "bar").unwrap();
        let mut msg = new_message(&pool, "test.Complex");
        msg.set(field(&pool, "test.Complex", "enum"), Value::EnumNumber(10))
            .unwrap();
        msg.set(field(&pool, "test.Complex", "nested"), nested).unwrap();
        let enums = field(&pool, "test.Complex", "enums");
        msg.push(enums, Value::EnumNumber(1)).unwrap();
        msg.push(enums, Value::EnumNumber(42)).unwrap();

        let json = JsonCodec::new().to_json(&pool, &msg).unwrap();
        assert_eq!(
            json,
            json!({
                "enum": "BAZ",
                "nested": { "foo": "bar" },
                "enums": ["FOO", 42],
            })
        );
        assert_eq!(
            JsonCodec::new().from_json(&pool, "test.Complex", &json).unwrap(),
            msg
        );
    }

    #[test]
    fn test_empty_list_is_present() {
        let pool = fixture_pool();
        let string = field(&pool, "test.Repeated", "string");
        let mut msg = new_message(&pool, "test.Repeated");
        msg.set(string, Vec::<Value>::new()).unwrap();

        let out = JsonCodec::new().encode(&pool, &msg).unwrap();
        assert_eq!(out, br#"{"string":[]}"#);
        let back = JsonCodec::new().decode(&pool, "test.Repeated", &out).unwrap();
        assert!(back.has(string));
    }

    #[test]
    fn test_extensions() {
        let pool = fixture_pool();
        let second = pool.get_extension_by_name("test.ExtB.second").unwrap();
        let mut msg = new_message(&pool, "test.ExtA");
        msg.set(field(&pool, "test.ExtA", "first"), "a").unwrap();
        msg.set_extension(second, "b").unwrap();

        let json = JsonCodec::new().to_json(&pool, &msg).unwrap();
        assert_eq!(json, json!({ "first": "a", "[test.ExtB.second]": "b" }));
        let back = JsonCodec::new().from_json(&pool, "test.ExtA", &json).unwrap();
        assert_eq!(back.get_extension(second), Some(&Value::from("b")));
    }

    #[test]
    fn test_proto3_zero_values_are_omitted() {
        let pool = fixture_pool();
        let mut msg = new_message(&pool, "test3.Scalar3");
        msg.set(field(&pool, "test3.Scalar3", "count"), 0).unwrap();
        msg.set(field(&pool, "test3.Scalar3", "label"), "x").unwrap();
        msg.set(field(&pool, "test3.Scalar3", "maybe"), 0).unwrap();

        let json = JsonCodec::new().to_json(&pool, &msg).unwrap();
        assert_eq!(json, json!({ "label": "x", "maybe": 0 }));
    }

    #[test]
    fn test_extension_of_another_type_is_rejected() {
        use crate::compiler::Compiler;
        use crate::testing::{extension, extension_range, field as proto_field, file, message};
        use prost_types::field_descriptor_proto::{Label, Type};

        let extensible = |name: &str| {
            let mut m = message(name, Vec::new());
            m.extension_range.push(extension_range(100, 200));
            m
        };
        let link = |messages, extendee: &str| {
            let mut f = file("t.proto", "t", messages);
            f.extension.push(extension(
                proto_field("e", 100, Label::Optional, Type::Int32),
                extendee,
            ));
            Compiler::new().compile_files(&[f], &["t.proto".to_string()]).unwrap().into_pool()
        };
        // The extendee of `t.e` has the same id in both pools, but a different type
        let own = link(vec![extensible("M")], ".t.M");
        let other = link(vec![extensible("Other"), extensible("M")], ".t.Other");

        let mut msg = new_message(&own, "t.M");
        msg.set_extension(own.get_extension_by_name("t.e").unwrap(), 5).unwrap();
        assert_eq!(
            JsonCodec::new().to_json(&own, &msg).unwrap(),
            json!({ "[t.e]": 5 })
        );
        assert!(matches!(
            JsonCodec::new().to_json(&other, &msg),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            BinaryCodec.encode(&other, &msg),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_lenient_decoding() {
        let pool = fixture_pool();
        let input = json!({
            "withDefault": "x",
            "enum": 2,
            "enums": [1, "BAZ"],
            "nested": null,
            "noSuchField": 5,
            "[test.ExtB.second]": "not an extension of Complex",
        });
        let msg = JsonCodec::new().from_json(&pool, "test.Complex", &input).unwrap();
        assert_eq!(
            msg.get(field(&pool, "test.Complex", "with_default")),
            Some(&Value::from("x"))
        );
        assert_eq!(
            msg.get(field(&pool, "test.Complex", "enum")),
            Some(&Value::EnumNumber(2))
        );
        assert_eq!(
            msg.list(field(&pool, "test.Complex", "enums")),
            [Value::EnumNumber(1), Value::EnumNumber(10)]
        );
        assert!(!msg.has(field(&pool, "test.Complex", "nested")));
        assert_eq!(msg.fields().count(), 3);

        let numbers = json!({ "int32": "42", "int64": 7, "uint32": 3.0, "double": "1.5" });
        let msg = JsonCodec::new().from_json(&pool, "test.Simple", &numbers).unwrap();
        assert_eq!(msg.get(field(&pool, "test.Simple", "int32")), Some(&Value::I32(42)));
        assert_eq!(msg.get(field(&pool, "test.Simple", "int64")), Some(&Value::I64(7)));
        assert_eq!(msg.get(field(&pool, "test.Simple", "uint32")), Some(&Value::U32(3)));
        assert_eq!(msg.get(field(&pool, "test.Simple", "double")), Some(&Value::F64(1.5)));
    }

    #[test]
    fn test_invalid_values() {
        let pool = fixture_pool();
        let codec = JsonCodec::new();
        let cases = [
            ("test.Simple", json!({ "int32": "abc" })),
            ("test.Simple", json!({ "int32": 3_000_000_000u64 })),
            ("test.Simple", json!({ "uint64": -1 })),
            ("test.Simple", json!({ "string": 5 })),
            ("test.Simple", json!({ "bytes": "***" })),
            ("test.Complex", json!({ "enum": "NOPE" })),
            ("test.Complex", json!({ "enums": "FOO" })),
            ("test.Complex", json!({ "nested": [] })),
            ("test.Simple", json!([1, 2])),
        ];
        for (name, input) in cases {
            let err = codec.from_json(&pool, name, &input).unwrap_err();
            assert!(
                matches!(err, Error::InvalidJsonValue { .. }),
                "{input} gave {err}"
            );
        }

        assert!(matches!(
            codec.decode(&pool, "test.Simple", b"{\"int32\": "),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_cross_codec_equivalence() {
        let pool = fixture_pool();
        let person_name = field(&pool, "test.Person", "name");
        let person_id = field(&pool, "test.Person", "id");
        let person_phone = field(&pool, "test.Person", "phone");
        let number = field(&pool, "test.PhoneNumber", "number");
        let phone_type = field(&pool, "test.PhoneNumber", "type");

        let mut phone = new_message(&pool, "test.PhoneNumber");
        phone.set(number, "555-0100").unwrap();
        phone.set(phone_type, Value::EnumNumber(0)).unwrap();
        let mut person = new_message(&pool, "test.Person");
        person.set(person_name, "Alice").unwrap();
        person.set(person_id, 7).unwrap();
        person.push(person_phone, phone).unwrap();
        let mut book = new_message(&pool, "test.AddressBook");
        book.push(field(&pool, "test.AddressBook", "person"), person)
            .unwrap();

        let binary = BinaryCodec.encode(&pool, &book).unwrap();
        let from_binary = BinaryCodec.decode(&pool, "test.AddressBook", &binary).unwrap();
        let text = JsonCodec::new().pretty().encode(&pool, &from_binary).unwrap();
        assert!(text.contains(&b'\n'));
        let from_json = JsonCodec::new().decode(&pool, "test.AddressBook", &text).unwrap();

        assert_eq!(from_json, book);
        assert_eq!(BinaryCodec.encode(&pool, &from_json).unwrap(), binary);
    }

    #[test]
    fn test_unknown_fields_dropped() {
        let pool = fixture_pool();
        let bytes = [0x0A, 0x01, b'a', 0xA0, 0x06, 0x05];
        let msg = BinaryCodec.decode(&pool, "test.Simple", &bytes).unwrap();
        assert_eq!(msg.unknown_fields().len(), 1);

        let json = JsonCodec::new().to_json(&pool, &msg).unwrap();
        assert_eq!(json, json!({ "string": "a" }));
    }
}
