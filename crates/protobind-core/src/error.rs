//! Error types for the protobind-core library.
//!
//! Schema problems are reported while linking, wire and JSON problems while
//! decoding. Unknown fields and unknown enum values are never errors.

use thiserror::Error;

/// Result type alias for protobind operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all protobind operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or self-inconsistent descriptor input
    #[error("schema error in '{context}': {details}")]
    SchemaError {
        /// Qualified name of the offending file, message, field or enum
        context: String,
        /// What is wrong with it
        details: String,
    },

    /// A field or method refers to a type that is not declared anywhere
    #[error("unresolved type '{type_name}' referenced by '{field}'")]
    UnresolvedType {
        /// Qualified name of the referencing field or method
        field: String,
        /// The type name as written in the descriptor
        type_name: String,
    },

    /// An extension number collides with a field already declared on the extendee
    #[error("extension '{conflicting}' uses number {number} of '{extendee}', already taken by '{existing}'")]
    ExtensionConflict {
        /// Qualified name of the extended message
        extendee: String,
        /// The colliding field number
        number: u32,
        /// The field or extension that owns the number
        existing: String,
        /// The extension being registered
        conflicting: String,
    },

    /// A file imports another file that is not part of the input set
    #[error("file '{file}' depends on '{dependency}', which was not provided")]
    MissingDependency {
        /// The importing file
        file: String,
        /// The missing import
        dependency: String,
    },

    /// A varint ran past 10 bytes
    #[error("malformed varint at offset {offset}")]
    MalformedVarint {
        /// Byte offset of the first varint byte
        offset: usize,
    },

    /// Input ended before a complete tag, value or payload
    #[error("truncated input at offset {offset}{}", field_suffix(.field))]
    TruncatedInput {
        /// Byte offset where more data was expected
        offset: usize,
        /// The field being decoded, if already known
        field: Option<u32>,
    },

    /// A tag carries a wire type that does not exist
    #[error("invalid wire type {wire_type} at offset {offset}")]
    InvalidWireType {
        /// Byte offset of the tag
        offset: usize,
        /// The raw 3-bit wire type
        wire_type: u8,
    },

    /// A tag carries field number 0 or a number above the protobuf maximum
    #[error("invalid field number {number} at offset {offset}")]
    InvalidFieldNumber {
        /// Byte offset of the tag
        offset: usize,
        /// The decoded field number
        number: u64,
    },

    /// A string field holds bytes that are not UTF-8
    #[error("invalid UTF-8 in string field {field} at offset {offset}")]
    InvalidUtf8 {
        /// Byte offset of the payload
        offset: usize,
        /// The string field number
        field: u32,
    },

    /// A type name is absent from the loaded descriptor pool
    #[error("unknown message type '{name}'")]
    UnknownType {
        /// The requested name
        name: String,
    },

    /// A value does not fit the field it is stored into
    #[error("value does not match field '{field}': expected {expected}")]
    TypeMismatch {
        /// Qualified field name
        field: String,
        /// Human-readable description of the accepted value
        expected: String,
    },

    /// Failed to parse a serialized descriptor set or plugin request
    #[error("failed to parse descriptor input: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Input is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON is well-formed but a value has the wrong shape for its field
    #[error("invalid JSON value for '{field}': {details}")]
    InvalidJsonValue {
        /// Qualified field name
        field: String,
        /// What was wrong with the value
        details: String,
    },

    /// A generator option is unknown or has an unusable value
    #[error("invalid generator option '{key}': {details}")]
    InvalidOption {
        /// The option key
        key: String,
        /// What was wrong with it
        details: String,
    },

    /// Several independent failures collected in one linking pass
    #[error("{} errors:\n{}", .0.len(), join_errors(.0))]
    Multiple(Vec<Error>),
}

fn field_suffix(field: &Option<u32>) -> String {
    field
        .map(|number| format!(" while reading field {}", number))
        .unwrap_or_default()
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Creates a new schema error
    pub fn schema(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::SchemaError {
            context: context.into(),
            details: details.into(),
        }
    }

    /// Creates a new unresolved type error
    pub fn unresolved_type(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnresolvedType {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a new truncated input error
    pub fn truncated(offset: usize, field: Option<u32>) -> Self {
        Self::TruncatedInput { offset, field }
    }

    /// Creates a new unknown type error
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates a new type mismatch error
    pub fn type_mismatch(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// Creates a new JSON value error
    pub fn invalid_json(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidJsonValue {
            field: field.into(),
            details: details.into(),
        }
    }

    /// Creates a new generator option error
    pub fn invalid_option(key: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidOption {
            key: key.into(),
            details: details.into(),
        }
    }

    /// Folds collected errors: none is `Ok`, one is returned as itself.
    pub fn collect(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }

    /// Returns true if the error comes from corrupt or incomplete wire input
    pub fn is_wire_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedVarint { .. }
                | Self::TruncatedInput { .. }
                | Self::InvalidWireType { .. }
                | Self::InvalidFieldNumber { .. }
                | Self::InvalidUtf8 { .. }
        )
    }

    /// Returns true if the error was raised while linking a schema
    pub fn is_link_error(&self) -> bool {
        match self {
            Self::SchemaError { .. }
            | Self::UnresolvedType { .. }
            | Self::ExtensionConflict { .. }
            | Self::MissingDependency { .. }
            | Self::DescriptorParse(_) => true,
            Self::Multiple(errors) => errors.iter().all(Error::is_link_error),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::truncated(12, Some(3));
        assert_eq!(
            err.to_string(),
            "truncated input at offset 12 while reading field 3"
        );
        assert_eq!(
            Error::truncated(0, None).to_string(),
            "truncated input at offset 0"
        );
    }

    #[test]
    fn test_collect() {
        assert!(Error::collect(Vec::new()).is_ok());

        let single = Error::collect(vec![Error::unknown_type("a.B")]).unwrap_err();
        assert!(matches!(single, Error::UnknownType { .. }));

        let many = Error::collect(vec![
            Error::schema("a.proto", "first"),
            Error::unresolved_type("a.B.c", ".a.Missing"),
        ])
        .unwrap_err();
        assert!(matches!(many, Error::Multiple(ref v) if v.len() == 2));
        assert!(many.to_string().starts_with("2 errors:"));
        assert!(many.is_link_error());
    }

    #[test]
    fn test_classification() {
        assert!(Error::MalformedVarint { offset: 0 }.is_wire_error());
        assert!(!Error::unknown_type("x").is_wire_error());
        assert!(!Error::invalid_json("f", "bad").is_link_error());
    }
}
