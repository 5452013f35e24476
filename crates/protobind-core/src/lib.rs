//! # protobind-core
//!
//! A descriptor-driven Protocol Buffers toolchain.
//!
//! This crate provides the core functionality for:
//! - Linking serialized schemas (`FileDescriptorSet` or a protoc plugin
//!   request) into an in-memory descriptor model
//! - Encoding and decoding arbitrary messages in the binary wire format
//! - Converting messages to and from JSON
//! - Rendering linked schemas back to `.proto` text
//!
//! Messages are not backed by generated code: codecs walk the descriptors at
//! runtime, so any message type known to the pool can be handled.
//!
//! ## Architecture
//!
//! - [`wire`]: Varints, zigzag, tags and a bounds-checked reader
//! - [`descriptor`]: The linked descriptor model ([`DescriptorPool`])
//! - [`message`]: Message instances ([`DynamicMessage`], [`Value`])
//! - [`codec`]: The binary and JSON codecs
//! - [`compiler`]: Linking and the generator stage
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protobind_core::{BinaryCodec, Codec, Compiler, JsonCodec};
//! use std::fs;
//!
//! // Link a descriptor set written by `protoc --descriptor_set_out`
//! let schema = Compiler::new().compile_descriptor_set(&fs::read("schema.pb")?)?;
//! let pool = schema.pool();
//!
//! // Decode a binary payload and print it as JSON
//! let message = BinaryCodec.decode(pool, "my.pkg.Event", &fs::read("event.bin")?)?;
//! let json = JsonCodec::new().pretty().encode(pool, &message)?;
//! println!("{}", String::from_utf8_lossy(&json));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`Codec`]: Add further serialization formats
//! - [`Generator`]: Customize what the generator stage emits
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod codec;
pub mod compiler;
pub mod descriptor;
pub mod error;
pub mod message;
pub mod wire;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use codec::{BinaryCodec, Codec, JsonCodec};
pub use compiler::{
    Compiler, GeneratedFile, Generator, GeneratorOptions, LinkedSchema, SchemaWriter,
};
pub use descriptor::{
    DescriptorPool, EnumDescriptor, FieldDescriptor, FieldType, Label, MessageDescriptor,
};
pub use error::{Error, Result};
pub use message::{DynamicMessage, UnknownField, Value};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
