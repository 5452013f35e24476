//! Descriptor-driven codecs.
//!
//! A codec converts between [`DynamicMessage`] values and one serialized
//! representation. Codecs are plain values; there is no process-wide default,
//! callers pick the codec they need:
//!
//! - [`BinaryCodec`]: the protobuf wire format, byte-compatible with protoc
//! - [`JsonCodec`]: a JSON object keyed by schema field names

mod binary;
mod json;

use crate::descriptor::DescriptorPool;
use crate::error::Result;
use crate::message::DynamicMessage;

pub use binary::BinaryCodec;
pub use json::JsonCodec;

/// Trait for message serialization formats.
///
/// Both directions are guided by the message descriptors in `pool`.
pub trait Codec {
    /// Serializes a message
    fn encode(&self, pool: &DescriptorPool, message: &DynamicMessage) -> Result<Vec<u8>>;

    /// Parses a message of type `type_name` (qualified, leading `.` optional)
    fn decode(&self, pool: &DescriptorPool, type_name: &str, data: &[u8])
        -> Result<DynamicMessage>;
}
