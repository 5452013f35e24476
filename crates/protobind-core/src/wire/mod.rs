//! Low-level protobuf wire format primitives.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: SGROUP/EGROUP (deprecated, only skipped)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! The [`Reader`] tracks absolute byte offsets so that decode errors can point
//! at the exact position in the original buffer, even inside nested messages.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages, packed runs)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    /// The rejected 3-bit value
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            other => Err(other),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Field numbers reserved for the protobuf implementation itself
pub const RESERVED_NUMBERS: std::ops::RangeInclusive<u32> = 19_000..=19_999;

/// Longest legal varint encoding of a 64-bit value
pub const MAX_VARINT_LEN: usize = 10;

/// Returns true if `number` may be used for a field or extension.
pub fn is_valid_field_number(number: u32) -> bool {
    number != 0 && number <= MAX_FIELD_NUMBER && !RESERVED_NUMBERS.contains(&number)
}

/// Encode a varint into the buffer.
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes [`encode_varint`] writes for `value`.
pub fn encoded_len_varint(value: u64) -> usize {
    // Each 7 significant bits take one byte; zero still needs one.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Encode a field tag.
pub fn encode_tag(number: u32, wire_type: WireType, buf: &mut impl BufMut) {
    encode_varint(((number as u64) << 3) | wire_type as u64, buf);
}

/// Zigzag-encode a 32-bit signed integer.
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Zigzag-decode a 32-bit value.
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Zigzag-encode a 64-bit signed integer.
pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Zigzag-decode a 64-bit value.
pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. Offsets in
/// errors are relative to `data`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(Error::MalformedVarint { offset: 0 });
        }
        // The tenth byte may only contribute the single remaining bit.
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(Error::MalformedVarint { offset: 0 });
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::truncated(data.len(), None))
}

/// A decoded field tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number
    pub number: u32,
    /// Payload framing
    pub wire_type: WireType,
    /// Absolute offset of the first tag byte
    pub offset: usize,
}

/// Bounds-checked cursor over a wire buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over a top-level buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Creates a reader over a slice that starts at `base` in the outer buffer
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Absolute offset of the next unread byte
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Position relative to the start of this reader's slice
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns true when every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Bytes between two relative positions of this reader
    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.data[start..end]
    }

    /// Reads a varint, attributing truncation to `field`.
    pub fn read_varint(&mut self, field: Option<u32>) -> Result<u64> {
        let start = self.offset();
        match decode_varint(&self.data[self.pos..]) {
            Ok((value, len)) => {
                self.pos += len;
                Ok(value)
            }
            Err(Error::MalformedVarint { .. }) => Err(Error::MalformedVarint { offset: start }),
            Err(_) => Err(Error::truncated(self.base + self.data.len(), field)),
        }
    }

    /// Reads and validates a field tag.
    pub fn read_tag(&mut self) -> Result<Tag> {
        let offset = self.offset();
        let raw = self.read_varint(None)?;

        let wire_type = WireType::try_from((raw & 0x07) as u8)
            .map_err(|wire_type| Error::InvalidWireType { offset, wire_type })?;
        let number = raw >> 3;
        if number == 0 || number > MAX_FIELD_NUMBER as u64 {
            return Err(Error::InvalidFieldNumber { offset, number });
        }

        Ok(Tag {
            number: number as u32,
            wire_type,
            offset,
        })
    }

    fn take(&mut self, len: usize, field: Option<u32>) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.pos;
        if len > remaining {
            return Err(Error::truncated(self.base + self.data.len(), field));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Reads a little-endian 32-bit value.
    pub fn read_fixed32(&mut self, field: Option<u32>) -> Result<u32> {
        let bytes = self.take(4, field)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(raw))
    }

    /// Reads a little-endian 64-bit value.
    pub fn read_fixed64(&mut self, field: Option<u32>) -> Result<u64> {
        let bytes = self.take(8, field)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads a length-delimited payload.
    ///
    /// Returns the payload and its absolute starting offset.
    pub fn read_len_delimited(&mut self, field: Option<u32>) -> Result<(&'a [u8], usize)> {
        let len = self.read_varint(field)?;
        let start = self.offset();
        let len = usize::try_from(len)
            .map_err(|_| Error::truncated(self.base + self.data.len(), field))?;
        let payload = self.take(len, field)?;
        Ok((payload, start))
    }

    /// Skips the payload that follows `tag`.
    ///
    /// Groups are skipped up to and including the matching end-group tag.
    pub fn skip_value(&mut self, tag: Tag) -> Result<()> {
        let field = Some(tag.number);
        match tag.wire_type {
            WireType::Varint => {
                self.read_varint(field)?;
            }
            WireType::I64 => {
                self.take(8, field)?;
            }
            WireType::Len => {
                self.read_len_delimited(field)?;
            }
            WireType::I32 => {
                self.take(4, field)?;
            }
            WireType::StartGroup => {
                // Numbers of the groups still open, innermost last
                let mut open = vec![tag.number];
                while let Some(&current) = open.last() {
                    if self.is_empty() {
                        return Err(Error::truncated(self.offset(), field));
                    }
                    let inner = self.read_tag()?;
                    match inner.wire_type {
                        WireType::StartGroup => open.push(inner.number),
                        WireType::EndGroup => {
                            if inner.number != current {
                                return Err(Error::InvalidWireType {
                                    offset: inner.offset,
                                    wire_type: WireType::EndGroup as u8,
                                });
                            }
                            open.pop();
                        }
                        _ => self.skip_value(inner)?,
                    }
                }
            }
            WireType::EndGroup => {
                return Err(Error::InvalidWireType {
                    offset: tag.offset,
                    wire_type: WireType::EndGroup as u8,
                });
            }
        }
        Ok(())
    }
}
