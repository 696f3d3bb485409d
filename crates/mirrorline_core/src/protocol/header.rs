//! # Submessage Header
//!
//! Fixed 13-byte prefix of every submessage:
//!
//! ```text
//! offset 0   u32 LE  type tag
//! offset 4   u8      op code
//! offset 5   u64 LE  payload length
//! ```

use super::serialization::{WireReader, WireWriter};
use crate::ecs::TypeTag;
use crate::error::ReplicaError;

/// Size of an encoded header in bytes.
pub const HEADER_SIZE: usize = 13;

/// Operation carried by a submessage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Create entities. Payload: count, then `(remote_id, value)` records.
    Instantiate = 0,
    /// Overwrite entities. Payload shaped like `Instantiate`.
    Update = 1,
    /// Remove entities. Payload: count, then remote ids.
    Deinstantiate = 2,
}

impl Op {
    /// Raw op code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Op {
    type Error = ReplicaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Instantiate),
            1 => Ok(Self::Update),
            2 => Ok(Self::Deinstantiate),
            other => Err(ReplicaError::UnknownOp(other)),
        }
    }
}

/// Decoded header. The op is kept raw so unknown ops can still be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmessageHeader {
    /// Kind the payload belongs to.
    pub tag: TypeTag,
    /// Raw op byte.
    pub op_code: u8,
    /// Payload length in bytes.
    pub payload_len: u64,
}

impl SubmessageHeader {
    /// Builds a header for a known op.
    #[must_use]
    pub const fn new(tag: TypeTag, op: Op, payload_len: u64) -> Self {
        Self {
            tag,
            op_code: op.code(),
            payload_len,
        }
    }

    /// Interprets the op byte.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::UnknownOp`] for codes outside the known set.
    pub fn op(&self) -> Result<Op, ReplicaError> {
        Op::try_from(self.op_code)
    }

    /// Appends the header to `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.write_u32(self.tag.get());
        writer.write_u8(self.op_code);
        writer.write_u64(self.payload_len);
    }

    /// Reads a header, or `None` if fewer than [`HEADER_SIZE`] bytes remain.
    pub fn read(reader: &mut WireReader<'_>) -> Option<Self> {
        if reader.remaining() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            tag: TypeTag(reader.read_u32()?),
            op_code: reader.read_u8()?,
            payload_len: reader.read_u64()?,
        })
    }
}
