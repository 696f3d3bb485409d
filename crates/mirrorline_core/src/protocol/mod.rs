//! # Wire Protocol
//!
//! Submessage framing and the primitive codec every entity kind encodes with.
//!
//! All integers and floats are little-endian. Nothing is memory-cast.

mod header;
mod record;
mod serialization;
mod submessage;

pub use header::{Op, SubmessageHeader, HEADER_SIZE};
pub use record::Replicated;
pub use serialization::{WireReader, WireWriter};
pub use submessage::{
    decode_entities, decode_ids, encode_entities, encode_ids, Submessage, SubmessageIter,
};
