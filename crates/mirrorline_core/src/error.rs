//! # Replication Error Types
//!
//! Every failure the replication engine can report. Most of them are
//! non-fatal at the buffer level: the dispatcher records them, logs them and
//! keeps scanning.

use thiserror::Error;

use crate::ecs::TypeTag;
use crate::protocol::Op;

/// Errors raised by storages, the codec and the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicaError {
    /// Slot id beyond the end of the storage.
    #[error("slot {id} out of range (storage holds {len} slots)")]
    SlotIndexOutOfRange {
        /// The offending id.
        id: u32,
        /// Number of slots in the storage.
        len: usize,
    },

    /// Slot exists but holds a removed entity.
    #[error("slot {0} does not hold a live entity")]
    InvalidSlot(u32),

    /// Fewer bytes remain than a submessage header needs.
    #[error("malformed header at offset {offset}: only {remaining} bytes remain")]
    MalformedHeader {
        /// Offset of the truncated header in the buffer.
        offset: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// The header declares more payload than the buffer holds.
    #[error("submessage for {tag} declares {declared} payload bytes but only {available} remain")]
    PayloadOutOfBounds {
        /// Type tag from the header.
        tag: TypeTag,
        /// Declared payload length.
        declared: u64,
        /// Bytes actually left after the header.
        available: usize,
    },

    /// Op byte is not one of the known operations.
    #[error("unknown op code {0}")]
    UnknownOp(u8),

    /// No storage registered for the tag.
    #[error("no storage registered for {0}")]
    UnknownTypeTag(TypeTag),

    /// Update or removal names a remote id that maps to no live slot.
    #[error("remote id {remote_id} of {tag} has no live local slot")]
    UnresolvedRemoteId {
        /// Type tag of the submessage.
        tag: TypeTag,
        /// Remote id from the wire.
        remote_id: u32,
    },

    /// Remote id too large for the dense translation table.
    #[error("remote id {remote_id} exceeds the translation limit {limit}")]
    RemoteIdOutOfRange {
        /// Remote id from the wire.
        remote_id: u32,
        /// Largest accepted remote id plus one.
        limit: u32,
    },

    /// A record inside the payload could not be decoded.
    #[error("record {index} of {op:?} submessage for {tag} failed to decode")]
    RecordDecode {
        /// Type tag of the submessage.
        tag: TypeTag,
        /// Operation of the submessage.
        op: Op,
        /// Index of the failing record (the count prefix is index 0 when it is missing).
        index: usize,
    },

    /// Bytes left over after the declared number of records.
    #[error("submessage for {tag} has {trailing} trailing payload bytes")]
    TrailingPayload {
        /// Type tag of the submessage.
        tag: TypeTag,
        /// Number of unread bytes.
        trailing: usize,
    },

    /// Two registered kinds hash to the same tag.
    #[error("type tag collision on {tag}: `{existing}` and `{incoming}`")]
    TagCollision {
        /// The shared tag.
        tag: TypeTag,
        /// Kind registered first.
        existing: &'static str,
        /// Kind that was being registered.
        incoming: &'static str,
    },

    /// Kind registered twice.
    #[error("entity kind `{0}` is already registered")]
    AlreadyRegistered(&'static str),

    /// Kind was never registered with the container.
    #[error("entity kind `{0}` is not registered")]
    NotRegistered(&'static str),

    /// The inbound policy refused the record.
    #[error("{op:?} of remote id {remote_id} for {tag} rejected by inbound policy")]
    Rejected {
        /// Type tag of the submessage.
        tag: TypeTag,
        /// Operation of the submessage.
        op: Op,
        /// Remote id of the record.
        remote_id: u32,
    },
}

/// Result type for replication operations.
pub type ReplicaResult<T> = Result<T, ReplicaError>;
