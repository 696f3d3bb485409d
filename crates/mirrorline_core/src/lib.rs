//! # Mirrorline Core
//!
//! Entity replication engine shared by the server and its clients:
//! - Slot storages with recyclable ids and optional change tracking
//! - A tag-routed binary submessage codec with explicit field encodings
//! - A type-erased container that applies inbound batches to the right storage
//!
//! No I/O happens here. Callers hand in byte buffers and get byte buffers back.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mirrorline_core::{EntityContainer, Role, StateSync};
//!
//! let mut server = EntityContainer::new(Role::Authority);
//! server.register::<Bullet>(StateSync::DiffsOnly)?;
//! server.storage_mut::<Bullet>()?.emplace(bullet);
//! let frame = server.encode_tick();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ecs;
pub mod error;
pub mod protocol;

pub use ecs::{
    AcceptAll, ChangeLog, DispatchReport, Drained, EntityContainer, InboundPolicy, RemoteIdMap,
    Role, SlotStorage, StateSync, TagRegistry, TypeTag, REMOTE_ID_LIMIT,
};
pub use error::{ReplicaError, ReplicaResult};
pub use protocol::{
    Op, Replicated, Submessage, SubmessageHeader, SubmessageIter, WireReader, WireWriter,
    HEADER_SIZE,
};
