//! # Entity Storage
//!
//! Slot storages, their change logs, remote id translation and the
//! type-erased container that dispatches inbound submessages.

mod change_log;
mod container;
mod remote_ids;
mod slot_storage;
mod type_tag;

pub use change_log::{ChangeLog, Drained};
pub use container::{AcceptAll, DispatchReport, EntityContainer, InboundPolicy, Role, StateSync};
pub use remote_ids::{RemoteIdMap, REMOTE_ID_LIMIT};
pub use slot_storage::SlotStorage;
pub use type_tag::{TagRegistry, TypeTag};
