//! # Entity Container
//!
//! Type-erased registry of one storage per entity kind, keyed by type tag.
//!
//! Inbound buffers are scanned submessage by submessage and each one is
//! handed to the storage its tag names. Kinds are registered once at startup
//! and the shape of the container never changes afterwards.

use std::any::Any;
use std::collections::HashMap;

use super::remote_ids::{RemoteIdMap, REMOTE_ID_LIMIT};
use super::slot_storage::SlotStorage;
use super::type_tag::{TagRegistry, TypeTag};
use crate::error::{ReplicaError, ReplicaResult};
use crate::protocol::{
    decode_entities, decode_ids, encode_entities, encode_ids, Op, Replicated, SubmessageIter,
    WireWriter,
};

/// Which side of the replication link a container sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the authoritative state. Storages track changes and wire ids
    /// are local slot ids.
    Authority,
    /// Mirrors a peer's state. Wire ids go through a [`RemoteIdMap`].
    Mirror,
}

/// How a kind's state is broadcast by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateSync {
    /// Only instantiations and removals. Peers simulate the rest.
    #[default]
    DiffsOnly,
    /// Diffs plus an Update of every live entity on each tick.
    EveryTick,
}

/// Per-record admission check for inbound submessages.
pub trait InboundPolicy {
    /// Returns true if the record may be applied.
    fn allows(&self, tag: TypeTag, op: Op, remote_id: u32) -> bool;
}

/// Policy that admits every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl InboundPolicy for AcceptAll {
    #[inline]
    fn allows(&self, _tag: TypeTag, _op: Op, _remote_id: u32) -> bool {
        true
    }
}

impl<F> InboundPolicy for F
where
    F: Fn(TypeTag, Op, u32) -> bool,
{
    #[inline]
    fn allows(&self, tag: TypeTag, op: Op, remote_id: u32) -> bool {
        self(tag, op, remote_id)
    }
}

/// Outcome of one [`EntityContainer::dispatch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Bytes consumed from the buffer, including any dropped remainder.
    pub consumed: usize,
    /// Submessages whose header was read.
    pub submessages: usize,
    /// Records applied to a storage.
    pub applied: usize,
    /// Records or submessages skipped.
    pub skipped: usize,
    /// True if the buffer ended in an unframeable remainder.
    pub truncated: bool,
    /// Every problem met during the scan, in order.
    pub errors: Vec<ReplicaError>,
}

impl DispatchReport {
    /// True if nothing was skipped or dropped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn skip(&mut self, err: ReplicaError) {
        tracing::warn!("Skipped inbound data: {}", err);
        self.skipped += 1;
        self.errors.push(err);
    }
}

/// One registered kind: its storage plus the remote id table.
struct Replica<T> {
    storage: SlotStorage<T>,
    remote_ids: RemoteIdMap,
    sync: StateSync,
}

/// Object-safe view of a [`Replica`] used by the dispatcher.
trait ErasedReplica: Send {
    fn kind(&self) -> &'static str;
    fn sync(&self) -> StateSync;
    fn live_count(&self) -> usize;
    fn apply(
        &mut self,
        role: Role,
        op: Op,
        payload: &[u8],
        policy: &dyn InboundPolicy,
        report: &mut DispatchReport,
    );
    fn encode_snapshot(&self, writer: &mut WireWriter) -> usize;
    fn encode_changes(&mut self, writer: &mut WireWriter) -> usize;
    fn encode_state(&self, writer: &mut WireWriter) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Replicated> Replica<T> {
    fn unresolved(remote_id: u32) -> ReplicaError {
        ReplicaError::UnresolvedRemoteId {
            tag: T::TAG,
            remote_id,
        }
    }

    fn apply_value(&mut self, role: Role, op: Op, remote_id: u32, value: T) -> ReplicaResult<()> {
        match (role, op) {
            // Placeholder id; the authority allocates.
            (Role::Authority, Op::Instantiate) => {
                self.storage.emplace(value);
                Ok(())
            }
            (Role::Authority, _) => self
                .storage
                .set(remote_id, value)
                .map_err(|_| Self::unresolved(remote_id)),
            (Role::Mirror, Op::Instantiate) => {
                if let Some(local) = self.remote_ids.resolve(remote_id) {
                    if self.storage.contains(local) {
                        return self.storage.set(local, value);
                    }
                }
                if remote_id >= REMOTE_ID_LIMIT {
                    return Err(ReplicaError::RemoteIdOutOfRange {
                        remote_id,
                        limit: REMOTE_ID_LIMIT,
                    });
                }
                let local = self.storage.emplace(value);
                self.remote_ids.bind(remote_id, local).map(|_| ())
            }
            (Role::Mirror, _) => {
                let local = self
                    .remote_ids
                    .resolve(remote_id)
                    .ok_or_else(|| Self::unresolved(remote_id))?;
                self.storage
                    .set(local, value)
                    .map_err(|_| Self::unresolved(remote_id))
            }
        }
    }

    fn apply_removal(&mut self, role: Role, remote_id: u32) -> ReplicaResult<()> {
        let local = match role {
            Role::Authority => remote_id,
            Role::Mirror => self
                .remote_ids
                .unbind(remote_id)
                .ok_or_else(|| Self::unresolved(remote_id))?,
        };
        self.storage
            .remove(local)
            .map_err(|_| Self::unresolved(remote_id))
    }

    fn admit(policy: &dyn InboundPolicy, op: Op, remote_id: u32) -> ReplicaResult<()> {
        if policy.allows(T::TAG, op, remote_id) {
            Ok(())
        } else {
            Err(ReplicaError::Rejected {
                tag: T::TAG,
                op,
                remote_id,
            })
        }
    }
}

impl<T: Replicated> ErasedReplica for Replica<T> {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn sync(&self) -> StateSync {
        self.sync
    }

    fn live_count(&self) -> usize {
        self.storage.live_count()
    }

    fn apply(
        &mut self,
        role: Role,
        op: Op,
        payload: &[u8],
        policy: &dyn InboundPolicy,
        report: &mut DispatchReport,
    ) {
        // A bad record poisons the whole submessage; nothing is half-applied.
        if op == Op::Deinstantiate {
            match decode_ids(T::TAG, payload) {
                Ok(ids) => {
                    for remote_id in ids {
                        let outcome = Self::admit(policy, op, remote_id)
                            .and_then(|()| self.apply_removal(role, remote_id));
                        match outcome {
                            Ok(()) => report.applied += 1,
                            Err(err) => report.skip(err),
                        }
                    }
                }
                Err(err) => report.skip(err),
            }
            return;
        }

        match decode_entities::<T>(op, payload) {
            Ok(records) => {
                for (remote_id, value) in records {
                    let outcome = Self::admit(policy, op, remote_id)
                        .and_then(|()| self.apply_value(role, op, remote_id, value));
                    match outcome {
                        Ok(()) => report.applied += 1,
                        Err(err) => report.skip(err),
                    }
                }
            }
            Err(err) => report.skip(err),
        }
    }

    fn encode_snapshot(&self, writer: &mut WireWriter) -> usize {
        // Pending instantiations reach new peers through the next diff.
        let storage = &self.storage;
        encode_entities(
            writer,
            Op::Instantiate,
            storage.iter().filter(|&(id, _)| !storage.is_pending(id)),
        )
    }

    fn encode_changes(&mut self, writer: &mut WireWriter) -> usize {
        let drained = self.storage.drain_changes();
        let mut written = 0;
        if !drained.deinstantiated.is_empty() {
            written += encode_ids(writer, T::TAG, drained.deinstantiated);
        }
        if !drained.instantiated.is_empty() {
            // Pending ids are always live, so send their current value.
            let storage = &self.storage;
            let records = drained
                .instantiated
                .iter()
                .map(|(id, value)| (*id, storage.get(*id).unwrap_or(value)));
            written += encode_entities(writer, Op::Instantiate, records);
        }
        written
    }

    fn encode_state(&self, writer: &mut WireWriter) -> usize {
        if self.sync == StateSync::DiffsOnly || self.storage.live_count() == 0 {
            return 0;
        }
        encode_entities(writer, Op::Update, self.storage.iter())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Registry of storages keyed by type tag, plus the inbound dispatcher.
///
/// # Example
///
/// ```rust
/// use mirrorline_core::{EntityContainer, Replicated, Role, StateSync, WireReader, WireWriter};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Crate { weight: f32 }
///
/// impl Replicated for Crate {
///     const KIND: &'static str = "demo.Crate";
///     fn encode(&self, w: &mut WireWriter) { w.write_f32(self.weight); }
///     fn decode(r: &mut WireReader<'_>) -> Option<Self> { Some(Self { weight: r.read_f32()? }) }
/// }
///
/// let mut server = EntityContainer::new(Role::Authority);
/// server.register::<Crate>(StateSync::DiffsOnly).unwrap();
/// server.storage_mut::<Crate>().unwrap().emplace(Crate { weight: 3.0 });
/// let diff = server.encode_changes();
///
/// let mut client = EntityContainer::new(Role::Mirror);
/// client.register::<Crate>(StateSync::DiffsOnly).unwrap();
/// let report = client.dispatch(&diff);
/// assert_eq!(report.applied, 1);
/// assert_eq!(client.storage::<Crate>().unwrap().live_count(), 1);
/// ```
pub struct EntityContainer {
    role: Role,
    tags: TagRegistry,
    replicas: Vec<Box<dyn ErasedReplica>>,
    index: HashMap<TypeTag, usize>,
}

impl EntityContainer {
    /// Creates an empty container for the given side of the link.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            tags: TagRegistry::new(),
            replicas: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The side this container replicates for.
    #[inline]
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Registered tags and their kind names.
    #[must_use]
    pub const fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// Registers a kind and creates its storage.
    ///
    /// Authority storages are change-tracked, mirror storages are not.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::AlreadyRegistered`] or [`ReplicaError::TagCollision`].
    pub fn register<T: Replicated>(&mut self, sync: StateSync) -> ReplicaResult<TypeTag> {
        self.tags.insert(T::TAG, T::KIND)?;
        let storage = match self.role {
            Role::Authority => SlotStorage::tracked(),
            Role::Mirror => SlotStorage::new(),
        };
        self.index.insert(T::TAG, self.replicas.len());
        self.replicas.push(Box::new(Replica::<T> {
            storage,
            remote_ids: RemoteIdMap::new(),
            sync,
        }));
        tracing::debug!("Registered entity kind {} ({})", T::KIND, T::TAG);
        Ok(T::TAG)
    }

    fn replica<T: Replicated>(&self) -> ReplicaResult<&Replica<T>> {
        self.index
            .get(&T::TAG)
            .and_then(|&slot| self.replicas[slot].as_any().downcast_ref::<Replica<T>>())
            .ok_or(ReplicaError::NotRegistered(T::KIND))
    }

    fn replica_mut<T: Replicated>(&mut self) -> ReplicaResult<&mut Replica<T>> {
        let slot = *self
            .index
            .get(&T::TAG)
            .ok_or(ReplicaError::NotRegistered(T::KIND))?;
        self.replicas[slot]
            .as_any_mut()
            .downcast_mut::<Replica<T>>()
            .ok_or(ReplicaError::NotRegistered(T::KIND))
    }

    /// Borrows the storage of a registered kind.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::NotRegistered`] if `T` was never registered.
    pub fn storage<T: Replicated>(&self) -> ReplicaResult<&SlotStorage<T>> {
        self.replica::<T>().map(|replica| &replica.storage)
    }

    /// Mutably borrows the storage of a registered kind.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::NotRegistered`] if `T` was never registered.
    pub fn storage_mut<T: Replicated>(&mut self) -> ReplicaResult<&mut SlotStorage<T>> {
        self.replica_mut::<T>().map(|replica| &mut replica.storage)
    }

    /// Borrows the remote id table of a registered kind.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::NotRegistered`] if `T` was never registered.
    pub fn remote_ids<T: Replicated>(&self) -> ReplicaResult<&RemoteIdMap> {
        self.replica::<T>().map(|replica| &replica.remote_ids)
    }

    /// Translates a peer's id for `T` into the local slot id.
    #[must_use]
    pub fn resolve_remote<T: Replicated>(&self, remote_id: u32) -> Option<u32> {
        match self.role {
            Role::Authority => Some(remote_id),
            Role::Mirror => self.remote_ids::<T>().ok()?.resolve(remote_id),
        }
    }

    /// Live entities across all kinds.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.replicas.iter().map(|replica| replica.live_count()).sum()
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn kind_count(&self) -> usize {
        self.replicas.len()
    }

    /// Applies every submessage in `buffer`, admitting all records.
    pub fn dispatch(&mut self, buffer: &[u8]) -> DispatchReport {
        self.dispatch_with(buffer, &AcceptAll)
    }

    /// Applies every submessage in `buffer`, checking each record with `policy`.
    ///
    /// Never fails as a whole: unknown tags and ops are skipped by their
    /// payload length, bad submessages and rejected records are skipped, and
    /// an unframeable tail is dropped. Everything skipped ends up in the
    /// report.
    pub fn dispatch_with(&mut self, buffer: &[u8], policy: &dyn InboundPolicy) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut scan = SubmessageIter::new(buffer);

        for next in scan.by_ref() {
            let submessage = match next {
                Ok(submessage) => submessage,
                Err(err) => {
                    report.truncated = true;
                    report.skip(err);
                    continue;
                }
            };
            report.submessages += 1;

            let op = match submessage.op() {
                Ok(op) => op,
                Err(err) => {
                    report.skip(err);
                    continue;
                }
            };
            let Some(&slot) = self.index.get(&submessage.header.tag) else {
                report.skip(ReplicaError::UnknownTypeTag(submessage.header.tag));
                continue;
            };

            self.replicas[slot].apply(self.role, op, submessage.payload, policy, &mut report);
        }

        report.consumed = scan.consumed();
        report
    }

    /// Appends an Instantiate submessage per kind covering every live entity.
    ///
    /// Entities still waiting in a change log are left out. Kinds with no
    /// entities still get an empty submessage. Returns the record count.
    pub fn write_snapshot(&self, writer: &mut WireWriter) -> usize {
        self.replicas
            .iter()
            .map(|replica| replica.encode_snapshot(writer))
            .sum()
    }

    /// Drains every change log into Deinstantiate then Instantiate submessages.
    ///
    /// Kinds without changes write nothing. Returns the record count.
    pub fn write_changes(&mut self, writer: &mut WireWriter) -> usize {
        self.replicas
            .iter_mut()
            .map(|replica| replica.encode_changes(writer))
            .sum()
    }

    /// Appends an Update submessage for every [`StateSync::EveryTick`] kind.
    pub fn write_state_updates(&self, writer: &mut WireWriter) -> usize {
        self.replicas
            .iter()
            .map(|replica| replica.encode_state(writer))
            .sum()
    }

    /// Full-state snapshot for a newly joined peer.
    #[must_use]
    pub fn encode_snapshot(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        self.write_snapshot(&mut writer);
        writer.into_bytes()
    }

    /// Drained diffs only.
    pub fn encode_changes(&mut self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        self.write_changes(&mut writer);
        writer.into_bytes()
    }

    /// One tick's broadcast: drained diffs, then per-tick state updates.
    pub fn encode_tick(&mut self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        self.write_changes(&mut writer);
        self.write_state_updates(&mut writer);
        writer.into_bytes()
    }

    /// Registered kind names with their sync mode and live count.
    pub fn summary(&self) -> impl Iterator<Item = (&'static str, StateSync, usize)> + '_ {
        self.replicas
            .iter()
            .map(|replica| (replica.kind(), replica.sync(), replica.live_count()))
    }
}

impl std::fmt::Debug for EntityContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityContainer")
            .field("role", &self.role)
            .field("kinds", &self.summary().collect::<Vec<_>>())
            .finish()
    }
}
