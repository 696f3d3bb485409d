//! # Slot Storage
//!
//! Dense, index-addressed pool of entities of one kind.
//!
//! The storage uses a tombstone strategy:
//! - Slots are never physically removed, only flagged dead
//! - Dead ids go to a FIFO free list and are handed out again by `emplace`
//! - Every access is bounds- and liveness-checked
//!
//! A storage created with [`SlotStorage::tracked`] also feeds a
//! [`ChangeLog`] so the server can broadcast diffs.

use std::collections::VecDeque;

use super::change_log::{ChangeLog, Drained};
use crate::error::{ReplicaError, ReplicaResult};

/// Pool of entities of one kind, addressed by recyclable `u32` slot ids.
///
/// # Invariants
///
/// - `data.len() == valid.len()`
/// - an id is live iff `id < data.len() && valid[id]`
/// - every id in the free list is dead, and appears there once
///
/// # Example
///
/// ```rust
/// use mirrorline_core::SlotStorage;
///
/// let mut storage = SlotStorage::new();
/// let a = storage.emplace("a");
/// let b = storage.emplace("b");
/// storage.remove(a).unwrap();
/// let c = storage.emplace("c");
/// assert_eq!(c, a); // slot recycled
/// assert_eq!(storage.iter().map(|(_, v)| *v).collect::<Vec<_>>(), ["c", "b"]);
/// # let _ = b;
/// ```
#[derive(Debug)]
pub struct SlotStorage<T> {
    /// The dense array of entity values. Dead slots keep their last value.
    data: Vec<T>,
    /// Liveness flag per slot.
    valid: Vec<bool>,
    /// Recycled ids, reused oldest first.
    free_list: VecDeque<u32>,
    /// Present on the authoritative side only.
    changes: Option<ChangeLog<T>>,
}

impl<T> SlotStorage<T> {
    /// Creates an untracked storage (client side).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            valid: Vec::new(),
            free_list: VecDeque::new(),
            changes: None,
        }
    }

    /// Creates a storage that records every emplace and remove.
    #[must_use]
    pub fn tracked() -> Self {
        Self {
            data: Vec::new(),
            valid: Vec::new(),
            free_list: VecDeque::new(),
            changes: Some(ChangeLog::new()),
        }
    }

    /// Returns true if this storage feeds a change log.
    #[inline]
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        self.changes.is_some()
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.data.len() - self.free_list.len()
    }

    /// Number of slots ever allocated, live or dead.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.data.len()
    }

    /// Number of ids waiting to be recycled.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// True if `id` names a live entity.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.valid.get(id as usize).copied().unwrap_or(false)
    }

    /// Checks that `id` is in range and live.
    fn check(&self, id: u32) -> ReplicaResult<usize> {
        let index = id as usize;
        match self.valid.get(index) {
            None => Err(ReplicaError::SlotIndexOutOfRange {
                id,
                len: self.data.len(),
            }),
            Some(false) => Err(ReplicaError::InvalidSlot(id)),
            Some(true) => Ok(index),
        }
    }

    /// Gets a live entity.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::SlotIndexOutOfRange`] or [`ReplicaError::InvalidSlot`].
    #[inline]
    pub fn get(&self, id: u32) -> ReplicaResult<&T> {
        let index = self.check(id)?;
        Ok(&self.data[index])
    }

    /// Gets a live entity mutably.
    ///
    /// In-place mutation is not a change-log event.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::SlotIndexOutOfRange`] or [`ReplicaError::InvalidSlot`].
    #[inline]
    pub fn get_mut(&mut self, id: u32) -> ReplicaResult<&mut T> {
        let index = self.check(id)?;
        Ok(&mut self.data[index])
    }

    /// Overwrites a live entity.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::SlotIndexOutOfRange`] or [`ReplicaError::InvalidSlot`].
    #[inline]
    pub fn set(&mut self, id: u32, value: T) -> ReplicaResult<()> {
        *self.get_mut(id)? = value;
        Ok(())
    }

    /// Removes a live entity and queues its id for reuse.
    ///
    /// The value stays in memory until the slot is recycled.
    ///
    /// # Errors
    ///
    /// Out-of-range and already-dead ids are rejected without touching
    /// any state, so an id can never enter the free list twice.
    pub fn remove(&mut self, id: u32) -> ReplicaResult<()> {
        let index = self.check(id)?;
        self.valid[index] = false;
        self.free_list.push_back(id);
        if let Some(changes) = self.changes.as_mut() {
            changes.record_remove(id);
        }
        Ok(())
    }

    /// Iterates live entities in ascending id order.
    ///
    /// Each call starts a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.data
            .iter()
            .zip(&self.valid)
            .enumerate()
            .filter(|(_, (_, live))| **live)
            .map(|(id, (value, _))| (id as u32, value))
    }

    /// Iterates live entities mutably in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> + '_ {
        self.data
            .iter_mut()
            .zip(&self.valid)
            .enumerate()
            .filter(|(_, (_, live))| **live)
            .map(|(id, (value, _))| (id as u32, value))
    }

    /// True if `id` was instantiated since the last drain.
    #[must_use]
    pub fn is_pending(&self, id: u32) -> bool {
        self.changes.as_ref().is_some_and(|changes| changes.is_pending(id))
    }

    /// Ids instantiated since the last drain (empty when untracked).
    pub fn pending_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.changes.iter().flat_map(ChangeLog::pending_ids)
    }

    /// Hands out the accumulated diff and clears it.
    ///
    /// Untracked storages always return an empty diff.
    pub fn drain_changes(&mut self) -> Drained<T> {
        self.changes
            .as_mut()
            .map_or_else(Drained::empty, ChangeLog::drain)
    }
}

impl<T: Clone> SlotStorage<T> {
    /// Stores a value and returns its slot id.
    ///
    /// Reuses the oldest freed id when one is available, otherwise appends.
    pub fn emplace(&mut self, value: T) -> u32 {
        let id = if let Some(id) = self.free_list.pop_front() {
            let index = id as usize;
            self.data[index] = value.clone();
            self.valid[index] = true;
            id
        } else {
            let id = self.data.len() as u32;
            self.data.push(value.clone());
            self.valid.push(true);
            id
        };

        if let Some(changes) = self.changes.as_mut() {
            changes.record_instantiate(id, value);
        }
        id
    }

    /// Runs `keep` over every live entity and removes those it rejects.
    ///
    /// `keep` may mutate the value in place. Returns the number of removed
    /// entities. Removals go through [`SlotStorage::remove`] and are tracked.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(u32, &mut T) -> bool,
    {
        let mut removed = 0;
        for index in 0..self.data.len() {
            if !self.valid[index] {
                continue;
            }
            let id = index as u32;
            if !keep(id, &mut self.data[index]) && self.remove(id).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

impl<T> Default for SlotStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_ids<T>(storage: &SlotStorage<T>) -> Vec<u32> {
        storage.iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn test_emplace_remove_recycle() {
        let mut storage = SlotStorage::new();
        assert_eq!(storage.emplace('A'), 0);
        assert_eq!(storage.emplace('B'), 1);

        storage.remove(0).unwrap();
        assert_eq!(live_ids(&storage), vec![1]);

        assert_eq!(storage.emplace('C'), 0);
        assert_eq!(live_ids(&storage), vec![0, 1]);
        assert_eq!(*storage.get(0).unwrap(), 'C');
        assert_eq!(*storage.get(1).unwrap(), 'B');
    }

    #[test]
    fn test_fifo_reuse_order() {
        let mut storage = SlotStorage::new();
        for i in 0..4 {
            storage.emplace(i);
        }
        storage.remove(2).unwrap();
        storage.remove(0).unwrap();

        assert_eq!(storage.emplace(10), 2);
        assert_eq!(storage.emplace(11), 0);
        assert_eq!(storage.emplace(12), 4);
    }

    #[test]
    fn test_double_remove_rejected() {
        let mut storage = SlotStorage::new();
        let id = storage.emplace(1u8);
        storage.remove(id).unwrap();

        assert_eq!(storage.remove(id), Err(ReplicaError::InvalidSlot(id)));
        assert_eq!(storage.free_count(), 1);
        assert_eq!(storage.live_count(), 0);
    }

    #[test]
    fn test_out_of_range_access() {
        let mut storage: SlotStorage<u8> = SlotStorage::new();
        storage.emplace(9);

        assert_eq!(
            storage.get(5),
            Err(ReplicaError::SlotIndexOutOfRange { id: 5, len: 1 })
        );
        assert!(storage.set(5, 0).is_err());
        assert!(storage.remove(5).is_err());
        assert_eq!(storage.live_count(), 1);
    }

    #[test]
    fn test_dead_slot_access() {
        let mut storage = SlotStorage::new();
        let id = storage.emplace(7u32);
        storage.remove(id).unwrap();

        assert_eq!(storage.get(id), Err(ReplicaError::InvalidSlot(id)));
        assert_eq!(storage.get_mut(id), Err(ReplicaError::InvalidSlot(id)));
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut storage = SlotStorage::new();
        for i in 0..5u32 {
            storage.emplace(i * 10);
        }
        storage.remove(3).unwrap();

        let first: Vec<_> = storage.iter().map(|(id, v)| (id, *v)).collect();
        let second: Vec<_> = storage.iter().map(|(id, v)| (id, *v)).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![(0, 0), (1, 10), (2, 20), (4, 40)]);
    }

    #[test]
    fn test_tracking_records_changes() {
        let mut storage = SlotStorage::tracked();
        let a = storage.emplace('a');
        let drained = storage.drain_changes();
        assert_eq!(drained.instantiated, vec![(a, 'a')]);

        storage.remove(a).unwrap();
        let drained = storage.drain_changes();
        assert_eq!(drained.deinstantiated, vec![a]);
        assert!(storage.drain_changes().is_empty());
    }

    #[test]
    fn test_untracked_storage_has_no_diff() {
        let mut storage = SlotStorage::new();
        storage.emplace(1);
        assert!(!storage.is_tracked());
        assert!(storage.drain_changes().is_empty());
    }

    #[test]
    fn test_retain_mutates_and_removes() {
        let mut storage = SlotStorage::tracked();
        for y in [5.0f32, -1.0, 3.0, -8.0] {
            storage.emplace(y);
        }
        let _ = storage.drain_changes();

        let removed = storage.retain(|_, y| {
            *y -= 2.0;
            *y > 0.0
        });

        assert_eq!(removed, 2);
        assert_eq!(live_ids(&storage), vec![0, 2]);
        assert_eq!(*storage.get(0).unwrap(), 3.0);
        assert_eq!(storage.drain_changes().deinstantiated, vec![1, 3]);
    }
}
