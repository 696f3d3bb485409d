//! # Change Log
//!
//! Server-side record of instantiations and removals made against a storage
//! since the last broadcast tick.
//!
//! An id whose instantiation is still pending when it is removed is simply
//! cancelled: no peer has seen it, so nothing goes out for it. This keeps an
//! id out of both lists at once, and lets the encoder send removals before
//! instantiations so a slot removed and recycled in the same tick replays in
//! the right order.
//!
//! Pending instantiations are indexed by id, so cancelling one and asking
//! whether an id is pending are both O(1). A cancelled entry leaves a hole
//! that `drain` skips.

use std::collections::HashMap;

/// Accumulated diff of one storage.
#[derive(Debug)]
pub struct ChangeLog<T> {
    /// Pending instantiations in creation order; `None` once cancelled.
    instantiated: Vec<Option<(u32, T)>>,
    /// Position in `instantiated` of every pending id.
    pending: HashMap<u32, usize>,
    deinstantiated: Vec<u32>,
}

/// The batches handed out by [`ChangeLog::drain`].
///
/// Apply `deinstantiated` before `instantiated`.
#[derive(Debug, Clone, PartialEq)]
pub struct Drained<T> {
    /// Entities created since the previous drain, in creation order.
    pub instantiated: Vec<(u32, T)>,
    /// Previously broadcast entities removed since the previous drain.
    pub deinstantiated: Vec<u32>,
}

impl<T> Drained<T> {
    /// An empty diff.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            instantiated: Vec::new(),
            deinstantiated: Vec::new(),
        }
    }

    /// True when neither list has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instantiated.is_empty() && self.deinstantiated.is_empty()
    }
}

impl<T> ChangeLog<T> {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instantiated: Vec::new(),
            pending: HashMap::new(),
            deinstantiated: Vec::new(),
        }
    }

    /// Records a freshly emplaced entity.
    ///
    /// A second instantiation of an id that is still pending replaces the
    /// first one's value in place.
    pub fn record_instantiate(&mut self, id: u32, value: T) {
        if let Some(&pos) = self.pending.get(&id) {
            self.instantiated[pos] = Some((id, value));
            return;
        }
        self.pending.insert(id, self.instantiated.len());
        self.instantiated.push(Some((id, value)));
    }

    /// Records a removal, cancelling a pending instantiation of the same id.
    pub fn record_remove(&mut self, id: u32) {
        if let Some(pos) = self.pending.remove(&id) {
            self.instantiated[pos] = None;
        } else {
            self.deinstantiated.push(id);
        }
    }

    /// True if `id` was instantiated since the last drain.
    #[must_use]
    pub fn is_pending(&self, id: u32) -> bool {
        self.pending.contains_key(&id)
    }

    /// Ids instantiated since the last drain, in creation order.
    pub fn pending_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.instantiated.iter().flatten().map(|(id, _)| *id)
    }

    /// Number of pending instantiations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Hands out everything recorded so far and clears the log.
    pub fn drain(&mut self) -> Drained<T> {
        self.pending.clear();
        Drained {
            instantiated: std::mem::take(&mut self.instantiated).into_iter().flatten().collect(),
            deinstantiated: std::mem::take(&mut self.deinstantiated),
        }
    }

    /// True when nothing is waiting to be drained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.deinstantiated.is_empty()
    }
}

impl<T> Default for ChangeLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_clears() {
        let mut log = ChangeLog::new();
        log.record_instantiate(0, 'a');
        log.record_remove(5);

        let first = log.drain();
        assert_eq!(first.instantiated, vec![(0, 'a')]);
        assert_eq!(first.deinstantiated, vec![5]);

        let second = log.drain();
        assert!(second.is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_remove_cancels_pending_instantiation() {
        let mut log = ChangeLog::new();
        log.record_instantiate(3, 'x');
        assert!(log.is_pending(3));

        log.record_remove(3);
        assert!(!log.is_pending(3));
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_recycled_id_keeps_both_entries() {
        let mut log = ChangeLog::new();
        // id 2 was broadcast in an earlier tick
        log.record_remove(2);
        log.record_instantiate(2, 'n');

        let drained = log.drain();
        assert_eq!(drained.deinstantiated, vec![2]);
        assert_eq!(drained.instantiated, vec![(2, 'n')]);
    }

    #[test]
    fn test_recycle_then_remove_again() {
        let mut log = ChangeLog::new();
        log.record_remove(2);
        log.record_instantiate(2, 'n');
        log.record_remove(2);

        let drained = log.drain();
        assert_eq!(drained.deinstantiated, vec![2]);
        assert!(drained.instantiated.is_empty());
    }

    #[test]
    fn test_cancellation_keeps_creation_order() {
        let mut log = ChangeLog::new();
        for id in 0..6 {
            log.record_instantiate(id, id * 10);
        }
        log.record_remove(1);
        log.record_remove(4);
        assert_eq!(log.pending_count(), 4);
        assert!(!log.is_pending(4));
        assert!(log.is_pending(5));
        assert_eq!(log.pending_ids().collect::<Vec<_>>(), vec![0, 2, 3, 5]);

        // recycled 4 goes to the back
        log.record_instantiate(4, 99);
        let drained = log.drain();
        assert_eq!(
            drained.instantiated,
            vec![(0, 0), (2, 20), (3, 30), (5, 50), (4, 99)]
        );
        assert!(drained.deinstantiated.is_empty());
        assert!(log.is_empty());
        assert!(!log.is_pending(0));
    }

    #[test]
    fn test_many_pending_removals() {
        let mut log = ChangeLog::new();
        for id in 0..10_000 {
            log.record_instantiate(id, ());
        }
        for id in (0..10_000).step_by(2) {
            log.record_remove(id);
        }
        assert_eq!(log.pending_count(), 5_000);
        assert!((0..10_000).all(|id| log.is_pending(id) == (id % 2 == 1)));
        let drained = log.drain();
        assert_eq!(drained.instantiated.len(), 5_000);
        assert!(drained.deinstantiated.is_empty());
    }
}
