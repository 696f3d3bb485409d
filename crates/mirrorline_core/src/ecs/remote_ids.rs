//! # Remote Id Translation
//!
//! Client-side table from the server's slot ids to local slot ids.
//! Indexed densely by remote id, grown on demand.

use crate::error::{ReplicaError, ReplicaResult};

/// Remote ids at or above this value are refused instead of growing the table.
pub const REMOTE_ID_LIMIT: u32 = 1 << 20;

/// Dense remote-to-local id table for one entity kind.
#[derive(Debug, Default, Clone)]
pub struct RemoteIdMap {
    slots: Vec<Option<u32>>,
}

impl RemoteIdMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Binds `remote` to `local`, growing the table if needed.
    ///
    /// Returns the local id previously bound to `remote`, if any.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::RemoteIdOutOfRange`] for ids at or above
    /// [`REMOTE_ID_LIMIT`].
    pub fn bind(&mut self, remote: u32, local: u32) -> ReplicaResult<Option<u32>> {
        if remote >= REMOTE_ID_LIMIT {
            return Err(ReplicaError::RemoteIdOutOfRange {
                remote_id: remote,
                limit: REMOTE_ID_LIMIT,
            });
        }
        let index = remote as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        Ok(self.slots[index].replace(local))
    }

    /// Looks up the local id bound to `remote`.
    #[inline]
    #[must_use]
    pub fn resolve(&self, remote: u32) -> Option<u32> {
        self.slots.get(remote as usize).copied().flatten()
    }

    /// Clears the binding for `remote` and returns the local id it held.
    pub fn unbind(&mut self, remote: u32) -> Option<u32> {
        self.slots.get_mut(remote as usize).and_then(Option::take)
    }

    /// Number of bound remote ids.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
