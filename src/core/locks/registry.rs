use crate::core::error::{EngineError, EngineResult};
use crate::core::locks::ShadowLock;
use crate::core::types::LockId;
use fxhash::FxHashMap;

/// Table of shadow locks of one process
///
/// Locks are created lazily on first reference and dropped when their object
/// is reported as garbage-collected.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: FxHashMap<LockId, ShadowLock>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shadow lock for `id`, creating an unowned one if needed
    pub fn get_or_add(&mut self, id: LockId) -> &mut ShadowLock {
        self.locks.entry(id).or_insert_with(|| ShadowLock::new(id))
    }

    /// Get a lock that must already be known
    ///
    /// # Errors
    /// Returns `UnknownLock` if the object was never used as a lock.
    pub fn get_mut(&mut self, id: LockId) -> EngineResult<&mut ShadowLock> {
        self.locks.get_mut(&id).ok_or(EngineError::UnknownLock(id))
    }

    pub fn get(&self, id: LockId) -> Option<&ShadowLock> {
        self.locks.get(&id)
    }

    /// Drop locks whose objects were collected; returns how many were known
    pub fn remove_range(&mut self, ids: impl IntoIterator<Item = LockId>) -> usize {
        ids.into_iter()
            .filter(|id| self.locks.remove(id).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// All locks, sorted by id for stable output
    pub fn all_locks(&self) -> Vec<ShadowLock> {
        let mut locks: Vec<_> = self.locks.values().cloned().collect();
        locks.sort_by_key(|lock| lock.id());
        locks
    }
}
