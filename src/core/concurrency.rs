//! Read-model of who waits for what
//!
//! The ConcurrencyContext follows delivered events only, so it always sees
//! the causally ordered view. The deadlock detector derives wait-for edges
//! from it before every detection pass.

use crate::core::error::{EngineError, EngineResult};
use crate::core::types::{LockId, ProcessThreadId};
use fxhash::FxHashMap;

#[derive(Debug, Default)]
struct ThreadState {
    waiting_for_lock: Option<LockId>,
    waiting_for_thread: Option<ProcessThreadId>,
    // Lock -> reentrancy depth held by this thread
    taken_locks: FxHashMap<LockId, u32>,
    // Depths given up by Monitor.Wait, restored when the wait returns
    suspended_locks: FxHashMap<LockId, u32>,
}

#[derive(Debug, Default)]
pub struct ConcurrencyContext {
    threads: FxHashMap<ProcessThreadId, ThreadState>,
    lock_owners: FxHashMap<LockId, ProcessThreadId>,
}

impl ConcurrencyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_thread(&self, thread: ProcessThreadId) -> bool {
        self.threads.contains_key(&thread)
    }

    /// Threads of one process, sorted
    pub fn threads_of(&self, process_id: u32) -> Vec<ProcessThreadId> {
        let mut threads: Vec<_> = self
            .threads
            .keys()
            .filter(|t| t.process_id == process_id)
            .copied()
            .collect();
        threads.sort();
        threads
    }

    pub fn waiting_lock(&self, thread: ProcessThreadId) -> Option<LockId> {
        self.threads.get(&thread).and_then(|s| s.waiting_for_lock)
    }

    pub fn waiting_thread(&self, thread: ProcessThreadId) -> Option<ProcessThreadId> {
        self.threads.get(&thread).and_then(|s| s.waiting_for_thread)
    }

    pub fn lock_owner(&self, lock: LockId) -> Option<ProcessThreadId> {
        self.lock_owners.get(&lock).copied()
    }

    /// Locks currently held by `thread`, sorted
    pub fn taken_locks(&self, thread: ProcessThreadId) -> EngineResult<Vec<LockId>> {
        let mut locks: Vec<_> = self.state(thread)?.taken_locks.keys().copied().collect();
        locks.sort();
        Ok(locks)
    }

    pub fn record_thread_created(&mut self, thread: ProcessThreadId) {
        self.threads.entry(thread).or_default();
    }

    pub fn record_thread_destroyed(&mut self, thread: ProcessThreadId) {
        if let Some(state) = self.threads.remove(&thread) {
            for lock in state.taken_locks.keys() {
                if self.lock_owners.get(lock) == Some(&thread) {
                    self.lock_owners.remove(lock);
                }
            }
        }
    }

    pub fn record_lock_acquire_called(
        &mut self,
        thread: ProcessThreadId,
        lock: LockId,
    ) -> EngineResult<()> {
        self.state_mut(thread)?.waiting_for_lock = Some(lock);
        Ok(())
    }

    pub fn record_lock_acquire_returned(
        &mut self,
        thread: ProcessThreadId,
        lock: LockId,
        success: bool,
    ) -> EngineResult<()> {
        let state = self.state_mut(thread)?;
        state.waiting_for_lock = None;
        if success {
            *state.taken_locks.entry(lock).or_insert(0) += 1;
            self.lock_owners.insert(lock, thread);
        }
        Ok(())
    }

    pub fn record_lock_release_returned(
        &mut self,
        thread: ProcessThreadId,
        lock: LockId,
    ) -> EngineResult<()> {
        let state = self.state_mut(thread)?;
        if let Some(depth) = state.taken_locks.get_mut(&lock) {
            *depth -= 1;
            if *depth == 0 {
                state.taken_locks.remove(&lock);
                self.lock_owners.remove(&lock);
            }
        }
        Ok(())
    }

    pub fn record_object_wait_called(
        &mut self,
        thread: ProcessThreadId,
        lock: LockId,
    ) -> EngineResult<()> {
        let state = self.state_mut(thread)?;
        if let Some(depth) = state.taken_locks.remove(&lock) {
            state.suspended_locks.insert(lock, depth);
        }
        self.lock_owners.remove(&lock);
        Ok(())
    }

    pub fn record_object_wait_returned(
        &mut self,
        thread: ProcessThreadId,
        lock: LockId,
    ) -> EngineResult<()> {
        let state = self.state_mut(thread)?;
        let depth = state.suspended_locks.remove(&lock).unwrap_or(1);
        state.taken_locks.insert(lock, depth);
        self.lock_owners.insert(lock, thread);
        Ok(())
    }

    pub fn record_thread_join_called(
        &mut self,
        thread: ProcessThreadId,
        joinee: ProcessThreadId,
    ) -> EngineResult<()> {
        self.state_mut(thread)?.waiting_for_thread = Some(joinee);
        Ok(())
    }

    pub fn record_thread_join_returned(&mut self, thread: ProcessThreadId) -> EngineResult<()> {
        self.state_mut(thread)?.waiting_for_thread = None;
        Ok(())
    }

    fn state(&self, thread: ProcessThreadId) -> EngineResult<&ThreadState> {
        self.threads
            .get(&thread)
            .ok_or(EngineError::UnknownThread(thread))
    }

    fn state_mut(&mut self, thread: ProcessThreadId) -> EngineResult<&mut ThreadState> {
        self.threads
            .get_mut(&thread)
            .ok_or(EngineError::UnknownThread(thread))
    }
}
