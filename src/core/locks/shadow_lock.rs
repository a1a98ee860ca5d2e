use crate::core::error::{EngineError, EngineResult};
use crate::core::types::{LockId, ProcessThreadId};
use serde::Serialize;

/// Reentrant model of one synchronization object
///
/// A ShadowLock mirrors the ownership of a real lock in the analyzed process,
/// independently of that lock. It only changes through admission-approved
/// events, so any protocol violation here means the event stream itself is
/// inconsistent.
///
/// Invariant: `count > 0` exactly when `owner.is_some()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowLock {
    id: LockId,
    owner: Option<ProcessThreadId>,
    count: u32,
}

impl ShadowLock {
    /// Create an unowned shadow lock for a tracked object
    pub fn new(id: LockId) -> Self {
        ShadowLock {
            id,
            owner: None,
            count: 0,
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn owner(&self) -> Option<ProcessThreadId> {
        self.owner
    }

    /// Current reentrancy depth
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether `thread` could take the lock right now
    pub fn is_available_for(&self, thread: ProcessThreadId) -> bool {
        self.owner.is_none_or(|owner| owner == thread)
    }

    /// Take the lock once more
    ///
    /// # Errors
    /// Returns `InvalidLockState` if another thread owns the lock. Callers must
    /// only invoke this after admission control approved the acquisition.
    pub fn acquire(&mut self, thread: ProcessThreadId) -> EngineResult<()> {
        self.ensure_can_acquire(thread, "acquired")?;
        self.owner = Some(thread);
        self.count += 1;
        Ok(())
    }

    /// Restore the lock to an exact reentrancy depth after a wait returns
    ///
    /// # Errors
    /// Returns `InvalidLockState` if another thread owns the lock or `count`
    /// is zero.
    pub fn acquire_multiple(&mut self, thread: ProcessThreadId, count: u32) -> EngineResult<()> {
        self.ensure_can_acquire(thread, "reacquired")?;
        if count == 0 {
            return Err(self.violation(thread, "reacquired", "reentrancy depth must be positive"));
        }
        self.owner = Some(thread);
        self.count = count;
        Ok(())
    }

    /// Release one level of ownership
    ///
    /// # Errors
    /// Returns `InvalidLockState` if `thread` is not the owner.
    pub fn release(&mut self, thread: ProcessThreadId) -> EngineResult<()> {
        self.ensure_can_release(thread, "released")?;
        self.count -= 1;
        if self.count == 0 {
            self.owner = None;
        }
        Ok(())
    }

    /// Fully release the lock regardless of recursion depth
    ///
    /// Used for `Monitor.Wait` semantics.
    ///
    /// # Returns
    /// The reentrancy depth held before the call
    pub fn release_all(&mut self, thread: ProcessThreadId) -> EngineResult<u32> {
        self.ensure_can_release(thread, "released")?;
        let previous = self.count;
        self.count = 0;
        self.owner = None;
        Ok(previous)
    }

    fn ensure_can_acquire(&self, thread: ProcessThreadId, operation: &'static str) -> EngineResult<()> {
        self.ensure_same_process(thread)?;
        match self.owner {
            Some(owner) if owner != thread => Err(self.violation(
                thread,
                operation,
                format!("it is acquired by thread {owner}"),
            )),
            _ => Ok(()),
        }
    }

    fn ensure_can_release(&self, thread: ProcessThreadId, operation: &'static str) -> EngineResult<()> {
        self.ensure_same_process(thread)?;
        match self.owner {
            None => Err(self.violation(thread, operation, "it is not acquired")),
            Some(owner) if owner != thread => Err(self.violation(
                thread,
                operation,
                format!("it is acquired by thread {owner}"),
            )),
            Some(_) => Ok(()),
        }
    }

    fn ensure_same_process(&self, thread: ProcessThreadId) -> EngineResult<()> {
        if thread.process_id != self.id.process_id {
            return Err(EngineError::ProcessMismatch {
                expected: self.id.process_id,
                actual: thread.process_id,
            });
        }
        Ok(())
    }

    fn violation(
        &self,
        thread: ProcessThreadId,
        operation: &'static str,
        reason: impl Into<String>,
    ) -> EngineError {
        EngineError::InvalidLockState {
            lock: self.id,
            thread,
            operation,
            reason: reason.into(),
        }
    }
}
