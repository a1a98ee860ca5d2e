//! Contract violations of the ordering engine
//!
//! Every variant signals an internally inconsistent event stream: a coverage
//! bug in event capture or in the ordering logic itself. None of them is a
//! runtime condition to route around, so callers propagate them with `?` and
//! the host stops at the offending event.

use crate::core::types::{LockId, ProcessThreadId, ProcessTrackedObjectId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A shadow lock operation broke the ownership protocol
    #[error("Lock {lock} cannot be {operation} by thread {thread}: {reason}")]
    InvalidLockState {
        lock: LockId,
        thread: ProcessThreadId,
        operation: &'static str,
        reason: String,
    },

    /// A lock was referenced before it was ever acquired or waited on
    #[error("Could not resolve object {0} to a known lock")]
    UnknownLock(LockId),

    /// A thread was referenced before its creation was observed
    #[error("Thread {0} is not registered; its creation event was never observed")]
    UnknownThread(ProcessThreadId),

    /// A join referenced a thread object with no known thread mapping
    #[error("No thread mapping found for thread object {0}")]
    UnknownThreadObject(ProcessTrackedObjectId),

    /// A wait returned without a saved reentrancy depth
    #[error("No reentrancy count saved for thread {0}")]
    MissingReentrancyCount(ProcessThreadId),

    /// An operation crossed process boundaries
    #[error("Operation from process {actual} applied to state of process {expected}")]
    ProcessMismatch { expected: u32, actual: u32 },

    /// A thread took part in a cycle without wait information
    #[error("Thread {0} is in a cycle but has no wait information")]
    MissingWaitInfo(ProcessThreadId),
}

pub type EngineResult<T> = Result<T, EngineError>;
