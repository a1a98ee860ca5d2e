use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one logical thread in one analyzed process
///
/// Stable for the lifetime of the thread. All per-thread state in the engine is
/// keyed by this value, never by reference identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessThreadId {
    pub process_id: u32,
    pub thread_id: u64,
}

impl ProcessThreadId {
    pub const fn new(process_id: u32, thread_id: u64) -> Self {
        Self {
            process_id,
            thread_id,
        }
    }
}

impl fmt::Display for ProcessThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.process_id, self.thread_id)
    }
}

/// Identity of a heap object used as a synchronization primitive
///
/// Assigned by the external object tracker and stable across garbage-collector
/// relocation. It is never a raw memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessTrackedObjectId {
    pub process_id: u32,
    pub object_id: u64,
}

impl ProcessTrackedObjectId {
    pub const fn new(process_id: u32, object_id: u64) -> Self {
        Self {
            process_id,
            object_id,
        }
    }
}

impl fmt::Display for ProcessTrackedObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:#{}", self.process_id, self.object_id)
    }
}

/// Lock identifier type
///
/// Locks are tracked objects; the alias documents intent at call sites.
pub type LockId = ProcessTrackedObjectId;

/// Correlation id of a command sent to the out-of-process agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(pub u64);

/// Header of every recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub process_id: u32,
    pub thread_id: u64,
}

impl EventMetadata {
    pub fn thread(&self) -> ProcessThreadId {
        ProcessThreadId::new(self.process_id, self.thread_id)
    }
}

/// Payload of a recorded event
///
/// Object ids are process-local; they are combined with the process id of the
/// event metadata to form a [`ProcessTrackedObjectId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A managed thread was created by the runtime
    ThreadCreate,
    /// A managed thread was given a display name
    ThreadRename { name: String },
    /// A managed thread was destroyed
    ThreadDestroy,
    /// `Thread.Start` was entered; maps the thread object to the calling thread
    ThreadStart { thread_object: u64 },
    /// The runtime reported which thread object belongs to the calling thread
    ThreadMapping { thread_object: u64 },
    /// `Thread.Join` was entered
    ThreadJoinAttempt { thread_object: u64 },
    /// `Thread.Join` returned
    ThreadJoinResult { thread_object: u64 },
    /// A lock acquire (or try-acquire) call was entered
    LockAcquireAttempt { lock: u64 },
    /// A lock acquire call returned; `success` is false for failed try-acquires
    LockAcquireResult { lock: u64, success: bool },
    /// A lock release call returned
    LockRelease { lock: u64 },
    /// `Monitor.Pulse` returned
    PulseOne { lock: u64 },
    /// `Monitor.PulseAll` returned
    PulseAll { lock: u64 },
    /// `Monitor.Wait` was entered
    WaitAttempt { lock: u64 },
    /// `Monitor.Wait` returned; `success` is false when the wait timed out
    WaitResult { lock: u64, success: bool },
    /// The tracker dropped these objects after a garbage collection
    GarbageCollected { objects: Vec<u64> },
}

/// One event as captured from the analyzed process, in receipt order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub metadata: EventMetadata,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl RecordedEvent {
    pub fn new(process_id: u32, thread_id: u64, payload: EventPayload) -> Self {
        Self {
            metadata: EventMetadata {
                process_id,
                thread_id,
            },
            payload,
        }
    }

    pub fn thread(&self) -> ProcessThreadId {
        self.metadata.thread()
    }

    /// Resolve a process-local object id carried by the payload
    pub fn object(&self, object_id: u64) -> ProcessTrackedObjectId {
        ProcessTrackedObjectId::new(self.metadata.process_id, object_id)
    }
}

/// An event after admission control, with ids resolved
///
/// This is what analysis stages observe. The sequence of ordered events of a
/// process is a consistent single-threaded replay of the recorded trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderedEvent {
    ThreadCreated {
        thread: ProcessThreadId,
    },
    ThreadRenamed {
        thread: ProcessThreadId,
        name: String,
    },
    ThreadDestroyed {
        thread: ProcessThreadId,
    },
    ThreadStarted {
        thread: ProcessThreadId,
        thread_object: ProcessTrackedObjectId,
    },
    ThreadMappingUpdated {
        thread: ProcessThreadId,
        thread_object: ProcessTrackedObjectId,
    },
    ThreadJoinAttempted {
        thread: ProcessThreadId,
        joinee: ProcessThreadId,
    },
    ThreadJoinReturned {
        thread: ProcessThreadId,
        joinee: ProcessThreadId,
    },
    LockAcquireAttempted {
        thread: ProcessThreadId,
        lock: LockId,
    },
    LockAcquireReturned {
        thread: ProcessThreadId,
        lock: LockId,
        success: bool,
    },
    LockReleased {
        thread: ProcessThreadId,
        lock: LockId,
    },
    ObjectPulsedOne {
        thread: ProcessThreadId,
        lock: LockId,
    },
    ObjectPulsedAll {
        thread: ProcessThreadId,
        lock: LockId,
    },
    ObjectWaitAttempted {
        thread: ProcessThreadId,
        lock: LockId,
    },
    ObjectWaitReturned {
        thread: ProcessThreadId,
        lock: LockId,
        success: bool,
    },
    ObjectsCollected {
        process_id: u32,
        objects: Vec<ProcessTrackedObjectId>,
    },
}

impl OrderedEvent {
    pub fn process_id(&self) -> u32 {
        match self {
            OrderedEvent::ObjectsCollected { process_id, .. } => *process_id,
            OrderedEvent::ThreadCreated { thread }
            | OrderedEvent::ThreadRenamed { thread, .. }
            | OrderedEvent::ThreadDestroyed { thread }
            | OrderedEvent::ThreadStarted { thread, .. }
            | OrderedEvent::ThreadMappingUpdated { thread, .. }
            | OrderedEvent::ThreadJoinAttempted { thread, .. }
            | OrderedEvent::ThreadJoinReturned { thread, .. }
            | OrderedEvent::LockAcquireAttempted { thread, .. }
            | OrderedEvent::LockAcquireReturned { thread, .. }
            | OrderedEvent::LockReleased { thread, .. }
            | OrderedEvent::ObjectPulsedOne { thread, .. }
            | OrderedEvent::ObjectPulsedAll { thread, .. }
            | OrderedEvent::ObjectWaitAttempted { thread, .. }
            | OrderedEvent::ObjectWaitReturned { thread, .. } => thread.process_id,
        }
    }
}

/// Outcome of handing one recorded event to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    /// Delivered to the analysis stages
    Executed,
    /// Parked until the emitting thread is unblocked
    Deferred,
    /// Dropped without effect
    Discarded,
}

/// What a blocked thread is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitInfo {
    /// Blocked acquiring `lock`, currently held by `owner`
    Lock {
        owner: ProcessThreadId,
        lock: LockId,
    },
    /// Blocked in `Thread.Join` on `joinee`
    Thread { joinee: ProcessThreadId },
}

/// One ring entry of a detected deadlock cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeadlockThreadInfo {
    pub thread: ProcessThreadId,
    pub display_name: String,
    /// Successor of this thread in the cycle
    pub blocked_on: ProcessThreadId,
    pub wait_info: WaitInfo,
}

/// Represents one detected deadlock
///
/// Equality only considers the process and the ordered cycle, so a cycle that
/// persists across many detection passes compares equal to its first sighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockInfo {
    pub process_id: u32,
    /// Ring starting at the smallest thread id; each entry is blocked on the
    /// next one (wrapping)
    pub cycle: Vec<DeadlockThreadInfo>,
    /// ISO-8601 timestamp of the first sighting
    pub timestamp: String,
}

impl PartialEq for DeadlockInfo {
    fn eq(&self, other: &Self) -> bool {
        self.process_id == other.process_id && self.cycle == other.cycle
    }
}

impl Eq for DeadlockInfo {}

impl std::hash::Hash for DeadlockInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.process_id.hash(state);
        self.cycle.hash(state);
    }
}

impl DeadlockInfo {
    pub fn threads(&self) -> impl Iterator<Item = ProcessThreadId> + '_ {
        self.cycle.iter().map(|entry| entry.thread)
    }
}
