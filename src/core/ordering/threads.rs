use crate::core::error::{EngineError, EngineResult};
use crate::core::types::{ProcessThreadId, ProcessTrackedObjectId};
use fxhash::FxHashMap;

/// Maps managed thread objects to the threads they represent
///
/// `Thread.Join` names its joinee by object id; the engine can only order the
/// join once that object has been bound to a thread by a start or mapping event.
#[derive(Debug, Default)]
pub struct ThreadObjectRegistry {
    threads_by_object: FxHashMap<ProcessTrackedObjectId, ProcessThreadId>,
}

impl ThreadObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, thread_object: ProcessTrackedObjectId, thread: ProcessThreadId) {
        self.threads_by_object.insert(thread_object, thread);
    }

    pub fn try_get(&self, thread_object: ProcessTrackedObjectId) -> Option<ProcessThreadId> {
        self.threads_by_object.get(&thread_object).copied()
    }

    pub fn get(&self, thread_object: ProcessTrackedObjectId) -> EngineResult<ProcessThreadId> {
        self.try_get(thread_object)
            .ok_or(EngineError::UnknownThreadObject(thread_object))
    }
}
