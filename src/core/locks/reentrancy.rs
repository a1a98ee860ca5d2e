use crate::core::error::{EngineError, EngineResult};
use crate::core::types::ProcessThreadId;
use fxhash::FxHashMap;

/// Reentrancy depths released by `Monitor.Wait`, per thread
///
/// Nested waits of one thread on different locks restore in LIFO order, so
/// each thread owns a stack.
#[derive(Debug, Default)]
pub struct ReentrancyTracker {
    counts: FxHashMap<ProcessThreadId, Vec<u32>>,
}

impl ReentrancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, thread: ProcessThreadId, count: u32) {
        self.counts.entry(thread).or_default().push(count);
    }

    pub fn peek(&self, thread: ProcessThreadId) -> Option<u32> {
        self.counts.get(&thread).and_then(|stack| stack.last().copied())
    }

    pub fn pop(&mut self, thread: ProcessThreadId) -> EngineResult<u32> {
        self.counts
            .get_mut(&thread)
            .and_then(Vec::pop)
            .ok_or(EngineError::MissingReentrancyCount(thread))
    }

    /// Forget a destroyed thread
    pub fn remove_thread(&mut self, thread: ProcessThreadId) {
        self.counts.remove(&thread);
    }
}
