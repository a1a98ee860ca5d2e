//! Incremental deadlock detection over the ordered event stream
//!
//! The DeadlockDetector is an analysis stage. It keeps the concurrency
//! read-model in lockstep with delivered events and, after every event that
//! can add a wait-for edge, rebuilds the wait-for graph of that process and
//! looks for cycles.
//!
//! # How it works
//!
//! 1. Delivered events update the [`ConcurrencyContext`]
//! 2. Lock acquire attempts, join attempts, wait returns and thread
//!    destruction trigger a detection pass for the event's process
//! 3. The pass rebuilds the [`WaitForGraph`] from scratch and runs Tarjan
//! 4. Every cycle becomes a [`DeadlockInfo`]; cycles already reported are
//!    dropped, new ones are logged, snapshotted and passed to the callback

mod deadlock_handling;
pub mod reporting;

use crate::core::commands::CommandSender;
use crate::core::concurrency::ConcurrencyContext;
use crate::core::error::EngineResult;
use crate::core::graph::WaitForGraph;
use crate::core::metadata::StackTraceSnapshot;
use crate::core::stage::AnalysisStage;
use crate::core::types::{CommandId, DeadlockInfo, OrderedEvent, ProcessThreadId};
use fxhash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::sync::Arc;

/// Callback invoked once per newly detected deadlock
pub type DeadlockCallback = Arc<dyn Fn(&DeadlockInfo) + Send + Sync>;

/// Configuration for the deadlock detector
#[derive(Clone, Default)]
pub struct DetectorConfig {
    /// Function to call when a deadlock is detected
    pub callback: Option<DeadlockCallback>,
    /// Where stack-trace snapshot requests go
    pub command_sender: Option<Arc<dyn CommandSender>>,
    /// Request snapshots of the cycle's threads on first sighting
    pub capture_stack_traces: bool,
}

/// A deadlock as kept for reporting
#[derive(Debug, Clone, Serialize)]
pub struct RecordedDeadlock {
    pub info: DeadlockInfo,
    /// Correlation id of the snapshot request, if one was sent
    pub command_id: Option<CommandId>,
    /// Snapshots received for `command_id`
    pub snapshots: Vec<StackTraceSnapshot>,
}

/// Wait-for-graph deadlock detector
pub struct DeadlockDetector {
    context: ConcurrencyContext,
    thread_names: FxHashMap<ProcessThreadId, String>,
    /// One graph per process, rebuilt before every pass
    graphs: FxHashMap<u32, WaitForGraph>,
    seen: FxHashSet<DeadlockInfo>,
    /// Deadlocks in detection order
    deadlocks: Vec<RecordedDeadlock>,
    config: DetectorConfig,
}

impl Default for DeadlockDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl DeadlockDetector {
    pub fn new(config: DetectorConfig) -> Self {
        DeadlockDetector {
            context: ConcurrencyContext::new(),
            thread_names: FxHashMap::default(),
            graphs: FxHashMap::default(),
            seen: FxHashSet::default(),
            deadlocks: Vec::new(),
            config,
        }
    }

    pub fn context(&self) -> &ConcurrencyContext {
        &self.context
    }

    pub fn deadlocks(&self) -> &[RecordedDeadlock] {
        &self.deadlocks
    }

    pub fn thread_name(&self, thread: ProcessThreadId) -> Option<&str> {
        self.thread_names.get(&thread).map(String::as_str)
    }

    fn apply(&mut self, event: &OrderedEvent) -> EngineResult<bool> {
        let ctx = &mut self.context;
        let check = match event {
            OrderedEvent::ThreadCreated { thread } => {
                ctx.record_thread_created(*thread);
                false
            }
            OrderedEvent::ThreadRenamed { thread, name } => {
                // The runtime may name a thread before reporting its creation
                ctx.record_thread_created(*thread);
                self.thread_names.insert(*thread, name.clone());
                false
            }
            OrderedEvent::ThreadDestroyed { thread } => {
                ctx.record_thread_destroyed(*thread);
                true
            }
            OrderedEvent::ThreadJoinAttempted { thread, joinee } => {
                ctx.record_thread_join_called(*thread, *joinee)?;
                true
            }
            OrderedEvent::ThreadJoinReturned { thread, .. } => {
                ctx.record_thread_join_returned(*thread)?;
                false
            }
            OrderedEvent::LockAcquireAttempted { thread, lock } => {
                ctx.record_lock_acquire_called(*thread, *lock)?;
                true
            }
            OrderedEvent::LockAcquireReturned {
                thread,
                lock,
                success,
            } => {
                ctx.record_lock_acquire_returned(*thread, *lock, *success)?;
                false
            }
            OrderedEvent::LockReleased { thread, lock } => {
                ctx.record_lock_release_returned(*thread, *lock)?;
                false
            }
            OrderedEvent::ObjectWaitAttempted { thread, lock } => {
                ctx.record_object_wait_called(*thread, *lock)?;
                false
            }
            OrderedEvent::ObjectWaitReturned { thread, lock, .. } => {
                ctx.record_object_wait_returned(*thread, *lock)?;
                true
            }
            OrderedEvent::ThreadStarted { .. }
            | OrderedEvent::ThreadMappingUpdated { .. }
            | OrderedEvent::ObjectPulsedOne { .. }
            | OrderedEvent::ObjectPulsedAll { .. }
            | OrderedEvent::ObjectsCollected { .. } => false,
        };
        Ok(check)
    }
}

impl AnalysisStage for DeadlockDetector {
    fn name(&self) -> &'static str {
        "deadlock-detector"
    }

    fn on_event(&mut self, event: &OrderedEvent) -> EngineResult<()> {
        if self.apply(event)? {
            self.check_for_deadlocks(event.process_id())?;
        }
        Ok(())
    }
}
