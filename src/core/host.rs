//! Event host: admission, replay and delivery
//!
//! The [`Pipeline`] owns one [`OrderingEngine`] per analyzed process and the
//! analysis stages. Each call to [`Pipeline::process`] handles one recorded
//! event atomically:
//!
//! 1. Events of a thread that is blocked are parked behind its earlier events
//! 2. Otherwise the engine decides; a deferred event is parked for replay
//! 3. Delivered events go to the deadlock detector, then to extra stages
//! 4. Threads unblocked along the way have their parked events replayed,
//!    transitively, before `process` returns

use crate::core::detector::reporting::Summary;
use crate::core::detector::{DeadlockDetector, DetectorConfig, RecordedDeadlock};
use crate::core::error::EngineResult;
use crate::core::logger;
use crate::core::metadata::{MetadataResolver, NullMetadataResolver, StackTraceSnapshot};
use crate::core::ordering::{Admission, OrderingEngine, RuntimeSnapshot};
use crate::core::stage::AnalysisStage;
use crate::core::types::{CommandId, EventState, OrderedEvent, ProcessThreadId, RecordedEvent};
use fxhash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Event counters of a pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Events received from the transport
    pub received: u64,
    /// Events delivered to the analysis stages (live or replayed)
    pub executed: u64,
    /// Times an event was parked
    pub deferred: u64,
    pub discarded: u64,
}

/// Everything a finished run has to say
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub summary: Summary,
    pub stats: PipelineStats,
    /// Threads whose events never became deliverable
    pub blocked_threads: Vec<ProcessThreadId>,
}

pub struct Pipeline {
    engines: FxHashMap<u32, OrderingEngine>,
    detector: DeadlockDetector,
    stages: Vec<Box<dyn AnalysisStage>>,
    resolver: Arc<dyn MetadataResolver>,
    stats: PipelineStats,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl Pipeline {
    pub fn new(config: DetectorConfig) -> Self {
        Pipeline {
            engines: FxHashMap::default(),
            detector: DeadlockDetector::new(config),
            stages: Vec::new(),
            resolver: Arc::new(NullMetadataResolver),
            stats: PipelineStats::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn MetadataResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Append a stage that sees delivered events after the detector
    pub fn add_stage(&mut self, stage: Box<dyn AnalysisStage>) {
        self.stages.push(stage);
    }

    /// Handle one recorded event and drain every thread it unblocked
    ///
    /// # Errors
    /// Any `EngineError` is fatal for the run: the event stream contradicts
    /// the replayed state and nothing after it can be trusted.
    pub fn process(&mut self, event: RecordedEvent) -> EngineResult<EventState> {
        self.stats.received += 1;
        if event.metadata.thread_id == 0 {
            // Not a managed thread
            return Ok(self.finish(&event, EventState::Discarded));
        }

        let process_id = event.metadata.process_id;
        let thread = event.thread();
        let engine = self.engine_mut(process_id);
        if engine.delivery().is_blocked(thread) {
            trace!(%thread, "parking event behind earlier deferred events");
            let state = self.finish(&event, EventState::Deferred);
            self.engine_mut(process_id)
                .delivery_mut()
                .enqueue_blocked_event(thread, event);
            return Ok(state);
        }

        let state = self.execute(event)?;
        self.drain_unblocked(process_id)?;
        Ok(state)
    }

    /// Route stack traces answering a snapshot request to their deadlock
    pub fn on_stack_trace_snapshots(
        &mut self,
        process_id: u32,
        command_id: CommandId,
        snapshots: Vec<StackTraceSnapshot>,
    ) -> bool {
        self.detector
            .attach_stack_traces(process_id, command_id, snapshots)
    }

    pub fn deadlocks(&self) -> &[RecordedDeadlock] {
        self.detector.deadlocks()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn summary(&self) -> Summary {
        self.detector.create_summary(self.resolver.as_ref())
    }

    /// Threads of all processes that are still blocked, sorted
    pub fn blocked_threads(&self) -> Vec<ProcessThreadId> {
        let mut threads: Vec<_> = self
            .engines
            .values()
            .flat_map(|engine| engine.delivery().blocked_threads())
            .collect();
        threads.sort();
        threads
    }

    pub fn snapshot(&self, process_id: u32) -> Option<RuntimeSnapshot> {
        self.engines.get(&process_id).map(OrderingEngine::snapshot)
    }

    pub fn report(&self) -> PipelineReport {
        PipelineReport {
            summary: self.summary(),
            stats: self.stats,
            blocked_threads: self.blocked_threads(),
        }
    }

    fn engine_mut(&mut self, process_id: u32) -> &mut OrderingEngine {
        self.engines
            .entry(process_id)
            .or_insert_with(|| OrderingEngine::new(process_id))
    }

    /// Run admission for an event of a thread that is not blocked
    fn execute(&mut self, event: RecordedEvent) -> EngineResult<EventState> {
        let thread = event.thread();
        let engine = self.engine_mut(event.metadata.process_id);
        match engine.admit(&event)? {
            Admission::Deliver(ordered) => {
                self.deliver(&ordered)?;
                Ok(self.finish(&event, EventState::Executed))
            }
            Admission::Defer => {
                let state = self.finish(&event, EventState::Deferred);
                self.engine_mut(event.metadata.process_id)
                    .delivery_mut()
                    .enqueue_blocked_event(thread, event);
                Ok(state)
            }
            Admission::Discard => Ok(self.finish(&event, EventState::Discarded)),
        }
    }

    fn deliver(&mut self, event: &OrderedEvent) -> EngineResult<()> {
        self.detector.on_event(event)?;
        for stage in &mut self.stages {
            stage.on_event(event)?;
        }
        Ok(())
    }

    /// Replay parked events of unblocked threads until no thread is unblocked
    fn drain_unblocked(&mut self, process_id: u32) -> EngineResult<()> {
        loop {
            let unblocked = self
                .engine_mut(process_id)
                .delivery_mut()
                .consume_unblocked_threads();
            if unblocked.is_empty() {
                return Ok(());
            }
            for thread in unblocked {
                self.replay(process_id, thread)?;
            }
        }
    }

    fn replay(&mut self, process_id: u32, thread: ProcessThreadId) -> EngineResult<()> {
        let parked = self
            .engine_mut(process_id)
            .delivery_mut()
            .consume_undelivered_events(thread);
        debug!(%thread, events = parked.len(), "replaying parked events");

        let mut parked = parked.into_iter();
        while let Some(event) = parked.next() {
            if self.execute(event)? == EventState::Deferred {
                // Blocked again: keep the rest queued behind the deferred event
                let delivery = self.engine_mut(process_id).delivery_mut();
                for rest in parked {
                    delivery.enqueue_blocked_event(thread, rest);
                }
                break;
            }
        }
        Ok(())
    }

    fn finish(&mut self, event: &RecordedEvent, state: EventState) -> EventState {
        match state {
            EventState::Executed => self.stats.executed += 1,
            EventState::Deferred => self.stats.deferred += 1,
            EventState::Discarded => self.stats.discarded += 1,
        }
        logger::log_event(event, state);
        state
    }
}
