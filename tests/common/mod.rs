use hbtrace::{
    AnalysisStage, Analyzer, DeadlockInfo, EngineResult, EventPayload, EventState, OrderedEvent,
    Pipeline, RecordedEvent,
};
use std::sync::{Arc, Mutex as StdMutex};

#[allow(dead_code)]
pub const PID: u32 = 1;

#[allow(dead_code)]
pub struct AnalysisHarness {
    pub pipeline: Pipeline,
    pub deadlocks: Arc<StdMutex<Vec<DeadlockInfo>>>,
    pub delivered: Arc<StdMutex<Vec<OrderedEvent>>>,
}

/// Records every delivered event, in delivery order
struct RecordingStage {
    delivered: Arc<StdMutex<Vec<OrderedEvent>>>,
}

impl AnalysisStage for RecordingStage {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn on_event(&mut self, event: &OrderedEvent) -> EngineResult<()> {
        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[allow(dead_code)]
pub fn start_analysis() -> AnalysisHarness {
    let deadlocks = Arc::new(StdMutex::new(Vec::new()));
    let delivered = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&deadlocks);

    let pipeline = Analyzer::new()
        .callback(move |info| sink.lock().unwrap().push(info.clone()))
        .stage(Box::new(RecordingStage {
            delivered: Arc::clone(&delivered),
        }))
        .start()
        .expect("Failed to start analysis");

    AnalysisHarness {
        pipeline,
        deadlocks,
        delivered,
    }
}

impl AnalysisHarness {
    /// Feed events in receipt order, returning the state of each
    #[allow(dead_code)]
    pub fn feed(&mut self, events: Vec<RecordedEvent>) -> Vec<EventState> {
        events
            .into_iter()
            .map(|event| {
                self.pipeline
                    .process(event)
                    .expect("Event stream should be consistent")
            })
            .collect()
    }

    #[allow(dead_code)]
    pub fn delivered(&self) -> Vec<OrderedEvent> {
        self.delivered.lock().unwrap().clone()
    }
}

#[allow(dead_code)]
pub fn expect_deadlock(h: &AnalysisHarness) -> DeadlockInfo {
    let deadlocks = h.deadlocks.lock().unwrap();
    assert_eq!(deadlocks.len(), 1, "Expected exactly one deadlock");
    assert_eq!(h.pipeline.deadlocks().len(), 1);
    deadlocks[0].clone()
}

#[allow(dead_code)]
pub fn assert_no_deadlock(h: &AnalysisHarness) {
    assert!(h.deadlocks.lock().unwrap().is_empty(), "Unexpected deadlock detected");
    assert!(h.pipeline.deadlocks().is_empty());
}

/// Shorthand for the events of one thread of the analyzed process
#[derive(Clone, Copy)]
pub struct T(pub u64);

#[allow(dead_code)]
impl T {
    fn ev(self, payload: EventPayload) -> RecordedEvent {
        RecordedEvent::new(PID, self.0, payload)
    }

    pub fn create(self) -> RecordedEvent {
        self.ev(EventPayload::ThreadCreate)
    }

    pub fn rename(self, name: &str) -> RecordedEvent {
        self.ev(EventPayload::ThreadRename { name: name.into() })
    }

    pub fn destroy(self) -> RecordedEvent {
        self.ev(EventPayload::ThreadDestroy)
    }

    pub fn try_lock(self, lock: u64) -> RecordedEvent {
        self.ev(EventPayload::LockAcquireAttempt { lock })
    }

    pub fn locked(self, lock: u64) -> RecordedEvent {
        self.ev(EventPayload::LockAcquireResult { lock, success: true })
    }

    /// Attempt and successful result
    pub fn lock(self, lock: u64) -> Vec<RecordedEvent> {
        vec![self.try_lock(lock), self.locked(lock)]
    }

    pub fn release(self, lock: u64) -> RecordedEvent {
        self.ev(EventPayload::LockRelease { lock })
    }

    pub fn wait(self, lock: u64) -> RecordedEvent {
        self.ev(EventPayload::WaitAttempt { lock })
    }

    pub fn woke(self, lock: u64, success: bool) -> RecordedEvent {
        self.ev(EventPayload::WaitResult { lock, success })
    }

    pub fn pulse(self, lock: u64) -> RecordedEvent {
        self.ev(EventPayload::PulseOne { lock })
    }

    pub fn pulse_all(self, lock: u64) -> RecordedEvent {
        self.ev(EventPayload::PulseAll { lock })
    }

    pub fn start(self, thread_object: u64) -> RecordedEvent {
        self.ev(EventPayload::ThreadStart { thread_object })
    }

    pub fn join(self, thread_object: u64) -> RecordedEvent {
        self.ev(EventPayload::ThreadJoinAttempt { thread_object })
    }

    pub fn joined(self, thread_object: u64) -> RecordedEvent {
        self.ev(EventPayload::ThreadJoinResult { thread_object })
    }
}
