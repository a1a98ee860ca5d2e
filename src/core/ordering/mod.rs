//! Admission control for recorded events
//!
//! The OrderingEngine turns the receipt-ordered trace of one process into a
//! causally consistent single-threaded replay. For every event it either
//! delivers an [`OrderedEvent`] right away, or blocks the emitting thread in
//! the [`EventDeliveryContext`] until the precondition holds. The host then
//! parks the event and replays it once the thread is unblocked.
//!
//! # Preconditions
//!
//! | Event | Delivered when |
//! |---|---|
//! | lock acquire result | the lock is free or owned by the caller |
//! | wait result | the lock is free/self-owned and the caller was pulsed, or the wait timed out |
//! | join attempt | the joinee object is mapped to a thread |
//!
//! Every other event is delivered immediately.

mod threads;

pub use threads::ThreadObjectRegistry;

use crate::core::delivery::EventDeliveryContext;
use crate::core::error::{EngineError, EngineResult};
use crate::core::locks::{LockRegistry, ReentrancyTracker, ShadowLock};
use crate::core::types::{
    EventPayload, LockId, OrderedEvent, ProcessThreadId, ProcessTrackedObjectId, RecordedEvent,
};
use fxhash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of admission control for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The event takes effect now
    Deliver(OrderedEvent),
    /// The emitting thread was blocked; the event must be replayed later
    Defer,
    /// The event is dropped as a best-effort no-op
    Discard,
}

/// Live state of the engine, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    pub threads: Vec<ProcessThreadId>,
    pub locks: Vec<ShadowLock>,
    pub blocked_threads: Vec<ProcessThreadId>,
}

/// Per-process admission control engine
pub struct OrderingEngine {
    process_id: u32,
    locks: LockRegistry,
    reentrancy: ReentrancyTracker,
    thread_objects: ThreadObjectRegistry,
    threads: FxHashSet<ProcessThreadId>,
    delivery: EventDeliveryContext,
}

impl OrderingEngine {
    pub fn new(process_id: u32) -> Self {
        OrderingEngine {
            process_id,
            locks: LockRegistry::new(),
            reentrancy: ReentrancyTracker::new(),
            thread_objects: ThreadObjectRegistry::new(),
            threads: FxHashSet::default(),
            delivery: EventDeliveryContext::new(),
        }
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn delivery(&self) -> &EventDeliveryContext {
        &self.delivery
    }

    pub fn delivery_mut(&mut self) -> &mut EventDeliveryContext {
        &mut self.delivery
    }

    pub fn lock(&self, id: LockId) -> Option<&ShadowLock> {
        self.locks.get(id)
    }

    /// Decide whether `event` takes effect now
    ///
    /// # Errors
    /// Returns an `EngineError` when the event contradicts the replayed state.
    /// Such errors are fatal for the process being analyzed.
    pub fn admit(&mut self, event: &RecordedEvent) -> EngineResult<Admission> {
        if event.metadata.process_id != self.process_id {
            return Err(EngineError::ProcessMismatch {
                expected: self.process_id,
                actual: event.metadata.process_id,
            });
        }

        let thread = event.thread();
        match &event.payload {
            EventPayload::ThreadCreate => Ok(self.on_thread_create(thread)),
            EventPayload::ThreadRename { name } => {
                Ok(Admission::Deliver(OrderedEvent::ThreadRenamed {
                    thread,
                    name: name.clone(),
                }))
            }
            EventPayload::ThreadDestroy => Ok(self.on_thread_destroy(thread)),
            EventPayload::ThreadStart { thread_object } => {
                Ok(self.on_thread_start(thread, event.object(*thread_object), false))
            }
            EventPayload::ThreadMapping { thread_object } => {
                Ok(self.on_thread_start(thread, event.object(*thread_object), true))
            }
            EventPayload::ThreadJoinAttempt { thread_object } => {
                Ok(self.on_join_attempt(thread, event.object(*thread_object)))
            }
            EventPayload::ThreadJoinResult { thread_object } => {
                self.on_join_result(thread, event.object(*thread_object))
            }
            EventPayload::LockAcquireAttempt { lock } => {
                Ok(self.on_acquire_attempt(thread, event.object(*lock)))
            }
            EventPayload::LockAcquireResult { lock, success } => {
                self.on_acquire_result(thread, event.object(*lock), *success)
            }
            EventPayload::LockRelease { lock } => self.on_release(thread, event.object(*lock)),
            EventPayload::PulseOne { lock } => self.on_pulse(thread, event.object(*lock), false),
            EventPayload::PulseAll { lock } => self.on_pulse(thread, event.object(*lock), true),
            EventPayload::WaitAttempt { lock } => self.on_wait_attempt(thread, event.object(*lock)),
            EventPayload::WaitResult { lock, success } => {
                self.on_wait_result(thread, event.object(*lock), *success)
            }
            EventPayload::GarbageCollected { objects } => {
                let objects: Vec<_> = objects.iter().map(|&id| event.object(id)).collect();
                Ok(self.on_garbage_collected(objects))
            }
        }
    }

    /// Live threads and locks, sorted
    pub fn snapshot(&self) -> RuntimeSnapshot {
        let mut threads: Vec<_> = self.threads.iter().copied().collect();
        threads.sort();
        RuntimeSnapshot {
            threads,
            locks: self.locks.all_locks(),
            blocked_threads: self.delivery.blocked_threads(),
        }
    }

    fn on_thread_create(&mut self, thread: ProcessThreadId) -> Admission {
        self.threads.insert(thread);
        Admission::Deliver(OrderedEvent::ThreadCreated { thread })
    }

    fn on_thread_destroy(&mut self, thread: ProcessThreadId) -> Admission {
        self.threads.remove(&thread);
        self.reentrancy.remove_thread(thread);
        self.delivery.remove_thread(thread);
        Admission::Deliver(OrderedEvent::ThreadDestroyed { thread })
    }

    fn on_thread_start(
        &mut self,
        thread: ProcessThreadId,
        thread_object: ProcessTrackedObjectId,
        is_mapping: bool,
    ) -> Admission {
        self.thread_objects.register(thread_object, thread);
        // Joins deferred on this object become deliverable right after this event
        self.delivery.unblock_for_thread_start(thread_object);
        if is_mapping {
            Admission::Deliver(OrderedEvent::ThreadMappingUpdated {
                thread,
                thread_object,
            })
        } else {
            info!(%thread, %thread_object, "thread started");
            Admission::Deliver(OrderedEvent::ThreadStarted {
                thread,
                thread_object,
            })
        }
    }

    fn on_join_attempt(
        &mut self,
        thread: ProcessThreadId,
        thread_object: ProcessTrackedObjectId,
    ) -> Admission {
        match self.thread_objects.try_get(thread_object) {
            Some(joinee) => Admission::Deliver(OrderedEvent::ThreadJoinAttempted { thread, joinee }),
            None => {
                debug!(%thread, %thread_object, "deferring join until the joinee is mapped");
                self.delivery.block_for_thread_start(thread, thread_object);
                Admission::Defer
            }
        }
    }

    fn on_join_result(
        &mut self,
        thread: ProcessThreadId,
        thread_object: ProcessTrackedObjectId,
    ) -> EngineResult<Admission> {
        let joinee = self.thread_objects.get(thread_object)?;
        Ok(Admission::Deliver(OrderedEvent::ThreadJoinReturned {
            thread,
            joinee,
        }))
    }

    fn on_acquire_attempt(&mut self, thread: ProcessThreadId, lock: LockId) -> Admission {
        self.locks.get_or_add(lock);
        Admission::Deliver(OrderedEvent::LockAcquireAttempted { thread, lock })
    }

    fn on_acquire_result(
        &mut self,
        thread: ProcessThreadId,
        lock: LockId,
        success: bool,
    ) -> EngineResult<Admission> {
        let shadow = self.locks.get_or_add(lock);
        if !success {
            // Failed try-acquire: nothing changes hands
            return Ok(Admission::Deliver(OrderedEvent::LockAcquireReturned {
                thread,
                lock,
                success,
            }));
        }

        if !shadow.is_available_for(thread) {
            debug!(%thread, %lock, "deferring acquire of a held lock");
            self.delivery.block_for_object(thread, lock);
            return Ok(Admission::Defer);
        }

        shadow.acquire(thread)?;
        Ok(Admission::Deliver(OrderedEvent::LockAcquireReturned {
            thread,
            lock,
            success,
        }))
    }

    fn on_release(&mut self, thread: ProcessThreadId, lock: LockId) -> EngineResult<Admission> {
        self.locks.get_mut(lock)?.release(thread)?;
        self.delivery.unblock_for_object(lock);
        Ok(Admission::Deliver(OrderedEvent::LockReleased { thread, lock }))
    }

    fn on_pulse(
        &mut self,
        thread: ProcessThreadId,
        lock: LockId,
        all: bool,
    ) -> EngineResult<Admission> {
        self.locks.get_mut(lock)?;
        let signaled = if all {
            self.delivery.signal_all_pulse_waiters(lock)
        } else {
            self.delivery.signal_one_pulse_waiter(lock)
        };
        if !signaled {
            // The recorded interleaving can legitimately pulse before the wait is replayed
            warn!(%thread, %lock, pulse_all = all, "no threads were waiting for pulse");
        }

        Ok(Admission::Deliver(if all {
            OrderedEvent::ObjectPulsedAll { thread, lock }
        } else {
            OrderedEvent::ObjectPulsedOne { thread, lock }
        }))
    }

    fn on_wait_attempt(&mut self, thread: ProcessThreadId, lock: LockId) -> EngineResult<Admission> {
        let depth = self.locks.get_or_add(lock).release_all(thread)?;
        self.reentrancy.push(thread, depth);
        self.delivery.register_pulse_waiter(thread, lock);
        // Releasing may free a queued acquirer
        self.delivery.unblock_for_object(lock);
        Ok(Admission::Deliver(OrderedEvent::ObjectWaitAttempted {
            thread,
            lock,
        }))
    }

    fn on_wait_result(
        &mut self,
        thread: ProcessThreadId,
        lock: LockId,
        success: bool,
    ) -> EngineResult<Admission> {
        if self.reentrancy.peek(thread).is_none() {
            warn!(%thread, %lock, "wait returned before its wait attempt was processed");
            return Ok(Admission::Discard);
        }

        let available = self.locks.get_mut(lock)?.is_available_for(thread);
        let pulsed = !self.delivery.is_waiting_for_pulse(thread, lock);
        let admissible = available && (pulsed || !success);
        if !admissible {
            debug!(%thread, %lock, available, pulsed, "deferring wait return");
            self.delivery.block_for_object(thread, lock);
            if available {
                self.delivery.unblock_next_acquirer(lock);
            }
            return Ok(Admission::Defer);
        }

        if !pulsed {
            // Timed out without a pulse
            self.delivery.unregister_pulse_waiter(thread, lock);
        }
        let depth = self.reentrancy.pop(thread)?;
        self.locks.get_mut(lock)?.acquire_multiple(thread, depth)?;
        Ok(Admission::Deliver(OrderedEvent::ObjectWaitReturned {
            thread,
            lock,
            success,
        }))
    }

    fn on_garbage_collected(&mut self, objects: Vec<ProcessTrackedObjectId>) -> Admission {
        let removed = self.locks.remove_range(objects.iter().copied());
        debug!(process_id = self.process_id, removed, "collected shadow locks");
        Admission::Deliver(OrderedEvent::ObjectsCollected {
            process_id: self.process_id,
            objects,
        })
    }
}
