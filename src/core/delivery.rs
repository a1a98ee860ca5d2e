//! Gating and replay of recorded events
//!
//! The delivery context decides which threads may have their events processed
//! right now. A thread whose event needs a causal precondition (a free lock, a
//! pulse, a known joinee) is *blocked*: its later events are parked in a FIFO
//! until the precondition is met, then the thread becomes *unblocked* and the
//! host replays the parked events in receipt order.
//!
//! Three independent queues decide who gets unblocked:
//! 1. per-lock acquirer queues (`block_for_object` / `unblock_for_object`)
//! 2. per-lock pulse-waiter queues (`Monitor.Wait` / `Pulse` pairing)
//! 3. per-thread-object join queues (joinee identity not yet known)

use crate::core::types::{LockId, ProcessThreadId, ProcessTrackedObjectId, RecordedEvent};
use fxhash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct EventDeliveryContext {
    /// Parked events per thread, in receipt order
    undelivered: FxHashMap<ProcessThreadId, VecDeque<RecordedEvent>>,
    /// Threads waiting to acquire each lock, first blocked first
    wait_for_lock: FxHashMap<LockId, VecDeque<ProcessThreadId>>,
    /// Threads registered by `Monitor.Wait` and not yet pulsed
    wait_for_pulse: FxHashMap<LockId, VecDeque<ProcessThreadId>>,
    /// Joiners waiting for a thread object to be mapped to a thread
    wait_for_thread_start: FxHashMap<ProcessTrackedObjectId, VecDeque<ProcessThreadId>>,
    blocked: FxHashSet<ProcessThreadId>,
    /// Unblocked but not yet drained; kept in unblock order for determinism
    unblocked: VecDeque<ProcessThreadId>,
    unblocked_set: FxHashSet<ProcessThreadId>,
}

impl EventDeliveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block `thread` until `lock` admits it
    pub fn block_for_object(&mut self, thread: ProcessThreadId, lock: LockId) {
        self.block(thread);
        self.wait_for_lock.entry(lock).or_default().push_back(thread);
    }

    /// Admit the first thread queued on `lock`, if any
    ///
    /// Called once per release; at most one thread moves per call.
    pub fn unblock_for_object(&mut self, lock: LockId) {
        if let Some(thread) = self
            .wait_for_lock
            .get_mut(&lock)
            .and_then(VecDeque::pop_front)
        {
            self.unblock(thread);
        }
    }

    /// Admit the first thread queued on `lock` that is not parked on a pulse
    ///
    /// A wait-return that is only missing its pulse must not swallow the
    /// admission of a plain acquirer queued behind it while the lock is free.
    pub fn unblock_next_acquirer(&mut self, lock: LockId) {
        let pulse_waiters = self.wait_for_pulse.get(&lock);
        let Some(queue) = self.wait_for_lock.get_mut(&lock) else {
            return;
        };
        let position = queue
            .iter()
            .position(|thread| pulse_waiters.is_none_or(|waiters| !waiters.contains(thread)));
        if let Some(thread) = position.and_then(|index| queue.remove(index)) {
            self.unblock(thread);
        }
    }

    /// Block `thread` until `thread_object` is mapped to a thread id
    pub fn block_for_thread_start(
        &mut self,
        thread: ProcessThreadId,
        thread_object: ProcessTrackedObjectId,
    ) {
        self.block(thread);
        self.wait_for_thread_start
            .entry(thread_object)
            .or_default()
            .push_back(thread);
    }

    /// Admit every joiner waiting on `thread_object`
    pub fn unblock_for_thread_start(&mut self, thread_object: ProcessTrackedObjectId) {
        if let Some(waiters) = self.wait_for_thread_start.remove(&thread_object) {
            for thread in waiters {
                self.unblock(thread);
            }
        }
    }

    pub fn register_pulse_waiter(&mut self, thread: ProcessThreadId, lock: LockId) {
        let waiters = self.wait_for_pulse.entry(lock).or_default();
        if !waiters.contains(&thread) {
            waiters.push_back(thread);
        }
    }

    pub fn unregister_pulse_waiter(&mut self, thread: ProcessThreadId, lock: LockId) {
        if let Some(waiters) = self.wait_for_pulse.get_mut(&lock) {
            waiters.retain(|&t| t != thread);
            if waiters.is_empty() {
                self.wait_for_pulse.remove(&lock);
            }
        }
    }

    pub fn is_waiting_for_pulse(&self, thread: ProcessThreadId, lock: LockId) -> bool {
        self.wait_for_pulse
            .get(&lock)
            .is_some_and(|waiters| waiters.contains(&thread))
    }

    /// Signal the longest waiting pulse-waiter of `lock`
    ///
    /// # Returns
    /// Whether any thread was waiting
    pub fn signal_one_pulse_waiter(&mut self, lock: LockId) -> bool {
        let Some(waiters) = self.wait_for_pulse.get_mut(&lock) else {
            return false;
        };
        let signaled = waiters.pop_front().is_some();
        if waiters.is_empty() {
            self.wait_for_pulse.remove(&lock);
        }
        signaled
    }

    /// Signal every pulse-waiter of `lock`
    ///
    /// # Returns
    /// Whether any thread was waiting
    pub fn signal_all_pulse_waiters(&mut self, lock: LockId) -> bool {
        self.wait_for_pulse
            .remove(&lock)
            .is_some_and(|waiters| !waiters.is_empty())
    }

    /// Park an event of a blocked (or not yet drained) thread
    pub fn enqueue_blocked_event(&mut self, thread: ProcessThreadId, event: RecordedEvent) {
        self.undelivered.entry(thread).or_default().push_back(event);
    }

    /// Take all parked events of `thread`, oldest first
    pub fn consume_undelivered_events(&mut self, thread: ProcessThreadId) -> Vec<RecordedEvent> {
        self.undelivered
            .get_mut(&thread)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Whether live events of `thread` must be parked instead of processed
    pub fn is_blocked(&self, thread: ProcessThreadId) -> bool {
        self.blocked.contains(&thread) || self.unblocked_set.contains(&thread)
    }

    pub fn has_blocked_threads(&self) -> bool {
        !self.blocked.is_empty()
    }

    pub fn has_unblocked_threads(&self) -> bool {
        !self.unblocked.is_empty()
    }

    pub fn has_any_undelivered_events(&self) -> bool {
        self.undelivered.values().any(|queue| !queue.is_empty())
    }

    pub fn has_undelivered_events(&self, thread: ProcessThreadId) -> bool {
        self.undelivered
            .get(&thread)
            .is_some_and(|queue| !queue.is_empty())
    }

    /// Threads still blocked, sorted
    pub fn blocked_threads(&self) -> Vec<ProcessThreadId> {
        let mut threads: Vec<_> = self.blocked.iter().copied().collect();
        threads.sort();
        threads
    }

    /// Yield and clear the unblocked threads, in unblock order
    pub fn consume_unblocked_threads(&mut self) -> Vec<ProcessThreadId> {
        self.unblocked_set.clear();
        self.unblocked.drain(..).collect()
    }

    /// Forget all state of a destroyed thread
    pub fn remove_thread(&mut self, thread: ProcessThreadId) {
        self.undelivered.remove(&thread);
        self.blocked.remove(&thread);
        for waiters in self.wait_for_pulse.values_mut() {
            waiters.retain(|&t| t != thread);
        }
        self.wait_for_pulse.retain(|_, waiters| !waiters.is_empty());
    }

    fn block(&mut self, thread: ProcessThreadId) {
        self.undelivered.entry(thread).or_default();
        self.blocked.insert(thread);
    }

    fn unblock(&mut self, thread: ProcessThreadId) {
        self.blocked.remove(&thread);
        if self.unblocked_set.insert(thread) {
            self.unblocked.push_back(thread);
        }
    }
}
