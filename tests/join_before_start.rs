use hbtrace::{EventPayload, EventState, OrderedEvent, ProcessThreadId, RecordedEvent, WaitInfo};
mod common;
use common::{PID, T, assert_no_deadlock, expect_deadlock, start_analysis};

const WORKER_OBJECT: u64 = 500;

#[test]
fn test_join_waits_for_thread_start() {
    let mut harness = start_analysis();
    let (main, worker) = (T(1), T(2));

    harness.feed(vec![main.create(), worker.create()]);
    // The join was received before the worker reported its thread object
    let states = harness.feed(vec![main.join(WORKER_OBJECT), main.try_lock(10)]);
    assert_eq!(states, vec![EventState::Deferred, EventState::Deferred]);
    assert_eq!(
        harness.pipeline.blocked_threads(),
        vec![ProcessThreadId::new(PID, 1)]
    );

    let states = harness.feed(vec![worker.start(WORKER_OBJECT)]);
    assert_eq!(states, vec![EventState::Executed]);
    assert!(harness.pipeline.blocked_threads().is_empty());

    let delivered = harness.delivered();
    let tail = &delivered[delivered.len() - 3..];
    assert!(matches!(tail[0], OrderedEvent::ThreadStarted { .. }));
    assert_eq!(
        tail[1],
        OrderedEvent::ThreadJoinAttempted {
            thread: ProcessThreadId::new(PID, 1),
            joinee: ProcessThreadId::new(PID, 2),
        }
    );
    assert!(matches!(tail[2], OrderedEvent::LockAcquireAttempted { .. }));

    harness.feed(vec![worker.destroy(), main.joined(WORKER_OBJECT)]);
    assert_no_deadlock(&harness);
    let stats = harness.pipeline.stats();
    assert_eq!(stats.received, 7);
    assert_eq!(stats.deferred, 2);
    assert_eq!(stats.executed, 7);
}

#[test]
fn test_runtime_mapping_also_resolves_joins() {
    let mut harness = start_analysis();
    let main = T(1);

    harness.feed(vec![main.create(), main.join(WORKER_OBJECT)]);
    let mapping = RecordedEvent::new(
        PID,
        2,
        EventPayload::ThreadMapping {
            thread_object: WORKER_OBJECT,
        },
    );
    assert_eq!(harness.feed(vec![mapping]), vec![EventState::Executed]);
    assert!(harness.pipeline.blocked_threads().is_empty());
}

#[test]
fn test_join_while_holding_lock_deadlocks() {
    let mut harness = start_analysis();
    let (main, worker) = (T(1), T(2));

    let mut events = vec![main.create(), worker.create(), worker.start(WORKER_OBJECT)];
    events.extend(main.lock(10));
    events.push(main.join(WORKER_OBJECT));
    events.push(worker.try_lock(10));
    harness.feed(events);

    let info = expect_deadlock(&harness);
    assert_eq!(info.cycle.len(), 2);
    assert_eq!(
        info.cycle[0].wait_info,
        WaitInfo::Thread {
            joinee: ProcessThreadId::new(PID, 2)
        }
    );
    assert!(matches!(info.cycle[1].wait_info, WaitInfo::Lock { .. }));

    let summary = harness.pipeline.summary();
    assert!(
        summary.reports[0]
            .reasons
            .iter()
            .any(|reason| reason.reason.starts_with("Blocked - waiting for thread"))
    );
}
