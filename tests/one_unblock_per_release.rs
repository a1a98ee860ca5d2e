use hbtrace::{EventState, ProcessThreadId};
mod common;
use common::{PID, T, assert_no_deadlock, start_analysis};

#[test]
fn test_each_release_admits_one_waiter() {
    let mut harness = start_analysis();
    let (t1, t2, t3) = (T(1), T(2), T(3));

    let mut events = vec![t1.create(), t2.create(), t3.create()];
    events.extend(t1.lock(10));
    events.extend(t2.lock(10));
    events.extend(t3.lock(10));
    let states = harness.feed(events);
    assert_eq!(
        &states[3..],
        &[
            EventState::Executed,
            EventState::Executed,
            EventState::Executed,
            EventState::Deferred,
            EventState::Executed,
            EventState::Deferred,
        ]
    );
    assert_eq!(
        harness.pipeline.blocked_threads(),
        vec![ProcessThreadId::new(PID, 2), ProcessThreadId::new(PID, 3)]
    );

    harness.feed(vec![t1.release(10)]);
    assert_eq!(
        harness.pipeline.blocked_threads(),
        vec![ProcessThreadId::new(PID, 3)]
    );

    harness.feed(vec![t2.release(10)]);
    assert!(harness.pipeline.blocked_threads().is_empty());
    assert_no_deadlock(&harness);
}

#[test]
fn test_replayed_thread_can_block_again() {
    let mut harness = start_analysis();
    let (t1, t2) = (T(1), T(2));

    let mut events = vec![t1.create(), t2.create()];
    events.extend(t1.lock(10));
    events.extend(t1.lock(20));
    // Thread 2 runs ahead: both acquires are received while thread 1 holds the locks
    events.extend(t2.lock(10));
    events.extend(t2.lock(20));
    events.push(t2.release(20));
    harness.feed(events);

    harness.feed(vec![t1.release(10)]);
    // Lock 10 came free, lock 20 is still held: the rest stays parked in order
    assert_eq!(
        harness.pipeline.blocked_threads(),
        vec![ProcessThreadId::new(PID, 2)]
    );

    harness.feed(vec![t1.release(20)]);
    assert!(harness.pipeline.blocked_threads().is_empty());
    let snapshot = harness.pipeline.snapshot(PID).unwrap();
    let held: Vec<_> = snapshot
        .locks
        .iter()
        .filter_map(|lock| lock.owner().map(|owner| (lock.id().object_id, owner)))
        .collect();
    assert_eq!(held, vec![(10, ProcessThreadId::new(PID, 2))]);
}
