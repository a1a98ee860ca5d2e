use hbtrace::ProcessThreadId;
mod common;
use common::{PID, T, expect_deadlock, start_analysis};

fn ring_events(order: [u64; 3]) -> Vec<hbtrace::RecordedEvent> {
    let mut events: Vec<_> = (1..=3).map(|tid| T(tid).create()).collect();
    // Thread n holds lock n*10 and then asks for the lock of its successor
    for tid in 1..=3 {
        events.extend(T(tid).lock(tid * 10));
    }
    for tid in order {
        events.push(T(tid).try_lock((tid % 3 + 1) * 10));
    }
    events
}

#[test]
fn test_three_thread_ring_starts_at_smallest_thread() {
    for order in [[1, 2, 3], [3, 2, 1], [2, 3, 1]] {
        let mut harness = start_analysis();
        harness.feed(ring_events(order));

        let info = expect_deadlock(&harness);
        let threads: Vec<_> = info.threads().map(|t| t.thread_id).collect();
        assert_eq!(threads, vec![1, 2, 3], "ring order for receipt order {order:?}");
        for entry in &info.cycle {
            let next = entry.thread.thread_id % 3 + 1;
            assert_eq!(entry.blocked_on, ProcessThreadId::new(PID, next));
        }
    }
}

#[test]
fn test_ring_is_reported_once() {
    let mut harness = start_analysis();
    harness.feed(ring_events([1, 2, 3]));
    expect_deadlock(&harness);

    // More threads piling onto the ring trigger new detection passes
    let (t4, t5) = (T(4), T(5));
    let mut events = vec![t4.create(), t5.create()];
    events.push(t4.try_lock(10));
    events.extend(t5.lock(50));
    events.push(t5.try_lock(20));
    harness.feed(events);

    let info = expect_deadlock(&harness);
    assert_eq!(info.cycle.len(), 3);
}

#[test]
fn test_independent_rings_are_reported_separately() {
    let mut harness = start_analysis();
    harness.feed(ring_events([1, 2, 3]));

    let (t7, t8) = (T(7), T(8));
    let mut events = vec![t7.create(), t8.create()];
    events.extend(t7.lock(70));
    events.extend(t8.lock(80));
    events.push(t7.try_lock(80));
    events.push(t8.try_lock(70));
    harness.feed(events);

    let deadlocks = harness.deadlocks.lock().unwrap();
    assert_eq!(deadlocks.len(), 2);
    assert_eq!(deadlocks[0].cycle.len(), 3);
    let second: Vec<_> = deadlocks[1].threads().map(|t| t.thread_id).collect();
    assert_eq!(second, vec![7, 8]);
    assert_eq!(harness.pipeline.summary().title, "Several (2) violations found");
}
