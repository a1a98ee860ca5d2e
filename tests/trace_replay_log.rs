use hbtrace::core::{CommandId, logger};
use hbtrace::trace::write_trace;
use hbtrace::{Analyzer, ProfilerCommand, RawFrame, RecordingCommandSender, StackTraceSnapshot, TraceReader};
use serde_json::Value;
use std::fs::File;
use std::sync::Arc;
use tempfile::TempDir;
mod common;
use common::{PID, T};

#[test]
fn test_trace_file_replay_with_log_and_snapshots() {
    let dir = TempDir::new().unwrap();
    let trace_path = dir.path().join("deadlock.trace");
    let log_path = dir.path().join("logs").join("replay.log");

    let (t1, t2) = (T(1), T(2));
    let mut events = vec![t1.create(), t2.create(), t2.rename("consumer")];
    events.extend(t1.lock(10));
    events.extend(t2.lock(20));
    events.push(t1.try_lock(20));
    events.push(t2.try_lock(10));
    write_trace(File::create(&trace_path).unwrap(), &events).unwrap();

    let sender = Arc::new(RecordingCommandSender::new());
    let mut pipeline = Analyzer::new()
        .with_log(&log_path)
        .command_sender(sender.clone())
        .start()
        .expect("Failed to start analysis");

    for event in TraceReader::open(&trace_path).unwrap() {
        pipeline.process(event.unwrap()).unwrap();
    }
    logger::flush_logs().unwrap();

    // One snapshot request per deadlock, naming the threads of the cycle
    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].command,
        ProfilerCommand::CreateStackTraceSnapshots {
            thread_ids: vec![1, 2]
        }
    );
    assert_eq!(pipeline.deadlocks()[0].command_id, Some(sent[0].id));

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let records: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let logged_events = records.iter().filter(|r| r["record"] == "event").count();
    let logged_deadlocks: Vec<_> = records.iter().filter(|r| r["record"] == "deadlock").collect();
    assert_eq!(logged_events, events.len());
    assert_eq!(logged_deadlocks.len(), 1);
    assert_eq!(logged_deadlocks[0]["command_id"], sent[0].id.0);
    assert!(records.iter().filter(|r| r["record"] == "event").all(|r| r["state"] == "executed"));

    let snapshots = vec![StackTraceSnapshot {
        thread_id: 2,
        frames: vec![
            RawFrame {
                module_id: 1,
                method_token: 0x0600_0001,
            },
            RawFrame {
                module_id: 1,
                method_token: 0x0600_0002,
            },
        ],
    }];
    assert!(pipeline.on_stack_trace_snapshots(PID, sent[0].id, snapshots.clone()));
    assert!(!pipeline.on_stack_trace_snapshots(PID, CommandId(999), snapshots));

    let report = pipeline.report();
    assert_eq!(report.stats.received, events.len() as u64);
    let traces = &report.summary.reports[0].stack_traces;
    let consumer = traces
        .iter()
        .find(|trace| trace.thread.name == "consumer")
        .unwrap();
    // Innermost frame first
    assert_eq!(consumer.frames.len(), 2);
    assert_eq!(consumer.frames[0].method_token, 0x0600_0002);
    assert_eq!(consumer.frames[0].method_name, "<unable-to-resolve-method>");
}
