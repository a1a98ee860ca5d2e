//! Human-facing summary of a run
//!
//! Rendering (HTML, console) is left to consumers; this module only builds
//! the serializable model.

use crate::core::detector::{DeadlockDetector, RecordedDeadlock};
use crate::core::metadata::{MetadataResolver, StackTraceSnapshot};
use crate::core::types::{ProcessThreadId, WaitInfo};
use fxhash::FxHashMap;
use serde::Serialize;

pub const DEADLOCK_CATEGORY: &str = "Deadlock";

const UNRESOLVED_METHOD: &str = "<unable-to-resolve-method>";
const UNRESOLVED_MODULE: &str = "<unable-to-resolve-module>";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ThreadInfo {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub method_name: String,
    pub source_mapping: String,
    pub method_token: u32,
}

/// Resolved call stack, innermost frame first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackTrace {
    pub thread: ThreadInfo,
    pub frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportReason {
    pub thread: ThreadInfo,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub identifier: usize,
    pub category: String,
    pub title: String,
    pub description: String,
    pub process_id: u32,
    pub detection_time: String,
    pub threads: Vec<ThreadInfo>,
    pub reasons: Vec<ReportReason>,
    pub stack_traces: Vec<StackTrace>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub title: String,
    pub description: String,
    pub reports: Vec<Report>,
}

impl DeadlockDetector {
    /// Summarize every deadlock found so far
    pub fn create_summary(&self, resolver: &dyn MetadataResolver) -> Summary {
        let deadlocks = self.deadlocks();
        let (title, description) = match deadlocks.len() {
            0 => (
                "No violations found".to_string(),
                "All analyzed lock acquires were correctly ordered.".to_string(),
            ),
            1 => (
                "One violation found".to_string(),
                "See details below for more information.".to_string(),
            ),
            n => (
                format!("Several ({n}) violations found"),
                "See details below for more information.".to_string(),
            ),
        };

        Summary {
            title,
            description,
            reports: deadlocks
                .iter()
                .enumerate()
                .map(|(index, deadlock)| build_report(index, deadlock, resolver))
                .collect(),
        }
    }
}

fn build_report(index: usize, deadlock: &RecordedDeadlock, resolver: &dyn MetadataResolver) -> Report {
    let info = &deadlock.info;
    let names: FxHashMap<ProcessThreadId, String> = info
        .cycle
        .iter()
        .map(|entry| {
            let name = resolver
                .thread_name(entry.thread)
                .unwrap_or_else(|| entry.display_name.clone());
            (entry.thread, name)
        })
        .collect();
    let thread_info = |thread: ProcessThreadId| ThreadInfo {
        id: thread.thread_id,
        name: names
            .get(&thread)
            .cloned()
            .unwrap_or_else(|| format!("Thread-{}", thread.thread_id)),
    };

    let threads: Vec<ThreadInfo> = info.threads().map(&thread_info).collect();
    let reasons = info
        .cycle
        .iter()
        .map(|entry| ReportReason {
            thread: thread_info(entry.thread),
            reason: match entry.wait_info {
                WaitInfo::Lock { owner, lock } => format!(
                    "Blocked - waiting for object {} owned by thread {}",
                    lock.object_id,
                    thread_info(owner).name
                ),
                WaitInfo::Thread { joinee } => format!(
                    "Blocked - waiting for thread {} to finish",
                    thread_info(joinee).name
                ),
            },
        })
        .collect();
    let stack_traces = threads
        .iter()
        .map(|thread| {
            let snapshot = deadlock.snapshots.iter().find(|s| s.thread_id == thread.id);
            resolve_stack_trace(info.process_id, thread.clone(), snapshot, resolver)
        })
        .collect();

    Report {
        identifier: index,
        category: DEADLOCK_CATEGORY.to_string(),
        title: format!("Deadlock {index}"),
        description: format!(
            "Multiple threads ({}) are blocked in a cycle. See details below for more information.",
            threads.len()
        ),
        process_id: info.process_id,
        detection_time: info.timestamp.clone(),
        threads,
        reasons,
        stack_traces,
    }
}

fn resolve_stack_trace(
    process_id: u32,
    thread: ThreadInfo,
    snapshot: Option<&StackTraceSnapshot>,
    resolver: &dyn MetadataResolver,
) -> StackTrace {
    let frames = snapshot
        .map(|s| {
            s.frames
                .iter()
                .rev()
                .map(|frame| {
                    let method = resolver.resolve_method(process_id, frame.module_id, frame.method_token);
                    StackFrame {
                        method_name: method
                            .as_ref()
                            .map_or_else(|| UNRESOLVED_METHOD.to_string(), |m| m.full_name.clone()),
                        source_mapping: method
                            .and_then(|m| m.module_path)
                            .unwrap_or_else(|| UNRESOLVED_MODULE.to_string()),
                        method_token: frame.method_token,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    StackTrace { thread, frames }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commands::RecordingCommandSender;
    use crate::core::detector::DetectorConfig;
    use crate::core::metadata::{NullMetadataResolver, RawFrame, ResolvedMethod};
    use crate::core::stage::AnalysisStage;
    use crate::core::types::{OrderedEvent, ProcessTrackedObjectId};
    use std::sync::Arc;

    struct TableResolver;

    impl MetadataResolver for TableResolver {
        fn resolve_method(&self, _pid: u32, module_id: u64, method_token: u32) -> Option<ResolvedMethod> {
            (module_id == 1).then(|| ResolvedMethod {
                full_name: format!("App.Method{method_token}"),
                module_path: Some("App.dll".into()),
            })
        }
    }

    fn deadlocked_detector() -> DeadlockDetector {
        let t1 = ProcessThreadId::new(1, 1);
        let t2 = ProcessThreadId::new(1, 2);
        let a = ProcessTrackedObjectId::new(1, 100);
        let mut detector = DeadlockDetector::new(DetectorConfig {
            command_sender: Some(Arc::new(RecordingCommandSender::new())),
            capture_stack_traces: true,
            ..DetectorConfig::default()
        });
        let events = [
            OrderedEvent::ThreadCreated { thread: t1 },
            OrderedEvent::ThreadCreated { thread: t2 },
            OrderedEvent::ThreadRenamed {
                thread: t2,
                name: "Consumer".into(),
            },
            OrderedEvent::LockAcquireReturned {
                thread: t1,
                lock: a,
                success: true,
            },
            OrderedEvent::ThreadJoinAttempted { thread: t1, joinee: t2 },
            OrderedEvent::LockAcquireAttempted { thread: t2, lock: a },
        ];
        for event in &events {
            detector.on_event(event).unwrap();
        }
        detector
    }

    #[test]
    fn test_empty_summary() {
        let summary = DeadlockDetector::default().create_summary(&NullMetadataResolver);
        assert_eq!(summary.title, "No violations found");
        assert!(summary.reports.is_empty());
    }

    #[test]
    fn test_report_reasons_and_names() {
        let detector = deadlocked_detector();
        let summary = detector.create_summary(&NullMetadataResolver);
        assert_eq!(summary.title, "One violation found");

        let report = &summary.reports[0];
        assert_eq!(report.title, "Deadlock 0");
        assert_eq!(report.category, DEADLOCK_CATEGORY);
        assert_eq!(report.threads.len(), 2);
        assert_eq!(
            report.reasons[0].reason,
            "Blocked - waiting for thread Consumer to finish"
        );
        assert_eq!(
            report.reasons[1].reason,
            "Blocked - waiting for object 100 owned by thread Thread-1"
        );
        // No snapshots received yet
        assert!(report.stack_traces.iter().all(|t| t.frames.is_empty()));
    }

    #[test]
    fn test_stack_frames_are_resolved_innermost_first() {
        let mut detector = deadlocked_detector();
        let command_id = detector.deadlocks()[0].command_id.unwrap();
        let snapshot = StackTraceSnapshot {
            thread_id: 2,
            frames: vec![
                RawFrame { module_id: 1, method_token: 10 },
                RawFrame { module_id: 9, method_token: 11 },
            ],
        };
        assert!(detector.attach_stack_traces(1, command_id, vec![snapshot]));

        let summary = detector.create_summary(&TableResolver);
        let trace = &summary.reports[0].stack_traces[1];
        assert_eq!(trace.thread.name, "Consumer");
        assert_eq!(trace.frames[0].method_name, UNRESOLVED_METHOD);
        assert_eq!(trace.frames[0].source_mapping, UNRESOLVED_MODULE);
        assert_eq!(trace.frames[1].method_name, "App.Method10");
        assert_eq!(trace.frames[1].source_mapping, "App.dll");
    }
}
