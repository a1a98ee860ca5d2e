//! # hbtrace
//!
//! Happens-before replay and deadlock detection for recorded traces of
//! managed multi-threaded programs.
//!
//! Events captured from an analyzed process arrive in receipt order, which
//! is not the order in which they took effect. hbtrace replays them through
//! an admission-control engine that defers every event whose causal
//! precondition does not hold yet (a free lock, a pulse, a known joinee),
//! and feeds the resulting consistent stream to a wait-for-graph deadlock
//! detector.
//!
//! ## Features
//!
//! - Reentrant lock, `Monitor.Wait`/`Pulse` and `Thread.Join` semantics
//! - Deadlock cycles over locks and joins, each reported exactly once
//! - Stack-trace snapshot requests correlated with each deadlock
//! - JSON-lines replay log and a serializable summary
//! - One analysis thread per process through actors

pub mod core;
pub mod trace;

pub use core::{
    DeadlockInfo, DeadlockThreadInfo, EngineError, EngineResult, EventPayload, EventState,
    LockId, OrderedEvent, ProcessThreadId, ProcessTrackedObjectId, RecordedEvent, WaitInfo,
    actor::{ActorSet, ProcessActor},
    commands::{CommandSender, ProfilerCommand, RecordingCommandSender},
    config::{AnalysisConfig, Analyzer},
    detector::reporting::{Report, Summary},
    host::{Pipeline, PipelineReport, PipelineStats},
    metadata::{MetadataResolver, NullMetadataResolver, RawFrame, StackTraceSnapshot},
    stage::AnalysisStage,
};
pub use trace::TraceReader;
