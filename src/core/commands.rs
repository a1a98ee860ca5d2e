//! Commands sent back to the agent inside the analyzed process

use crate::core::types::CommandId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Request understood by the in-process profiler agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ProfilerCommand {
    /// Capture the managed call stacks of the listed threads
    CreateStackTraceSnapshots { thread_ids: Vec<u64> },
}

/// Outbound command channel to an analyzed process
///
/// The returned id correlates the asynchronous response with the request.
pub trait CommandSender: Send + Sync {
    fn send_command(&self, process_id: u32, command: ProfilerCommand) -> CommandId;
}

/// Sender that keeps every command instead of transmitting it
///
/// Used for offline trace replay, where no agent is listening, and in tests.
#[derive(Debug, Default)]
pub struct RecordingCommandSender {
    next_id: AtomicU64,
    sent: Mutex<Vec<SentCommand>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentCommand {
    pub process_id: u32,
    pub id: CommandId,
    pub command: ProfilerCommand,
}

impl RecordingCommandSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands sent so far, in order
    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().clone()
    }
}

impl CommandSender for RecordingCommandSender {
    fn send_command(&self, process_id: u32, command: ProfilerCommand) -> CommandId {
        let id = CommandId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.sent.lock().push(SentCommand {
            process_id,
            id,
            command,
        });
        id
    }
}
