use crate::core::commands::ProfilerCommand;
use crate::core::concurrency::ConcurrencyContext;
use crate::core::detector::{DeadlockDetector, RecordedDeadlock};
use crate::core::error::EngineResult;
use crate::core::graph::WaitForGraph;
use crate::core::logger;
use crate::core::metadata::StackTraceSnapshot;
use crate::core::types::{
    CommandId, DeadlockInfo, DeadlockThreadInfo, ProcessThreadId, WaitInfo,
};
use chrono::Utc;
use fxhash::FxHashMap;
use tracing::warn;

impl DeadlockDetector {
    /// Rebuild the wait-for graph of a process and record any new cycles
    pub(crate) fn check_for_deadlocks(&mut self, process_id: u32) -> EngineResult<()> {
        let graph = self
            .graphs
            .entry(process_id)
            .or_insert_with(|| WaitForGraph::new(process_id));
        rebuild_wait_for_graph(graph, &self.context);

        let mut found = Vec::new();
        for cycle in graph.detect_deadlocks() {
            found.push(construct_deadlock_info(
                process_id,
                &cycle,
                graph,
                &self.thread_names,
            )?);
        }

        for deadlock in found {
            self.record_deadlock(deadlock);
        }
        Ok(())
    }

    fn record_deadlock(&mut self, deadlock: DeadlockInfo) {
        if self.seen.contains(&deadlock) {
            return;
        }

        warn!(
            process_id = deadlock.process_id,
            threads = deadlock.cycle.len(),
            "[PID={}] Deadlock detected (affects {} threads)",
            deadlock.process_id,
            deadlock.cycle.len()
        );

        let command_id = self.request_stack_traces(&deadlock);
        logger::log_deadlock(&deadlock, command_id);
        if let Some(callback) = &self.config.callback {
            callback(&deadlock);
        }

        self.seen.insert(deadlock.clone());
        self.deadlocks.push(RecordedDeadlock {
            info: deadlock,
            command_id,
            snapshots: Vec::new(),
        });
    }

    fn request_stack_traces(&self, deadlock: &DeadlockInfo) -> Option<CommandId> {
        if !self.config.capture_stack_traces {
            return None;
        }
        let sender = self.config.command_sender.as_ref()?;
        let thread_ids = deadlock.threads().map(|t| t.thread_id).collect();
        Some(sender.send_command(
            deadlock.process_id,
            ProfilerCommand::CreateStackTraceSnapshots { thread_ids },
        ))
    }

    /// Attach the agent's answer to a snapshot request
    ///
    /// # Returns
    /// `false` if no recorded deadlock of that process waits for `command_id`
    pub fn attach_stack_traces(
        &mut self,
        process_id: u32,
        command_id: CommandId,
        snapshots: Vec<StackTraceSnapshot>,
    ) -> bool {
        let Some(deadlock) = self
            .deadlocks
            .iter_mut()
            .find(|d| d.info.process_id == process_id && d.command_id == Some(command_id))
        else {
            warn!(process_id, ?command_id, "stack traces arrived for an unknown command");
            return false;
        };
        deadlock.snapshots = snapshots;
        true
    }
}

/// Replace every edge of `graph` with the waits currently in `context`
fn rebuild_wait_for_graph(graph: &mut WaitForGraph, context: &ConcurrencyContext) {
    graph.clear();
    for thread in context.threads_of(graph.process_id()) {
        if let Some(lock) = context.waiting_lock(thread)
            && let Some(owner) = context.lock_owner(lock)
            && owner != thread
        {
            graph.set_thread_waiting(thread, owner, WaitInfo::Lock { owner, lock });
        } else if let Some(joinee) = context.waiting_thread(thread) {
            graph.set_thread_waiting(thread, joinee, WaitInfo::Thread { joinee });
        }
    }
}

fn construct_deadlock_info(
    process_id: u32,
    cycle: &[ProcessThreadId],
    graph: &WaitForGraph,
    names: &FxHashMap<ProcessThreadId, String>,
) -> EngineResult<DeadlockInfo> {
    let mut entries = Vec::with_capacity(cycle.len());
    for (i, &thread) in cycle.iter().enumerate() {
        let next = cycle[(i + 1) % cycle.len()];
        entries.push(DeadlockThreadInfo {
            thread,
            display_name: display_name(names, thread),
            blocked_on: next,
            wait_info: graph.wait_info(thread)?,
        });
    }

    Ok(DeadlockInfo {
        process_id,
        cycle: entries,
        timestamp: Utc::now().to_rfc3339(),
    })
}

fn display_name(names: &FxHashMap<ProcessThreadId, String>, thread: ProcessThreadId) -> String {
    names
        .get(&thread)
        .cloned()
        .unwrap_or_else(|| format!("Thread-{}", thread.thread_id))
}
