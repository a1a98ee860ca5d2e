//! Wait-For Graph for detecting active deadlocks
//!
//! Nodes are threads of one process; an edge `A -> B` means A cannot make
//! progress until B does something (releases a lock or terminates). Every
//! blocked thread waits for exactly one thing, so each node has at most one
//! outgoing edge and every non-trivial strongly connected component is a
//! simple ring.
//!
//! The graph does not maintain itself. The detector rebuilds all edges from
//! the concurrency read-model before each pass and then asks for the cycles.
//!
//! # Cycle detection
//!
//! Tarjan's algorithm runs over all nodes in sorted order. Each SCC with two
//! or more threads is returned as a ring that starts at its smallest thread
//! id and follows the successor edges, so a persisting cycle always comes out
//! as the same sequence.

use crate::core::error::{EngineError, EngineResult};
use crate::core::types::{ProcessThreadId, WaitInfo};
use fxhash::{FxHashMap, FxHashSet};
use std::cmp::min;

/// Directed wait-for graph of a single process
#[derive(Debug)]
pub struct WaitForGraph {
    process_id: u32,
    /// Thread -> the thread it waits for
    edges: FxHashMap<ProcessThreadId, ProcessThreadId>,
    wait_info: FxHashMap<ProcessThreadId, WaitInfo>,
}

impl WaitForGraph {
    pub fn new(process_id: u32) -> Self {
        Self {
            process_id,
            edges: FxHashMap::default(),
            wait_info: FxHashMap::default(),
        }
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Make `thread` wait for `waiting_for`, replacing any previous edge
    ///
    /// Self-edges are ignored: a thread re-entering its own lock never blocks.
    pub fn set_thread_waiting(
        &mut self,
        thread: ProcessThreadId,
        waiting_for: ProcessThreadId,
        info: WaitInfo,
    ) {
        if thread == waiting_for {
            self.clear_thread_waiting(thread);
            return;
        }
        self.edges.insert(thread, waiting_for);
        self.wait_info.insert(thread, info);
    }

    pub fn clear_thread_waiting(&mut self, thread: ProcessThreadId) {
        self.edges.remove(&thread);
        self.wait_info.remove(&thread);
    }

    /// Drop every edge
    pub fn clear(&mut self) {
        self.edges.clear();
        self.wait_info.clear();
    }

    pub fn successor(&self, thread: ProcessThreadId) -> Option<ProcessThreadId> {
        self.edges.get(&thread).copied()
    }

    /// Wait information recorded for a thread in a cycle
    ///
    /// # Errors
    /// Returns `MissingWaitInfo` if the thread has no outgoing edge.
    pub fn wait_info(&self, thread: ProcessThreadId) -> EngineResult<WaitInfo> {
        self.wait_info
            .get(&thread)
            .copied()
            .ok_or(EngineError::MissingWaitInfo(thread))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Every cycle of two or more threads currently in the graph
    pub fn detect_deadlocks(&self) -> Vec<Vec<ProcessThreadId>> {
        let mut nodes: Vec<ProcessThreadId> = self
            .edges
            .iter()
            .flat_map(|(&from, &to)| [from, to])
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        nodes.sort();

        let mut state = TarjanState::default();
        for node in nodes {
            if !state.index.contains_key(&node) {
                self.strong_connect(node, &mut state);
            }
        }

        state
            .sccs
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| self.ring_from_smallest(&scc))
            .collect()
    }

    fn strong_connect(&self, node: ProcessThreadId, state: &mut TarjanState) {
        state.index.insert(node, state.next_index);
        state.lowlink.insert(node, state.next_index);
        state.next_index += 1;
        state.stack.push(node);
        state.on_stack.insert(node);

        if let Some(&successor) = self.edges.get(&node) {
            match state.index.get(&successor).copied() {
                None => {
                    self.strong_connect(successor, state);
                    let low = min(state.lowlink[&node], state.lowlink[&successor]);
                    state.lowlink.insert(node, low);
                }
                Some(index) if state.on_stack.contains(&successor) => {
                    let low = min(state.lowlink[&node], index);
                    state.lowlink.insert(node, low);
                }
                Some(_) => {}
            }
        }

        if state.lowlink[&node] != state.index[&node] {
            return;
        }

        let mut scc = Vec::new();
        while let Some(member) = state.stack.pop() {
            state.on_stack.remove(&member);
            scc.push(member);
            if member == node {
                break;
            }
        }
        state.sccs.push(scc);
    }

    fn ring_from_smallest(&self, scc: &[ProcessThreadId]) -> Vec<ProcessThreadId> {
        let Some(&start) = scc.iter().min() else {
            return Vec::new();
        };
        let mut ring = Vec::with_capacity(scc.len());
        let mut current = start;
        loop {
            ring.push(current);
            match self.successor(current) {
                Some(next) if next != start && ring.len() < scc.len() => current = next,
                _ => break,
            }
        }
        ring
    }
}

#[derive(Default)]
struct TarjanState {
    index: FxHashMap<ProcessThreadId, usize>,
    lowlink: FxHashMap<ProcessThreadId, usize>,
    on_stack: FxHashSet<ProcessThreadId>,
    stack: Vec<ProcessThreadId>,
    next_index: usize,
    sccs: Vec<Vec<ProcessThreadId>>,
}
