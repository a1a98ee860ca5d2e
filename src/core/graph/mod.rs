//! Graph module for deadlock detection
//!
//! Holds the per-process wait-for graph: which threads are blocked on which
//! other threads, either through a held lock or through a pending join.

pub(crate) mod wait_for_graph;

pub use wait_for_graph::WaitForGraph;
