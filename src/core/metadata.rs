//! Symbol resolution for reports
//!
//! Stack-trace snapshots arrive as raw `(module, method token)` pairs. Turning
//! them into readable frames needs the analyzed program's metadata, which
//! lives outside this crate behind [`MetadataResolver`].

use crate::core::types::ProcessThreadId;
use serde::{Deserialize, Serialize};

/// Raw frame as captured by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawFrame {
    pub module_id: u64,
    pub method_token: u32,
}

/// Call stack of one thread at the time the snapshot command ran
///
/// Frames are ordered from the outermost call to the innermost one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTraceSnapshot {
    pub thread_id: u64,
    pub frames: Vec<RawFrame>,
}

/// A method resolved from metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub full_name: String,
    pub module_path: Option<String>,
}

pub trait MetadataResolver: Send + Sync {
    /// Name the runtime gave a thread, if the resolver knows better than the trace
    fn thread_name(&self, _thread: ProcessThreadId) -> Option<String> {
        None
    }

    fn resolve_method(
        &self,
        process_id: u32,
        module_id: u64,
        method_token: u32,
    ) -> Option<ResolvedMethod>;
}

/// Resolver that knows nothing; frames render as placeholders
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetadataResolver;

impl MetadataResolver for NullMetadataResolver {
    fn resolve_method(&self, _process_id: u32, _module_id: u64, _method_token: u32) -> Option<ResolvedMethod> {
        None
    }
}
