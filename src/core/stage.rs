use crate::core::error::EngineResult;
use crate::core::types::OrderedEvent;

/// A consumer of the causally ordered event stream
///
/// Stages see every delivered event exactly once, in replay order, and never
/// see deferred events before their preconditions hold. A stage error stops
/// the pipeline at the current event.
pub trait AnalysisStage: Send {
    fn name(&self) -> &'static str;

    fn on_event(&mut self, event: &OrderedEvent) -> EngineResult<()>;
}
