//! Progress events decoupled from any particular front end.

use crate::session::Stage;
use kalki_hal::{OperationKind, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    StageStarted(Stage),
    StageCompleted(Stage),
    OperationFinished { kind: OperationKind, outcome: Outcome },
}

/// Receives workflow events. Whatever front end is attached implements this;
/// the orchestrator never knows how progress is displayed.
pub trait ProgressSink {
    fn notify(&mut self, event: WorkflowEvent);
}

/// Sink that forwards events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn notify(&mut self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::StageStarted(stage) => log::info!("stage started: {}", stage),
            WorkflowEvent::StageCompleted(stage) => log::info!("stage completed: {}", stage),
            WorkflowEvent::OperationFinished { kind, outcome } => {
                log::info!("operation finished: {} -> {:?}", kind, outcome)
            }
        }
    }
}

/// Sink that discards everything (tests, headless runs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn notify(&mut self, _event: WorkflowEvent) {}
}
