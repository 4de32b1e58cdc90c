use crate::session::{SessionState, Stage};
use kalki_hal::OperationRecord;
use thiserror::Error;

/// Typed boundary of the orchestrator.
///
/// Utility failures are not errors at the manager level; they become
/// [`WorkflowError::StageFailed`] only once the orchestrator decides they are
/// terminal for the session. The record travels with the error so the raw
/// diagnostic text reaches the user unsummarized.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Shrink size {requested} GB is below the {min} GB minimum")]
    ShrinkTooSmall { requested: u32, min: u32 },

    #[error("No supported VM engine (QEMU/VirtualBox) found. Please install QEMU or VirtualBox.")]
    NoVmEngine,

    #[error("{stage} failed ({kind}): {diag}", kind = .record.kind, diag = .record.diagnostic())]
    StageFailed { stage: Stage, record: OperationRecord },

    #[error("invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("no installer image available; download it first")]
    MissingImage,

    #[error("no target drive identifier for the new partition")]
    MissingTargetDrive,

    #[error("Replacing the existing system is not implemented yet")]
    ReplaceNotImplemented,
}
