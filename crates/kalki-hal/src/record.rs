//! Classified results of privileged utility invocations.
//!
//! Every mutating operation against the host produces exactly one
//! [`OperationRecord`] before control returns to the workflow layer, whether
//! it succeeded or not.

use serde::{Deserialize, Serialize};

/// What a privileged operation did (or tried to do) to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    ShrinkPartition,
    CreatePartition,
    MountImage,
    CopyContents,
    UnmountImage,
    AddBootEntry,
    RemoveBootEntry,
    RemovePartition,
    ExtendPartition,
    LaunchVm,
    Reboot,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::ShrinkPartition => "shrink partition",
            OperationKind::CreatePartition => "create partition",
            OperationKind::MountImage => "mount image",
            OperationKind::CopyContents => "copy contents",
            OperationKind::UnmountImage => "unmount image",
            OperationKind::AddBootEntry => "add boot entry",
            OperationKind::RemoveBootEntry => "remove boot entry",
            OperationKind::RemovePartition => "remove partition",
            OperationKind::ExtendPartition => "extend partition",
            OperationKind::LaunchVm => "launch VM",
            OperationKind::Reboot => "reboot",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classified outcome of one privileged operation.
///
/// `Ambiguous` covers runs that produced no failure signal but whose success
/// cannot be positively confirmed (e.g. an expected drive identifier missing
/// from the output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
    Ambiguous,
}

/// Immutable record of one privileged operation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub raw_output: String,
    pub raw_error: String,
    pub exit_code: Option<i32>,
    pub outcome: Outcome,
}

impl OperationRecord {
    /// Classify a completed invocation.
    ///
    /// The exit status is the preferred signal: nonzero means failure, zero
    /// means success even when the utility wrote warnings to its error
    /// stream. When no status is available the legacy shim applies:
    /// non-whitespace error text is the only failure signal the utilities
    /// give us.
    pub fn classify(
        kind: OperationKind,
        stdout: &str,
        stderr: &str,
        exit_code: Option<i32>,
    ) -> Self {
        let outcome = match exit_code {
            Some(0) => Outcome::Success,
            Some(_) => Outcome::Failure,
            None if !stderr.trim().is_empty() => Outcome::Failure,
            None => Outcome::Success,
        };
        Self {
            kind,
            raw_output: stdout.trim().to_string(),
            raw_error: stderr.trim().to_string(),
            exit_code,
            outcome,
        }
    }

    /// Record for an invocation that could not be started at all
    /// (executable missing, launch denied).
    pub fn launch_failure(kind: OperationKind, message: &str) -> Self {
        Self {
            kind,
            raw_output: String::new(),
            raw_error: message.to_string(),
            exit_code: None,
            outcome: Outcome::Failure,
        }
    }

    /// Record for an operation that succeeded without running a utility to
    /// completion (detached spawn, dry run).
    pub fn success(kind: OperationKind, output: &str) -> Self {
        Self {
            kind,
            raw_output: output.to_string(),
            raw_error: String::new(),
            exit_code: None,
            outcome: Outcome::Success,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// The text worth showing a human: the error stream when present,
    /// otherwise the output stream, never summarized.
    pub fn diagnostic(&self) -> &str {
        if self.raw_error.is_empty() {
            &self.raw_output
        } else {
            &self.raw_error
        }
    }
}
