//! Installation session aggregate and its state machine.
//!
//! One session covers one install attempt. The orchestrator owns it
//! exclusively for that lifetime; managers never see it.

use crate::error::WorkflowError;
use crate::rollback::Compensation;
use anyhow::{Context, Result};
use kalki_hal::OperationRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallIntent {
    DualBoot,
    Replace,
    TryInVm,
}

/// Workflow stages a session can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Downloading,
    Partitioning,
    Deploying,
    RegisteringBoot,
    Launching,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Downloading => "Downloading",
            Stage::Partitioning => "Partitioning",
            Stage::Deploying => "Deploying",
            Stage::RegisteringBoot => "RegisteringBoot",
            Stage::Launching => "Launching",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Downloading,
    Partitioning,
    Deploying,
    RegisteringBoot,
    Launching,
    Complete,
    Failed(Stage),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Failed(_))
    }

    /// Forward transitions of the state machine. `Failed` is reached through
    /// [`InstallationSession::fail`], never through `advance`.
    fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Downloading)
                | (Downloading, Partitioning)
                | (Downloading, Launching)
                | (Partitioning, Deploying)
                | (Deploying, RegisteringBoot)
                | (RegisteringBoot, Complete)
                | (Launching, Complete)
        )
    }
}

/// Top-level aggregate for one install attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationSession {
    pub intent: InstallIntent,
    pub image_path: Option<PathBuf>,
    pub target_drive: Option<String>,
    pub state: SessionState,
    /// Append-only; every mutating host operation lands here before the
    /// orchestrator inspects it. Kept for diagnostics and manual-undo
    /// guidance.
    pub history: Vec<OperationRecord>,
    /// Undo descriptors for completed mutations, oldest first. Walked in
    /// reverse by `rollback`.
    pub compensations: Vec<Compensation>,
}

impl InstallationSession {
    pub fn new(intent: InstallIntent) -> Self {
        Self {
            intent,
            image_path: None,
            target_drive: None,
            state: SessionState::Idle,
            history: Vec::new(),
            compensations: Vec::new(),
        }
    }

    pub fn record(&mut self, record: &OperationRecord) {
        self.history.push(record.clone());
    }

    pub fn advance(&mut self, next: SessionState) -> Result<(), WorkflowError> {
        if !self.state.can_advance_to(next) {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Absorbing failure state, reachable from any non-terminal state.
    pub fn fail(&mut self, stage: Stage) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed(stage);
        }
    }
}

pub fn load_session(path: &Path) -> Result<Option<InstallationSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file: {}", path.display()))?;
    let session = serde_json::from_str(&content).context("Failed to parse session file")?;
    Ok(Some(session))
}

/// Write the session as JSON via a temp file + rename so a crash mid-write
/// never leaves a torn session file behind.
pub fn save_session_atomic(path: &Path, session: &InstallationSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create session directory: {}", parent.display()))?;
    }

    let tmp_path = temp_path(path);
    let payload = serde_json::to_string_pretty(session).context("Failed to serialize session")?;

    let mut file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp session file: {}", tmp_path.display()))?;
    file.write_all(payload.as_bytes())
        .context("Failed to write session")?;
    file.sync_all().context("Failed to flush session")?;

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed to atomically replace session file: {}",
            path.display()
        )
    })?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("session.json");
    path.with_file_name(format!("{}.tmp", file_name))
}
