//! Privileged command execution.
//!
//! External commands are world-touching and must go through [`ExecutorOps`]
//! so the workflow layer can be exercised without elevated privileges or real
//! processes.

use crate::record::{OperationKind, OperationRecord};
use std::collections::{HashMap, VecDeque};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

/// External command runner for privileged utilities.
///
/// The caller must guarantee the invoking process can obtain the privilege
/// the utilities need; that concern is platform-specific and lives outside
/// this crate.
pub trait ExecutorOps {
    /// Run a utility to completion, capturing both output streams in full
    /// (never streamed), and classify the result.
    fn execute(&self, kind: OperationKind, program: &str, args: &[&str]) -> OperationRecord;

    /// Spawn a long-lived process without waiting for it. The record only
    /// reflects whether the spawn itself succeeded.
    fn spawn_detached(&self, kind: OperationKind, program: &str, args: &[&str])
        -> OperationRecord;
}

/// Real executor backed by the host's process machinery.
#[derive(Debug, Clone, Default)]
pub struct HostExecutor;

impl HostExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutorOps for HostExecutor {
    fn execute(&self, kind: OperationKind, program: &str, args: &[&str]) -> OperationRecord {
        log::info!("{}: {} {}", kind, program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        // No timeout: once a partition or boot-store edit has been issued it
        // must run to its own completion, however long that takes.
        match cmd.output() {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                OperationRecord::classify(kind, &stdout, &stderr, output.status.code())
            }
            Err(err) => OperationRecord::launch_failure(
                kind,
                &format!("failed to launch {}: {}", program, err),
            ),
        }
    }

    fn spawn_detached(
        &self,
        kind: OperationKind,
        program: &str,
        args: &[&str],
    ) -> OperationRecord {
        log::info!("{} (detached): {} {}", kind, program, args.join(" "));
        match Command::new(program).args(args).stdin(Stdio::null()).spawn() {
            Ok(child) => {
                OperationRecord::success(kind, &format!("{} started (pid {})", program, child.id()))
            }
            Err(err) => OperationRecord::launch_failure(
                kind,
                &format!("failed to launch {}: {}", program, err),
            ),
        }
    }
}

/// Executor that logs the exact invocation and touches nothing.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutorOps for DryRunExecutor {
    fn execute(&self, kind: OperationKind, program: &str, args: &[&str]) -> OperationRecord {
        log::info!("DRY RUN {}: {} {}", kind, program, args.join(" "));
        OperationRecord::success(kind, &format!("DRY RUN: {} {}", program, args.join(" ")))
    }

    fn spawn_detached(
        &self,
        kind: OperationKind,
        program: &str,
        args: &[&str],
    ) -> OperationRecord {
        log::info!("DRY RUN {} (detached): {} {}", kind, program, args.join(" "));
        OperationRecord::success(kind, &format!("DRY RUN: {} {}", program, args.join(" ")))
    }
}

/// One invocation observed by [`FakeExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: OperationKind,
    pub program: String,
    pub args: Vec<String>,
    pub detached: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    invocations: Vec<Invocation>,
    scripted: HashMap<OperationKind, VecDeque<OperationRecord>>,
}

/// Executor that records invocations and replays scripted outcomes.
///
/// Designed for tests and CI where real privileged operations would fail or
/// be dangerous. Unscripted invocations succeed with empty output.
#[derive(Debug, Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<FakeState>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a record to be returned for the next invocation of its kind.
    pub fn script(&self, record: OperationRecord) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .entry(record.kind)
            .or_default()
            .push_back(record);
    }

    /// All invocations observed so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// Number of invocations of a given kind.
    pub fn count(&self, kind: OperationKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .invocations
            .iter()
            .filter(|inv| inv.kind == kind)
            .count()
    }

    fn run(
        &self,
        kind: OperationKind,
        program: &str,
        args: &[&str],
        detached: bool,
    ) -> OperationRecord {
        let mut state = self.state.lock().unwrap();
        state.invocations.push(Invocation {
            kind,
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            detached,
        });
        state
            .scripted
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| OperationRecord::success(kind, ""))
    }
}

impl ExecutorOps for FakeExecutor {
    fn execute(&self, kind: OperationKind, program: &str, args: &[&str]) -> OperationRecord {
        self.run(kind, program, args, false)
    }

    fn spawn_detached(
        &self,
        kind: OperationKind,
        program: &str,
        args: &[&str],
    ) -> OperationRecord {
        self.run(kind, program, args, true)
    }
}
