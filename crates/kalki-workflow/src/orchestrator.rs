//! The installation orchestrator: sequences privileged operations, interprets
//! their outcomes, and decides what happens next.
//!
//! Operations run strictly one at a time; later stages depend on the on-disk
//! side effects of earlier ones. Nothing here retries or rolls back on its
//! own: a failed stage parks the session in `Failed(stage)` with the raw
//! utility diagnostics in the history, and reversal is a separate,
//! user-invoked step (`rollback`).

use crate::error::WorkflowError;
use crate::progress::{ProgressSink, WorkflowEvent};
use crate::rollback::{self, Compensation, RollbackReport};
use crate::session::{InstallIntent, InstallationSession, SessionState, Stage};
use kalki_hal::vm::{self, VmCandidate, VmLauncher};
use kalki_hal::{
    partition, BootEntryManager, DeployManager, ExecutorOps, OperationKind, OperationRecord,
    Outcome, PartitionManager,
};
use std::path::Path;

/// Smallest shrink the workflow will accept, in gigabytes.
pub const MIN_SHRINK_GB: u32 = 10;

pub struct Orchestrator<'a, E: ExecutorOps + ?Sized> {
    exec: &'a E,
    sink: &'a mut dyn ProgressSink,
    session: InstallationSession,
}

impl<'a, E: ExecutorOps + ?Sized> Orchestrator<'a, E> {
    pub fn new(exec: &'a E, sink: &'a mut dyn ProgressSink, intent: InstallIntent) -> Self {
        Self {
            exec,
            sink,
            session: InstallationSession::new(intent),
        }
    }

    /// Resume an existing session (diagnostics and rollback flows).
    pub fn with_session(
        exec: &'a E,
        sink: &'a mut dyn ProgressSink,
        session: InstallationSession,
    ) -> Self {
        Self {
            exec,
            sink,
            session,
        }
    }

    pub fn session(&self) -> &InstallationSession {
        &self.session
    }

    pub fn into_session(self) -> InstallationSession {
        self.session
    }

    /// Enter the download stage. The download itself belongs to the caller;
    /// the orchestrator only awaits [`Orchestrator::image_ready`].
    pub fn begin_download(&mut self) -> Result<(), WorkflowError> {
        self.session.advance(SessionState::Downloading)?;
        self.sink.notify(WorkflowEvent::StageStarted(Stage::Downloading));
        Ok(())
    }

    pub fn image_ready(&mut self, image: &Path) {
        self.session.image_path = Some(image.to_path_buf());
        self.sink
            .notify(WorkflowEvent::StageCompleted(Stage::Downloading));
    }

    /// Target drive identifier for deployment; normally parsed out of the
    /// create-partition output but the user's answer wins when they supply
    /// one.
    pub fn set_target_drive(&mut self, drive: &str) {
        let drive = drive.trim().trim_end_matches(':').to_ascii_uppercase();
        self.session.target_drive = Some(drive);
    }

    /// Shrink the system partition by `shrink_gb` and carve the new volume
    /// out of the freed space.
    ///
    /// Shrink failure means creation is never attempted. Creation failure
    /// after a successful shrink leaves the freed space unallocated with no
    /// partition; the two operations are not atomic with respect to each
    /// other, so that state is surfaced rather than silently retried.
    pub fn run_partitioning(&mut self, shrink_gb: u32) -> Result<(), WorkflowError> {
        match self.session.intent {
            InstallIntent::DualBoot => {}
            InstallIntent::Replace => return Err(WorkflowError::ReplaceNotImplemented),
            InstallIntent::TryInVm => {
                return Err(WorkflowError::InvalidTransition {
                    from: self.session.state,
                    to: SessionState::Partitioning,
                })
            }
        }
        if shrink_gb < MIN_SHRINK_GB {
            return Err(WorkflowError::ShrinkTooSmall {
                requested: shrink_gb,
                min: MIN_SHRINK_GB,
            });
        }
        if self.session.image_path.is_none() {
            return Err(WorkflowError::MissingImage);
        }
        self.session.advance(SessionState::Partitioning)?;
        self.sink
            .notify(WorkflowEvent::StageStarted(Stage::Partitioning));

        let partitions = PartitionManager::new(self.exec);

        let shrink = partitions.shrink_system_partition(shrink_gb);
        self.finish_op(&shrink);
        if shrink.outcome != Outcome::Success {
            return Err(self.stage_failure(Stage::Partitioning, shrink));
        }
        self.session
            .compensations
            .push(Compensation::ExtendSystemPartition { size_gb: shrink_gb });

        let create = partitions.create_partition(shrink_gb);
        self.finish_op(&create);
        if create.outcome != Outcome::Success {
            return Err(self.stage_failure(Stage::Partitioning, create));
        }
        if let Some(drive) = partition::parse_drive_letter(&create.raw_output) {
            self.session
                .compensations
                .push(Compensation::RemovePartition {
                    drive: drive.clone(),
                });
            self.session.target_drive = Some(drive);
        }

        self.sink
            .notify(WorkflowEvent::StageCompleted(Stage::Partitioning));
        Ok(())
    }

    /// Mount the image, copy everything onto the target partition, release
    /// the mount. The unmount runs even when the copy fails, and its own
    /// failure never masks the copy diagnostics.
    pub fn run_deployment(&mut self) -> Result<(), WorkflowError> {
        let image = self
            .session
            .image_path
            .clone()
            .ok_or(WorkflowError::MissingImage)?;
        let target = self
            .session
            .target_drive
            .clone()
            .ok_or(WorkflowError::MissingTargetDrive)?;
        self.session.advance(SessionState::Deploying)?;
        self.sink.notify(WorkflowEvent::StageStarted(Stage::Deploying));

        let deployer = DeployManager::new(self.exec);

        let mount = deployer.mount_image(&image);
        self.finish_op(&mount);
        if mount.outcome != Outcome::Success {
            return Err(self.stage_failure(Stage::Deploying, mount));
        }
        let Some(source) = partition::parse_drive_letter(&mount.raw_output) else {
            let mut record = mount;
            record.outcome = Outcome::Ambiguous;
            return Err(self.stage_failure(Stage::Deploying, record));
        };
        self.session.compensations.push(Compensation::DismountImage {
            image: image.clone(),
        });

        let copy = deployer.copy_contents(&source, &target);
        self.finish_op(&copy);
        if copy.outcome != Outcome::Success {
            // Cleanup still happens, but the copy failure stays the headline
            // diagnostic even if the unmount fails too.
            let unmount = deployer.unmount_image(&image);
            self.finish_op(&unmount);
            if unmount.outcome == Outcome::Success {
                self.drop_compensation(&Compensation::DismountImage {
                    image: image.clone(),
                });
            } else {
                log::warn!(
                    "image unmount after failed copy also failed: {}",
                    unmount.diagnostic()
                );
            }
            return Err(self.stage_failure(Stage::Deploying, copy));
        }

        let unmount = deployer.unmount_image(&image);
        self.finish_op(&unmount);
        if unmount.outcome != Outcome::Success {
            return Err(self.stage_failure(Stage::Deploying, unmount));
        }
        self.drop_compensation(&Compensation::DismountImage { image });

        self.sink
            .notify(WorkflowEvent::StageCompleted(Stage::Deploying));
        Ok(())
    }

    /// Register the new partition in the boot menu and complete the session.
    pub fn run_boot_registration(&mut self, description: &str) -> Result<(), WorkflowError> {
        let target = self
            .session
            .target_drive
            .clone()
            .ok_or(WorkflowError::MissingTargetDrive)?;
        self.session.advance(SessionState::RegisteringBoot)?;
        self.sink
            .notify(WorkflowEvent::StageStarted(Stage::RegisteringBoot));

        let added = BootEntryManager::new(self.exec).add_entry(&target, description);
        self.finish_op(&added);
        if added.outcome != Outcome::Success {
            return Err(self.stage_failure(Stage::RegisteringBoot, added));
        }
        self.session
            .compensations
            .push(Compensation::RemoveBootEntry {
                description: description.to_string(),
            });

        self.session.advance(SessionState::Complete)?;
        self.sink
            .notify(WorkflowEvent::StageCompleted(Stage::RegisteringBoot));
        Ok(())
    }

    /// User-initiated reversal of the boot-menu change. May run after a
    /// completed install and does not revert the completed session.
    pub fn undo_boot_entry(&mut self, description: &str) -> OperationRecord {
        let removed = BootEntryManager::new(self.exec).remove_entry(description);
        self.finish_op(&removed);
        if removed.outcome == Outcome::Success {
            self.drop_compensation(&Compensation::RemoveBootEntry {
                description: description.to_string(),
            });
        }
        removed
    }

    /// Try-in-VM flow: probe in preference order and boot the image in the
    /// first engine found. Spawn success is all the orchestrator can observe;
    /// guest-level outcomes are invisible to it.
    pub fn run_vm_fallback(&mut self, work_dir: &Path) -> Result<VmCandidate, WorkflowError> {
        let image = self
            .session
            .image_path
            .clone()
            .ok_or(WorkflowError::MissingImage)?;
        self.session.advance(SessionState::Launching)?;
        self.sink.notify(WorkflowEvent::StageStarted(Stage::Launching));

        let Some(candidate) = vm::probe(work_dir).into_iter().next() else {
            self.session.fail(Stage::Launching);
            return Err(WorkflowError::NoVmEngine);
        };

        let launched = VmLauncher::new(self.exec).launch(&candidate, &image);
        self.finish_op(&launched);
        if launched.outcome != Outcome::Success {
            return Err(self.stage_failure(Stage::Launching, launched));
        }

        self.session.advance(SessionState::Complete)?;
        self.sink
            .notify(WorkflowEvent::StageCompleted(Stage::Launching));
        Ok(candidate)
    }

    /// Reboot into the boot menu. Only called once the user has explicitly
    /// confirmed at workflow completion.
    pub fn request_reboot(&mut self) -> OperationRecord {
        let record = self
            .exec
            .execute(OperationKind::Reboot, "shutdown", &["/r", "/t", "0"]);
        self.finish_op(&record);
        record
    }

    /// Walk the compensation log in reverse, best-effort.
    pub fn rollback(&mut self) -> RollbackReport {
        rollback::rollback(self.exec, &mut self.session)
    }

    fn finish_op(&mut self, record: &OperationRecord) {
        self.session.record(record);
        self.sink.notify(WorkflowEvent::OperationFinished {
            kind: record.kind,
            outcome: record.outcome,
        });
    }

    fn stage_failure(&mut self, stage: Stage, record: OperationRecord) -> WorkflowError {
        self.session.fail(stage);
        WorkflowError::StageFailed { stage, record }
    }

    fn drop_compensation(&mut self, comp: &Compensation) {
        if let Some(idx) = self.session.compensations.iter().rposition(|c| c == comp) {
            self.session.compensations.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use kalki_hal::FakeExecutor;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const CREATE_OUTPUT: &str = "\
DriveLetter FriendlyName FileSystemType DriveType HealthStatus
----------- ------------ -------------- --------- ------------
E           KalkiOS      NTFS           Fixed     Healthy";

    const COPY_GUID: &str =
        "The entry was successfully copied to {7619dcc8-fafe-11d9-b411-000476eba25f}.";

    fn image() -> PathBuf {
        PathBuf::from("C:\\Users\\kalki\\KalkiOS.iso")
    }

    fn ready_orchestrator<'a>(
        exec: &'a FakeExecutor,
        sink: &'a mut NullSink,
        intent: InstallIntent,
    ) -> Orchestrator<'a, FakeExecutor> {
        let mut orch = Orchestrator::new(exec, sink, intent);
        orch.begin_download().unwrap();
        orch.image_ready(&image());
        orch
    }

    fn script_happy_partitioning(exec: &FakeExecutor) {
        exec.script(OperationRecord::classify(
            OperationKind::CreatePartition,
            CREATE_OUTPUT,
            "",
            Some(0),
        ));
    }

    fn script_happy_mount(exec: &FakeExecutor) {
        exec.script(OperationRecord::classify(
            OperationKind::MountImage,
            "F",
            "",
            Some(0),
        ));
    }

    fn script_happy_boot_copy(exec: &FakeExecutor) {
        exec.script(OperationRecord::classify(
            OperationKind::AddBootEntry,
            COPY_GUID,
            "",
            Some(0),
        ));
    }

    #[test]
    fn shrink_below_minimum_is_rejected_without_any_operation() {
        let exec = FakeExecutor::new();
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        let err = orch.run_partitioning(9).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::ShrinkTooSmall {
                requested: 9,
                min: MIN_SHRINK_GB
            }
        ));
        assert!(exec.invocations().is_empty());
        assert_eq!(orch.session().state, SessionState::Downloading);
    }

    #[test]
    fn minimum_shrink_size_is_accepted() {
        let exec = FakeExecutor::new();
        script_happy_partitioning(&exec);
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        orch.run_partitioning(MIN_SHRINK_GB).unwrap();
        assert_eq!(orch.session().target_drive.as_deref(), Some("E"));
    }

    #[test]
    fn failed_shrink_never_reaches_create() {
        let exec = FakeExecutor::new();
        exec.script(OperationRecord::classify(
            OperationKind::ShrinkPartition,
            "",
            "Resize-Partition : Not enough free space.",
            Some(1),
        ));
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        let err = orch.run_partitioning(40).unwrap_err();
        match err {
            WorkflowError::StageFailed { stage, record } => {
                assert_eq!(stage, Stage::Partitioning);
                assert!(record.diagnostic().contains("Not enough free space"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(exec.count(OperationKind::CreatePartition), 0);
        assert_eq!(
            orch.session().state,
            SessionState::Failed(Stage::Partitioning)
        );
    }

    #[test]
    fn create_failure_after_shrink_is_surfaced_with_the_shrink_compensation() {
        let exec = FakeExecutor::new();
        exec.script(OperationRecord::classify(
            OperationKind::CreatePartition,
            "",
            "New-Partition : Not enough unallocated space.",
            Some(1),
        ));
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        let err = orch.run_partitioning(40).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::StageFailed {
                stage: Stage::Partitioning,
                ..
            }
        ));
        // The shrink went through; its undo descriptor makes the orphaned
        // unallocated space visible.
        assert_eq!(
            orch.session().compensations,
            vec![Compensation::ExtendSystemPartition { size_gb: 40 }]
        );
        assert_eq!(exec.count(OperationKind::CopyContents), 0);
    }

    #[test]
    fn create_success_without_a_drive_letter_halts_as_ambiguous() {
        let exec = FakeExecutor::new();
        exec.script(OperationRecord::classify(
            OperationKind::CreatePartition,
            "The operation completed.",
            "",
            Some(0),
        ));
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        let err = orch.run_partitioning(40).unwrap_err();
        match err {
            WorkflowError::StageFailed { record, .. } => {
                assert_eq!(record.outcome, Outcome::Ambiguous);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            orch.session().state,
            SessionState::Failed(Stage::Partitioning)
        );
    }

    #[test]
    fn dual_boot_happy_path_completes() {
        let exec = FakeExecutor::new();
        script_happy_partitioning(&exec);
        script_happy_mount(&exec);
        script_happy_boot_copy(&exec);
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        orch.run_partitioning(40).unwrap();
        orch.run_deployment().unwrap();
        orch.run_boot_registration("Kalki OS").unwrap();

        let session = orch.session();
        assert_eq!(session.state, SessionState::Complete);
        assert_eq!(session.target_drive.as_deref(), Some("E"));
        // Shrink + create + mount + copy + unmount + add entry.
        assert_eq!(session.history.len(), 6);
        // The mount compensation was discharged by the successful unmount.
        assert_eq!(
            session.compensations,
            vec![
                Compensation::ExtendSystemPartition { size_gb: 40 },
                Compensation::RemovePartition {
                    drive: "E".to_string()
                },
                Compensation::RemoveBootEntry {
                    description: "Kalki OS".to_string()
                },
            ]
        );

        // The copy ran from the mounted image onto the new partition.
        let copy = exec
            .invocations()
            .into_iter()
            .find(|inv| inv.kind == OperationKind::CopyContents)
            .unwrap();
        assert_eq!(copy.args[0], "F:\\");
        assert_eq!(copy.args[1], "E:\\");
    }

    #[test]
    fn copy_failure_still_unmounts_and_never_registers_boot() {
        let exec = FakeExecutor::new();
        script_happy_partitioning(&exec);
        script_happy_mount(&exec);
        exec.script(OperationRecord::classify(
            OperationKind::CopyContents,
            "",
            "ERROR 5 (0x00000005) Access is denied",
            Some(9),
        ));
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        orch.run_partitioning(40).unwrap();
        let err = orch.run_deployment().unwrap_err();
        match err {
            WorkflowError::StageFailed { stage, record } => {
                assert_eq!(stage, Stage::Deploying);
                assert_eq!(record.kind, OperationKind::CopyContents);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Cleanup-on-failure: the unmount still ran, exactly once.
        assert_eq!(exec.count(OperationKind::UnmountImage), 1);
        assert_eq!(orch.session().state, SessionState::Failed(Stage::Deploying));
        assert_eq!(exec.count(OperationKind::AddBootEntry), 0);
    }

    #[test]
    fn unmount_failure_does_not_mask_the_copy_failure() {
        let exec = FakeExecutor::new();
        script_happy_partitioning(&exec);
        script_happy_mount(&exec);
        exec.script(OperationRecord::classify(
            OperationKind::CopyContents,
            "",
            "copy blew up",
            Some(9),
        ));
        exec.script(OperationRecord::classify(
            OperationKind::UnmountImage,
            "",
            "Dismount-DiskImage : The image is in use.",
            Some(1),
        ));
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        orch.run_partitioning(40).unwrap();
        let err = orch.run_deployment().unwrap_err();
        match err {
            WorkflowError::StageFailed { record, .. } => {
                assert_eq!(record.kind, OperationKind::CopyContents);
                assert!(record.diagnostic().contains("copy blew up"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The failed unmount is still on record, and its compensation
        // remains pending.
        assert_eq!(exec.count(OperationKind::UnmountImage), 1);
        assert!(orch
            .session()
            .compensations
            .contains(&Compensation::DismountImage { image: image() }));
    }

    #[test]
    fn try_vm_without_engine_reports_not_found_and_never_launches() {
        let exec = FakeExecutor::new();
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::TryInVm);

        let dir = tempdir().unwrap();
        let err = orch.run_vm_fallback(dir.path()).unwrap_err();
        assert!(matches!(err, WorkflowError::NoVmEngine));
        assert_eq!(exec.count(OperationKind::LaunchVm), 0);
        assert_eq!(orch.session().state, SessionState::Failed(Stage::Launching));
    }

    #[test]
    fn try_vm_launches_a_bundled_engine_and_completes() {
        let exec = FakeExecutor::new();
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::TryInVm);

        let dir = tempdir().unwrap();
        std::fs::File::create(dir.path().join("qemu-system-x86_64.exe")).unwrap();

        let candidate = orch.run_vm_fallback(dir.path()).unwrap();
        assert_eq!(candidate.engine, kalki_hal::VmEngine::Qemu);
        assert_eq!(orch.session().state, SessionState::Complete);
        assert_eq!(exec.count(OperationKind::LaunchVm), 1);
    }

    #[test]
    fn replace_intent_fails_fast_without_touching_the_host() {
        let exec = FakeExecutor::new();
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::Replace);

        let err = orch.run_partitioning(40).unwrap_err();
        assert!(matches!(err, WorkflowError::ReplaceNotImplemented));
        assert!(exec.invocations().is_empty());
    }

    #[test]
    fn undo_after_completion_keeps_the_session_complete() {
        let exec = FakeExecutor::new();
        script_happy_partitioning(&exec);
        script_happy_mount(&exec);
        script_happy_boot_copy(&exec);
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        orch.run_partitioning(40).unwrap();
        orch.run_deployment().unwrap();
        orch.run_boot_registration("Kalki OS").unwrap();

        let removed = orch.undo_boot_entry("Kalki OS");
        assert_eq!(removed.outcome, Outcome::Success);
        assert_eq!(orch.session().state, SessionState::Complete);
        assert!(!orch
            .session()
            .compensations
            .iter()
            .any(|c| matches!(c, Compensation::RemoveBootEntry { .. })));
    }

    #[test]
    fn user_supplied_target_drive_overrides_the_parsed_one() {
        let exec = FakeExecutor::new();
        script_happy_partitioning(&exec);
        script_happy_mount(&exec);
        let mut sink = NullSink;
        let mut orch = ready_orchestrator(&exec, &mut sink, InstallIntent::DualBoot);

        orch.run_partitioning(40).unwrap();
        orch.set_target_drive("d:");
        orch.run_deployment().unwrap();

        let copy = exec
            .invocations()
            .into_iter()
            .find(|inv| inv.kind == OperationKind::CopyContents)
            .unwrap();
        assert_eq!(copy.args[1], "D:\\");
    }
}
