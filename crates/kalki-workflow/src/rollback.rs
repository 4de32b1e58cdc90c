//! Best-effort reversal of completed mutating operations.
//!
//! There is no transaction log at the utility level, so reversal replays
//! explicit undo descriptors collected while the install went forward. A
//! bulk copy has no descriptor: deployed file contents cannot be un-copied.

use crate::session::InstallationSession;
use kalki_hal::{
    BootEntryManager, DeployManager, ExecutorOps, OperationRecord, Outcome, PartitionManager,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Undo descriptor appended after each mutating success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compensation {
    ExtendSystemPartition { size_gb: u32 },
    RemovePartition { drive: String },
    DismountImage { image: PathBuf },
    RemoveBootEntry { description: String },
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::ExtendSystemPartition { size_gb } => {
                write!(f, "grow the system partition back by {} GB", size_gb)
            }
            Compensation::RemovePartition { drive } => {
                write!(f, "delete partition {}:", drive)
            }
            Compensation::DismountImage { image } => {
                write!(f, "dismount image {}", image.display())
            }
            Compensation::RemoveBootEntry { description } => {
                write!(f, "remove boot entry '{}'", description)
            }
        }
    }
}

/// What one rollback pass attempted and how each compensation fared.
#[derive(Debug)]
pub struct RollbackReport {
    pub attempted: Vec<(Compensation, OperationRecord)>,
}

impl RollbackReport {
    pub fn succeeded(&self) -> usize {
        self.attempted
            .iter()
            .filter(|(_, record)| record.outcome == Outcome::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.attempted.len() - self.succeeded()
    }
}

/// Walk the session's compensation log in reverse, attempting each one.
/// Failures do not stop the walk; failed compensations stay in the log so a
/// later pass can retry them.
pub fn rollback<E: ExecutorOps + ?Sized>(
    exec: &E,
    session: &mut InstallationSession,
) -> RollbackReport {
    let partitions = PartitionManager::new(exec);
    let deployer = DeployManager::new(exec);
    let boot = BootEntryManager::new(exec);

    let pending: Vec<Compensation> = session.compensations.drain(..).collect();
    let mut remaining = Vec::new();
    let mut attempted = Vec::new();

    for comp in pending.into_iter().rev() {
        log::info!("rollback: {}", comp);
        let record = match &comp {
            Compensation::ExtendSystemPartition { size_gb } => {
                partitions.extend_system_partition(*size_gb)
            }
            Compensation::RemovePartition { drive } => partitions.remove_partition(drive),
            Compensation::DismountImage { image } => deployer.unmount_image(image),
            Compensation::RemoveBootEntry { description } => boot.remove_entry(description),
        };
        session.record(&record);
        if record.outcome != Outcome::Success {
            log::warn!("rollback step failed: {} ({})", comp, record.diagnostic());
            remaining.push(comp.clone());
        }
        attempted.push((comp, record));
    }

    remaining.reverse();
    session.compensations = remaining;
    RollbackReport { attempted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InstallIntent;
    use kalki_hal::{FakeExecutor, OperationKind};

    fn session_with_compensations() -> InstallationSession {
        let mut session = InstallationSession::new(InstallIntent::DualBoot);
        session.compensations = vec![
            Compensation::ExtendSystemPartition { size_gb: 40 },
            Compensation::RemovePartition {
                drive: "E".to_string(),
            },
            Compensation::RemoveBootEntry {
                description: "Kalki OS".to_string(),
            },
        ];
        session
    }

    #[test]
    fn rollback_walks_newest_first() {
        let exec = FakeExecutor::new();
        let mut session = session_with_compensations();

        let report = rollback(&exec, &mut session);
        assert_eq!(report.attempted.len(), 3);

        let kinds: Vec<OperationKind> = exec.invocations().iter().map(|inv| inv.kind).collect();
        // Boot entry first (newest), then the partition, then the resize.
        assert_eq!(kinds[0], OperationKind::RemoveBootEntry);
        assert!(kinds.contains(&OperationKind::RemovePartition));
        assert_eq!(*kinds.last().unwrap(), OperationKind::ExtendPartition);
    }

    #[test]
    fn successful_rollback_clears_the_log_and_records_history() {
        let exec = FakeExecutor::new();
        let mut session = session_with_compensations();

        let report = rollback(&exec, &mut session);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed(), 0);
        assert!(session.compensations.is_empty());
        assert_eq!(session.history.len(), 3);
    }

    #[test]
    fn failed_compensations_stay_in_the_log_for_retry() {
        let exec = FakeExecutor::new();
        exec.script(OperationRecord::classify(
            OperationKind::RemovePartition,
            "",
            "Remove-Partition : The partition is in use.",
            Some(1),
        ));
        let mut session = session_with_compensations();

        let report = rollback(&exec, &mut session);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            session.compensations,
            vec![Compensation::RemovePartition {
                drive: "E".to_string()
            }]
        );
        // The failure did not stop the walk.
        assert_eq!(report.attempted.len(), 3);
    }
}
