//! Image deployment: mount, bulk copy, unmount.

use crate::exec::ExecutorOps;
use crate::partition::{parse_drive_letter, run_powershell};
use crate::record::{OperationKind, OperationRecord, Outcome};
use std::path::Path;

/// robocopy exit codes below this signal copied/extra/mismatched files, not
/// failure; 8 and above mean at least one copy error.
const ROBOCOPY_FATAL_THRESHOLD: i32 = 8;

/// Stateless image-deployment service over an executor.
pub struct DeployManager<'a, E: ExecutorOps + ?Sized> {
    exec: &'a E,
}

impl<'a, E: ExecutorOps + ?Sized> DeployManager<'a, E> {
    pub fn new(exec: &'a E) -> Self {
        Self { exec }
    }

    /// Mount the image read-only. The assigned mount drive letter is embedded
    /// in the record's output; success without one degrades to
    /// [`Outcome::Ambiguous`].
    pub fn mount_image(&self, image: &Path) -> OperationRecord {
        let script = format!(
            "$img = Mount-DiskImage -ImagePath '{}' -PassThru; \
             ($img | Get-Volume | Select-Object -First 1).DriveLetter",
            image.display(),
        );
        let mut record = run_powershell(self.exec, OperationKind::MountImage, &script);
        if record.outcome == Outcome::Success && parse_drive_letter(&record.raw_output).is_none() {
            record.outcome = Outcome::Ambiguous;
        }
        record
    }

    /// Recursively copy every file and directory, preserving all attributes,
    /// from the mounted image onto the target partition. The copy utility
    /// retries transient per-file errors once with a one second wait; only
    /// the final outcome is surfaced here.
    pub fn copy_contents(&self, source_drive: &str, target_drive: &str) -> OperationRecord {
        let src = format!("{}:\\", source_drive);
        let dst = format!("{}:\\", target_drive);
        let mut record = self.exec.execute(
            OperationKind::CopyContents,
            "robocopy",
            &[&src, &dst, "/E", "/COPYALL", "/R:1", "/W:1"],
        );
        // robocopy reports what it did through the exit code, not through
        // stderr; anything below 8 means the copy completed.
        if let Some(code) = record.exit_code {
            record.outcome = if code < ROBOCOPY_FATAL_THRESHOLD {
                Outcome::Success
            } else {
                Outcome::Failure
            };
        }
        record
    }

    /// Release the mount. Callers attempt this even after a failed copy.
    pub fn unmount_image(&self, image: &Path) -> OperationRecord {
        let script = format!("Dismount-DiskImage -ImagePath '{}'", image.display());
        run_powershell(self.exec, OperationKind::UnmountImage, &script)
    }
}
