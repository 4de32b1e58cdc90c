//! Partition operations for carving out the new system volume.
//!
//! All mutations are delegated to the platform partition utility. Sizes are
//! forwarded untouched; an invalid shrink surfaces as that utility's own
//! failure text rather than being pre-validated here.

use crate::exec::ExecutorOps;
use crate::record::{OperationKind, OperationRecord, Outcome};

/// Drive letter of the partition holding the running system.
const SYSTEM_DRIVE: char = 'C';
/// Filesystem and volume label stamped onto the new partition.
const NEW_VOLUME_FS: &str = "NTFS";
const NEW_VOLUME_LABEL: &str = "KalkiOS";

pub(crate) fn run_powershell<E: ExecutorOps + ?Sized>(
    exec: &E,
    kind: OperationKind,
    script: &str,
) -> OperationRecord {
    exec.execute(
        kind,
        "powershell.exe",
        &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", script],
    )
}

/// Stateless partition service over an executor.
pub struct PartitionManager<'a, E: ExecutorOps + ?Sized> {
    exec: &'a E,
}

impl<'a, E: ExecutorOps + ?Sized> PartitionManager<'a, E> {
    pub fn new(exec: &'a E) -> Self {
        Self { exec }
    }

    /// Shrink the system partition by exactly `size_gb` gigabytes, leaving
    /// the freed space unallocated.
    pub fn shrink_system_partition(&self, size_gb: u32) -> OperationRecord {
        let script = format!(
            "$partition = Get-Partition -DriveLetter {drive}; \
             Resize-Partition -DriveLetter {drive} -Size ($partition.Size - {size_gb}GB)",
            drive = SYSTEM_DRIVE,
        );
        run_powershell(self.exec, OperationKind::ShrinkPartition, &script)
    }

    /// Create and format a partition of `size_gb` gigabytes from unallocated
    /// space on the system disk. The assigned drive letter is embedded in the
    /// record's output; a run that reports success without one is downgraded
    /// to [`Outcome::Ambiguous`].
    pub fn create_partition(&self, size_gb: u32) -> OperationRecord {
        let script = format!(
            "$disk = Get-Disk | Where-Object PartitionStyle -Eq 'GPT' | \
             Where-Object IsSystem -Eq $true; \
             New-Partition -DiskNumber $disk.Number -Size ({size_gb}GB) -AssignDriveLetter | \
             Format-Volume -FileSystem {NEW_VOLUME_FS} -NewFileSystemLabel '{NEW_VOLUME_LABEL}'",
        );
        let mut record = run_powershell(self.exec, OperationKind::CreatePartition, &script);
        if record.outcome == Outcome::Success && parse_drive_letter(&record.raw_output).is_none() {
            record.outcome = Outcome::Ambiguous;
        }
        record
    }

    /// Compensation: delete a partition this tool created.
    pub fn remove_partition(&self, drive: &str) -> OperationRecord {
        let script = format!("Remove-Partition -DriveLetter {drive} -Confirm:$false");
        run_powershell(self.exec, OperationKind::RemovePartition, &script)
    }

    /// Compensation: grow the system partition back by `size_gb` gigabytes of
    /// adjacent unallocated space.
    pub fn extend_system_partition(&self, size_gb: u32) -> OperationRecord {
        let script = format!(
            "$partition = Get-Partition -DriveLetter {drive}; \
             Resize-Partition -DriveLetter {drive} -Size ($partition.Size + {size_gb}GB)",
            drive = SYSTEM_DRIVE,
        );
        run_powershell(self.exec, OperationKind::ExtendPartition, &script)
    }
}

/// Extract an assigned drive letter from volume-utility output.
///
/// Accepts the bare letter, `DriveLetter : E` list output, and the table
/// layout where the letter is the first column of the data row.
pub fn parse_drive_letter(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if is_drive_letter(trimmed) {
        return Some(trimmed.to_ascii_uppercase());
    }

    let mut saw_header = false;
    for line in trimmed.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("DriveLetter") {
            let rest = rest.trim_start();
            if let Some(value) = rest.strip_prefix(':') {
                let value = value.trim();
                if is_drive_letter(value) {
                    return Some(value.to_ascii_uppercase());
                }
            } else {
                saw_header = true;
            }
            continue;
        }
        if saw_header && !line.is_empty() && !line.starts_with('-') {
            if let Some(first) = line.split_whitespace().next() {
                if is_drive_letter(first) {
                    return Some(first.to_ascii_uppercase());
                }
            }
        }
    }
    None
}

fn is_drive_letter(text: &str) -> bool {
    text.len() == 1 && text.chars().all(|c| c.is_ascii_alphabetic())
}
