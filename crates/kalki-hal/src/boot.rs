//! Boot configuration store edits.
//!
//! The store is only ever touched through the platform's boot-configuration
//! utility; entry identifiers are parsed out of its output rather than
//! assumed. A logical add or remove may issue several utility invocations but
//! always reports exactly one record.

use crate::exec::ExecutorOps;
use crate::record::{OperationKind, OperationRecord, Outcome};

/// Description used for the boot entry unless the caller overrides it. The
/// description is the lookup key for removal, so at most one entry should
/// carry it.
pub const DEFAULT_ENTRY_DESCRIPTION: &str = "Kalki OS";

const LOADER_PATH: &str = "\\EFI\\Boot\\bootx64.efi";
const SYSTEM_ROOT: &str = "\\Windows";

/// Stateless boot-menu service over an executor.
pub struct BootEntryManager<'a, E: ExecutorOps + ?Sized> {
    exec: &'a E,
}

impl<'a, E: ExecutorOps + ?Sized> BootEntryManager<'a, E> {
    pub fn new(exec: &'a E) -> Self {
        Self { exec }
    }

    /// Duplicate the current boot entry, rename the duplicate, repoint its
    /// device, loader path and system root at `target_drive`, and append it
    /// to the display order. Existing entries and the default selection are
    /// never touched.
    ///
    /// If the duplicate's identifier cannot be parsed out of the copy output
    /// the sequence stops there and the record is [`Outcome::Ambiguous`].
    pub fn add_entry(&self, target_drive: &str, description: &str) -> OperationRecord {
        let copy = self.exec.execute(
            OperationKind::AddBootEntry,
            "bcdedit",
            &["/copy", "{current}", "/d", description],
        );
        if copy.outcome != Outcome::Success {
            return copy;
        }
        let Some(id) = parse_entry_id(&copy.raw_output) else {
            let mut record = copy;
            record.outcome = Outcome::Ambiguous;
            return record;
        };

        let mut transcript = vec![copy.raw_output.clone()];
        let device = format!("partition={}:", target_drive);
        let steps: [&[&str]; 5] = [
            &["/set", &id, "device", &device],
            &["/set", &id, "osdevice", &device],
            &["/set", &id, "path", LOADER_PATH],
            &["/set", &id, "systemroot", SYSTEM_ROOT],
            &["/displayorder", &id, "/addlast"],
        ];
        let mut merged = copy;
        for args in steps {
            let step = self.exec.execute(OperationKind::AddBootEntry, "bcdedit", args);
            transcript.push(step.raw_output.clone());
            if step.outcome != Outcome::Success {
                let mut failed = step;
                failed.raw_output = transcript.join("\n").trim().to_string();
                return failed;
            }
            merged.exit_code = step.exit_code;
        }
        merged.raw_output = transcript.join("\n").trim().to_string();
        merged
    }

    /// Remove the entry whose description matches `description` exactly,
    /// deleting the first (ideally the only) match. Zero matches is a
    /// successful no-op, never a failure.
    pub fn remove_entry(&self, description: &str) -> OperationRecord {
        let enumerated =
            self.exec
                .execute(OperationKind::RemoveBootEntry, "bcdedit", &["/enum", "all"]);
        if enumerated.outcome != Outcome::Success {
            return enumerated;
        }
        match find_entry_id(&enumerated.raw_output, description) {
            Some(id) => self.exec.execute(
                OperationKind::RemoveBootEntry,
                "bcdedit",
                &["/delete", &id, "/f"],
            ),
            None => {
                let mut record = enumerated;
                record.raw_output = format!("no boot entry matches '{}'", description);
                record
            }
        }
    }
}

/// Pull the braced identifier out of `The entry was successfully copied to
/// {guid}.`.
pub fn parse_entry_id(output: &str) -> Option<String> {
    let start = output.find('{')?;
    let end = output[start..].find('}')? + start;
    let id = &output[start..=end];
    (id.len() > 2).then(|| id.to_string())
}

/// Walk `/enum all` output pairing each `identifier` line with the
/// `description` that follows it; return the identifier of the first entry
/// whose description matches exactly.
pub fn find_entry_id(listing: &str, description: &str) -> Option<String> {
    let mut current_id: Option<String> = None;
    for line in listing.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("identifier") {
            current_id = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("description") {
            if rest.trim() == description {
                if let Some(id) = current_id {
                    return Some(id);
                }
            }
        }
    }
    None
}
