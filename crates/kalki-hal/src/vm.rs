//! Virtual machine fallback: probe for a supported engine and boot the image
//! in it without blocking the installer.
//!
//! Success means the engine process spawned; nothing here can see whether the
//! guest actually boots.

use crate::exec::ExecutorOps;
use crate::record::{OperationKind, OperationRecord};
use std::path::{Path, PathBuf};

const QEMU_EXE: &str = "qemu-system-x86_64.exe";
const VIRTUALBOX_EXE: &str = "VirtualBox.exe";

/// Supported engine families, in fixed preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmEngine {
    Qemu,
    VirtualBox,
}

impl VmEngine {
    pub const PREFERENCE_ORDER: [VmEngine; 2] = [VmEngine::Qemu, VmEngine::VirtualBox];

    pub fn executable_name(&self) -> &'static str {
        match self {
            VmEngine::Qemu => QEMU_EXE,
            VmEngine::VirtualBox => VIRTUALBOX_EXE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VmEngine::Qemu => "QEMU",
            VmEngine::VirtualBox => "VirtualBox",
        }
    }
}

/// An engine found on this host and the executable that runs it.
#[derive(Debug, Clone)]
pub struct VmCandidate {
    pub engine: VmEngine,
    pub executable: PathBuf,
}

/// Probe `work_dir` (bundled engines) and then the process search path for
/// each supported engine, in preference order.
pub fn probe(work_dir: &Path) -> Vec<VmCandidate> {
    let mut found = Vec::new();
    for engine in VmEngine::PREFERENCE_ORDER {
        let bundled = work_dir.join(engine.executable_name());
        if bundled.is_file() {
            found.push(VmCandidate {
                engine,
                executable: bundled,
            });
            continue;
        }
        if let Ok(executable) = which::which(engine.executable_name()) {
            found.push(VmCandidate { engine, executable });
        }
    }
    found
}

/// Stateless launcher over an executor.
pub struct VmLauncher<'a, E: ExecutorOps + ?Sized> {
    exec: &'a E,
}

impl<'a, E: ExecutorOps + ?Sized> VmLauncher<'a, E> {
    pub fn new(exec: &'a E) -> Self {
        Self { exec }
    }

    /// Spawn the engine detached, configured to boot from `image`.
    pub fn launch(&self, candidate: &VmCandidate, image: &Path) -> OperationRecord {
        let exe = candidate.executable.display().to_string();
        let iso = image.display().to_string();
        match candidate.engine {
            VmEngine::Qemu => self.exec.spawn_detached(
                OperationKind::LaunchVm,
                &exe,
                &[
                    "-m", "2048", "-smp", "2", "-cdrom", &iso, "-boot", "d", "-enable-kvm",
                    "-net", "nic", "-net", "user",
                ],
            ),
            VmEngine::VirtualBox => self.exec.spawn_detached(
                OperationKind::LaunchVm,
                &exe,
                &["--startvm", "KalkiVM", "--cdrom", &iso],
            ),
        }
    }
}
