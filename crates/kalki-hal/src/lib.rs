//! Privileged host operations for the Kalki OS launcher.
//!
//! Everything that touches the machine goes through [`ExecutorOps`], so the
//! workflow layer can be driven in tests without elevated privileges. The
//! managers are stateless services invoked with explicit parameters; they
//! hold no session state and report every attempt as an [`OperationRecord`].

pub mod boot;
pub mod deploy;
pub mod exec;
pub mod partition;
pub mod record;
pub mod vm;

pub use boot::BootEntryManager;
pub use deploy::DeployManager;
pub use exec::{DryRunExecutor, ExecutorOps, FakeExecutor, HostExecutor, Invocation};
pub use partition::PartitionManager;
pub use record::{OperationKind, OperationRecord, Outcome};
pub use vm::{VmCandidate, VmEngine, VmLauncher};
