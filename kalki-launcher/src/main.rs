use clap::Parser;
use kalki_hal::{DryRunExecutor, ExecutorOps, HostExecutor};
use kalki_launcher::{cli, install, logging};

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = cli::Cli::parse();

    let host = HostExecutor::new();
    let dry = DryRunExecutor::new();
    let exec: &dyn ExecutorOps = if cli.dry_run { &dry } else { &host };

    match cli.command {
        cli::Command::Install {
            image,
            shrink_gb,
            target_drive,
            description,
            assume_yes,
        } => install::run_install(
            exec,
            install::InstallArgs {
                image,
                shrink_gb,
                target_drive,
                description,
                assume_yes,
            },
        ),
        cli::Command::Replace => Err(kalki_workflow::WorkflowError::ReplaceNotImplemented.into()),
        cli::Command::TryVm { image } => install::run_try_vm(exec, image),
        cli::Command::Download { url, dest, sha256 } => install::run_download(url, dest, sha256),
        cli::Command::UndoBoot { description } => install::run_undo_boot(exec, &description),
        cli::Command::Rollback { session } => install::run_rollback(exec, session),
    }
}
