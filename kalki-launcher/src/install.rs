//! Command wiring: prompts, session lease, orchestrator phases, reporting.
//!
//! All privileged effects flow through the executor handed in by `main`, so
//! `--dry-run` swaps one value and everything downstream follows.

use crate::download::{self, DownloadProgress, DownloadRequest};
use crate::ui::{confirm, validation};
use anyhow::{anyhow, Context, Result};
use kalki_hal::{BootEntryManager, ExecutorOps, Outcome};
use kalki_workflow::{
    load_session, save_session_atomic, InstallIntent, InstallationSession, LogSink, Orchestrator,
    SessionLock, WorkflowError,
};
use std::io::Write;
use std::path::PathBuf;

const SESSION_FILE: &str = "kalki-session.json";

pub struct InstallArgs {
    pub image: Option<PathBuf>,
    pub shrink_gb: Option<u32>,
    pub target_drive: Option<String>,
    pub description: String,
    pub assume_yes: bool,
}

pub fn run_install<E: ExecutorOps + ?Sized>(exec: &E, args: InstallArgs) -> Result<()> {
    let _lease = SessionLock::acquire(&lease_path())?;
    let mut sink = LogSink;
    let mut orch = Orchestrator::new(exec, &mut sink, InstallIntent::DualBoot);

    orch.begin_download()?;
    let image = resolve_image(args.image)?;
    orch.image_ready(&image);
    println!("Installer image: {}", image.display());

    let shrink_gb = match args.shrink_gb {
        Some(size) => size,
        None if args.assume_yes => {
            anyhow::bail!("--shrink-gb is required with --assume-yes")
        }
        None => confirm::prompt_shrink_gb()?,
    };

    if !args.assume_yes {
        let prompt = format!(
            "This will shrink your system partition by {} GB and create space for Kalki OS. Continue?",
            shrink_gb
        );
        if !confirm::confirm_destructive_action(&prompt)? {
            println!("Aborted; nothing was changed.");
            return Ok(());
        }
    }

    println!("Shrinking the system partition by {} GB...", shrink_gb);
    if let Err(err) = orch.run_partitioning(shrink_gb) {
        return finish_failed(orch.into_session(), err);
    }

    // The user's answer wins over the letter detected in the create output.
    let detected = orch.session().target_drive.clone();
    let target = match args.target_drive {
        Some(flag) => validation::parse_drive_letter(&flag).map_err(|msg| anyhow!(msg))?,
        None if args.assume_yes => detected
            .clone()
            .ok_or_else(|| anyhow!("no target drive detected; pass --target-drive"))?,
        None => confirm::prompt_target_drive(detected.as_deref())?,
    };
    orch.set_target_drive(&target);

    println!("Deploying the image onto {}:\\...", target);
    if let Err(err) = orch.run_deployment() {
        return finish_failed(orch.into_session(), err);
    }

    println!("Adding '{}' to the boot menu...", args.description);
    if let Err(err) = orch.run_boot_registration(&args.description) {
        return finish_failed(orch.into_session(), err);
    }

    println!(
        "Installation complete! Select '{}' in the boot menu after the next restart.",
        args.description
    );
    println!(
        "Boot menu changes can be undone at any time with: kalki undo-boot --description \"{}\"",
        args.description
    );
    save_session_atomic(&session_path(), orch.session())?;

    if !args.assume_yes && confirm::confirm_destructive_action("Reboot now?")? {
        let reboot = orch.request_reboot();
        if reboot.outcome != Outcome::Success {
            anyhow::bail!("reboot request failed: {}", reboot.diagnostic());
        }
    }
    Ok(())
}

pub fn run_try_vm<E: ExecutorOps + ?Sized>(exec: &E, image: Option<PathBuf>) -> Result<()> {
    let mut sink = LogSink;
    let mut orch = Orchestrator::new(exec, &mut sink, InstallIntent::TryInVm);

    orch.begin_download()?;
    let image = resolve_image(image)?;
    orch.image_ready(&image);

    let work_dir = std::env::current_dir().context("failed to resolve working directory")?;
    match orch.run_vm_fallback(&work_dir) {
        Ok(candidate) => {
            println!(
                "{} launched. Close the VM window to return.",
                candidate.engine.label()
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err);
            Err(err.into())
        }
    }
}

pub fn run_download(
    url: Option<String>,
    dest: Option<PathBuf>,
    sha256: Option<String>,
) -> Result<()> {
    let mut req = DownloadRequest::default();
    if let Some(url) = url {
        req.url = url;
    }
    if let Some(dest) = dest {
        req.dest_dir = dest;
    }
    req.expected_sha256 = sha256;

    let path = download_with_progress(&req)?;
    println!("Download complete: {}", path.display());
    Ok(())
}

pub fn run_undo_boot<E: ExecutorOps + ?Sized>(exec: &E, description: &str) -> Result<()> {
    let record = BootEntryManager::new(exec).remove_entry(description);
    match record.outcome {
        Outcome::Success if record.raw_output.starts_with("no boot entry") => {
            println!("{}", record.raw_output);
            Ok(())
        }
        Outcome::Success => {
            println!("Boot entry '{}' removed.", description);
            Ok(())
        }
        _ => anyhow::bail!("failed to remove boot entry: {}", record.diagnostic()),
    }
}

pub fn run_rollback<E: ExecutorOps + ?Sized>(exec: &E, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(session_path);
    let Some(session) = load_session(&path)? else {
        anyhow::bail!("no session file at {}", path.display());
    };
    if session.compensations.is_empty() {
        println!("Nothing to roll back.");
        return Ok(());
    }

    let _lease = SessionLock::acquire(&lease_path())?;
    let mut sink = LogSink;
    let mut orch = Orchestrator::with_session(exec, &mut sink, session);
    let report = orch.rollback();

    for (comp, record) in &report.attempted {
        match record.outcome {
            Outcome::Success => println!("reverted: {}", comp),
            _ => println!("failed to revert: {} ({})", comp, record.diagnostic()),
        }
    }
    println!(
        "Rollback finished: {} reverted, {} still pending.",
        report.succeeded(),
        report.failed()
    );
    save_session_atomic(&path, orch.session())?;

    if report.failed() > 0 {
        anyhow::bail!("{} compensation(s) could not be applied", report.failed());
    }
    Ok(())
}

fn resolve_image(image: Option<PathBuf>) -> Result<PathBuf> {
    match image {
        Some(path) if path.is_file() => Ok(path),
        Some(path) => anyhow::bail!("image not found: {}", path.display()),
        None => {
            println!("Fetching {}...", download::DEFAULT_IMAGE_URL);
            download_with_progress(&DownloadRequest::default())
        }
    }
}

fn download_with_progress(req: &DownloadRequest) -> Result<PathBuf> {
    let mut last_pct = None;
    let mut progress = |p: DownloadProgress| {
        if let Some(total) = p.total {
            let pct = p.received * 100 / total.max(1);
            if last_pct != Some(pct) {
                print!("\rDownloading ISO... {}%", pct);
                std::io::stdout().flush().ok();
                last_pct = Some(pct);
            }
        }
        true
    };
    let path = download::fetch(req, &mut progress);
    if last_pct.is_some() {
        println!();
    }
    path
}

fn finish_failed(session: InstallationSession, err: WorkflowError) -> Result<()> {
    let path = session_path();
    if let Err(save_err) = save_session_atomic(&path, &session) {
        log::warn!("could not save session for diagnostics: {}", save_err);
    }
    eprintln!("Install halted: {}", err);
    if !session.compensations.is_empty() {
        eprintln!(
            "Changes already made can be reverted with: kalki rollback --session {}",
            path.display()
        );
    }
    Err(err.into())
}

fn session_path() -> PathBuf {
    PathBuf::from(SESSION_FILE)
}

fn lease_path() -> PathBuf {
    std::env::temp_dir().join("kalki-launcher.lease")
}
