use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Kalki OS launcher: dual-boot install, VM preview, boot-menu management"
)]
pub struct Cli {
    /// Log the privileged commands without executing them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Dual-boot install: shrink, create, deploy, register the boot entry.
    Install {
        /// Previously downloaded installer image; fetched when omitted.
        #[arg(long)]
        image: Option<PathBuf>,
        /// Gigabytes to take from the system partition (minimum 10).
        #[arg(long)]
        shrink_gb: Option<u32>,
        /// Drive letter of the new partition; normally detected, prompted
        /// for otherwise.
        #[arg(long)]
        target_drive: Option<String>,
        /// Boot menu description for the new entry.
        #[arg(long, default_value = kalki_hal::boot::DEFAULT_ENTRY_DESCRIPTION)]
        description: String,
        /// Skip interactive confirmation prompts.
        #[arg(long)]
        assume_yes: bool,
    },
    /// Replace the existing system entirely (not yet implemented).
    Replace,
    /// Boot the installer image inside QEMU or VirtualBox.
    TryVm {
        /// Previously downloaded installer image; fetched when omitted.
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Download the installer image.
    Download {
        /// Override the release URL.
        #[arg(long)]
        url: Option<String>,
        /// Directory to download into.
        #[arg(long)]
        dest: Option<PathBuf>,
        /// Expected SHA-256 of the image.
        #[arg(long)]
        sha256: Option<String>,
    },
    /// Remove the boot-menu entry added by `install`.
    UndoBoot {
        #[arg(long, default_value = kalki_hal::boot::DEFAULT_ENTRY_DESCRIPTION)]
        description: String,
    },
    /// Replay the compensation log of a failed session, newest first.
    Rollback {
        /// Session file written by a previous run.
        #[arg(long)]
        session: Option<PathBuf>,
    },
}
