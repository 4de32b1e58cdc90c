//! Installer image download: fixed release URL, resumable, checksum-verified.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

pub const DEFAULT_IMAGE_URL: &str = "https://releases.kalki.os/latest/KalkiOS.iso";
const USER_AGENT: &str = "kalki-launcher";
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub dest_dir: PathBuf,
    pub expected_sha256: Option<String>,
    pub max_retries: usize,
    pub timeout_secs: u64,
    pub resume: bool,
}

impl Default for DownloadRequest {
    fn default() -> Self {
        Self {
            url: DEFAULT_IMAGE_URL.to_string(),
            dest_dir: PathBuf::from("downloads"),
            expected_sha256: None,
            max_retries: 3,
            timeout_secs: 120,
            resume: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    pub received: u64,
    pub total: Option<u64>,
}

enum FetchOutcome {
    Done,
    Cancelled,
}

/// Fetch the image, resuming a partial file when the server cooperates.
/// Returns the final local path; the progress callback may return `false` to
/// cancel between chunks.
pub fn fetch(
    req: &DownloadRequest,
    progress: &mut dyn FnMut(DownloadProgress) -> bool,
) -> Result<PathBuf> {
    let client = Client::builder()
        .timeout(Duration::from_secs(req.timeout_secs))
        .user_agent(USER_AGENT)
        .build()?;
    fs::create_dir_all(&req.dest_dir)
        .with_context(|| format!("Failed to create {}", req.dest_dir.display()))?;

    let filename = req
        .url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("KalkiOS.iso");
    let target = req.dest_dir.join(filename);

    let attempts = req.max_retries.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        log::info!("Download attempt {}/{}: {}", attempt, attempts, req.url);
        match fetch_once(&client, req, &target, progress) {
            Ok(FetchOutcome::Cancelled) => anyhow::bail!("Download cancelled by user."),
            Ok(FetchOutcome::Done) => {
                if let Some(expected) = &req.expected_sha256 {
                    if let Err(err) = verify_sha256(&target, expected) {
                        log::warn!("checksum verification failed: {}", err);
                        // A corrupt file would resume corrupt; start over.
                        let _ = fs::remove_file(&target);
                        last_err = Some(err);
                        continue;
                    }
                }
                return Ok(target);
            }
            Err(err) => {
                log::warn!("download attempt {} failed: {}", attempt, err);
                last_err = Some(err);
                sleep(RETRY_BACKOFF);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("download failed: {}", req.url)))
}

fn fetch_once(
    client: &Client,
    req: &DownloadRequest,
    target: &Path,
    progress: &mut dyn FnMut(DownloadProgress) -> bool,
) -> Result<FetchOutcome> {
    let mut existing = 0u64;
    if req.resume {
        if let Ok(meta) = fs::metadata(target) {
            existing = meta.len();
        }
    }

    let mut request = client.get(req.url.as_str());
    if existing > 0 {
        request = request.header(RANGE, format!("bytes={}-", existing));
    }
    let mut response = request.send()?.error_for_status()?;

    let resumed = existing > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
    let total = response
        .content_length()
        .map(|len| len + if resumed { existing } else { 0 });

    let mut file = if resumed {
        log::info!("Resuming from byte {}", existing);
        OpenOptions::new().append(true).open(target)?
    } else {
        File::create(target)?
    };

    let mut received = if resumed { existing } else { 0 };
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = response.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])?;
        received += read as u64;
        if !progress(DownloadProgress { received, total }) {
            return Ok(FetchOutcome::Cancelled);
        }
    }
    file.sync_all().ok();
    Ok(FetchOutcome::Done)
}

fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let computed = format!("{:x}", hasher.finalize());
    if !computed.eq_ignore_ascii_case(expected.trim()) {
        anyhow::bail!("checksum mismatch: {} != {}", computed, expected);
    }
    Ok(())
}
