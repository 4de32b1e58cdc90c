//! Host-exclusive session lease.
//!
//! Two orchestrators mutating the same disk and boot store would interleave
//! privileged operations with no transactional discipline to save them; an
//! exclusive flock on a well-known lease file keeps a second session from
//! starting at all.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held for the lifetime of a session; released on drop.
#[derive(Debug)]
pub struct SessionLock {
    _file: File,
    path: PathBuf,
}

impl SessionLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Do not unlink "stale" lease files. Unlinking a still-locked file
        // can allow a second process to create a new file at the same path
        // and acquire a separate exclusive lock, defeating mutual exclusion.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to create lease file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            drop(file);
            anyhow::bail!(
                "Another installation session holds the lease: {}",
                path.display()
            );
        }

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_while_the_lease_is_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.lease");

        let held = SessionLock::acquire(&path).unwrap();
        let err = SessionLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("holds the lease"));
        drop(held);
    }

    #[test]
    fn lease_can_be_reacquired_after_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.lease");

        drop(SessionLock::acquire(&path).unwrap());
        let again = SessionLock::acquire(&path).unwrap();
        assert_eq!(again.path(), path);
    }
}
