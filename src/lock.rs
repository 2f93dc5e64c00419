//! Advisory file lock preventing concurrent runs.
//!
//! Two overlapping runs would race on the prefix files and the ruleset, so
//! fetch, setup and update all hold an exclusive flock for their duration.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

/// Holds the exclusive lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Acquire the lock at `lock_path` without blocking.
    ///
    /// Fails immediately if another instance holds it.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).ok();
        }

        // Opening without truncation avoids a race between create and lock
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another instance of asnwall is already running.\n\
                 If you believe this is an error, remove the lock file: {:?}\n\
                 Or wait for the other instance to complete.",
                lock_path
            )
        })?;

        debug!("Acquired lock {:?}", lock_path);
        Ok(Self { _file: file })
    }
}
