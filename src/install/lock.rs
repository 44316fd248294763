//! Advisory lock serializing operations on one install root.

use anyhow::{Context, Result};
use fs2::FileExt;
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = ".lock";

/// Exclusive lock on `<root>/.lock`, released on drop.
#[derive(Debug)]
pub struct RootLock {
    file: File,
    path: PathBuf,
}

impl RootLock {
    /// Take the lock, waiting for another ghpm process to finish if needed.
    #[tracing::instrument]
    pub async fn acquire(install_root: &Path) -> Result<Self> {
        fs::create_dir_all(install_root)
            .with_context(|| format!("Failed to create install root {:?}", install_root))?;
        let path = install_root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {:?}", path))?;

        if file.try_lock_exclusive().is_err() {
            info!("Waiting for another ghpm process to release {:?}...", path);
            let file = file.try_clone()?;
            tokio::task::spawn_blocking(move || file.lock_exclusive())
                .await
                .context("Lock task failed")?
                .with_context(|| format!("Failed to lock {:?}", path))?;
        }

        debug!("Locked {:?}", path);
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock {:?}: {}", self.path, e);
        }
    }
}
