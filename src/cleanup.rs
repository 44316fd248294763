//! Interruption handling for the staging phase of an install.
//!
//! Staging directories are registered here while archives are downloaded and
//! extracted. A Ctrl-C before the first file is moved into the install root
//! removes them and exits. Once the commit phase begins the context stops
//! honouring interruption, so the operation always finishes or rolls back.

use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Exit code used after an interrupted install.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Tracks paths that need cleanup on interruption
#[derive(Default)]
pub struct CleanupContext {
    paths: Vec<PathBuf>,
    committing: bool,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path to be cleaned up on interruption
    pub fn add(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Remove a path from cleanup list (e.g., when operation succeeds)
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Files are about to reach the install root; interruption is no longer safe.
    pub fn begin_commit(&mut self) {
        self.committing = true;
    }

    pub fn is_committing(&self) -> bool {
        self.committing
    }

    /// Clean up all registered paths
    pub fn cleanup(&self) {
        for path in &self.paths {
            debug!("Cleaning up: {:?}", path);
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(path);
            } else {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// Type alias for shared cleanup context
pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

/// Create a new shared cleanup context
pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Lock the context, recovering the data if a panicking thread poisoned it.
pub fn lock(ctx: &SharedCleanupContext) -> MutexGuard<'_, CleanupContext> {
    ctx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle a Ctrl-C. Returns true when the registered paths were cleaned and
/// the process should exit, false when a commit is in progress.
pub fn interrupt(ctx: &SharedCleanupContext) -> bool {
    let guard = lock(ctx);
    if guard.is_committing() {
        return false;
    }
    guard.cleanup();
    true
}

/// Spawn the Ctrl-C listener for one install operation. Abort the returned
/// handle once the operation completes.
pub fn spawn_interrupt_handler(ctx: SharedCleanupContext) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt(&ctx) {
                eprintln!("\nInterrupted, cleaning up...");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            eprintln!("\nInstall is committing files and will finish or roll back first.");
        }
    })
}

/// RAII guard that automatically removes a path from cleanup context when dropped
pub struct CleanupGuard {
    ctx: SharedCleanupContext,
    path: PathBuf,
}

impl CleanupGuard {
    /// Create a new cleanup guard and register the path
    pub fn new(ctx: SharedCleanupContext, path: PathBuf) -> Self {
        lock(&ctx).add(path.clone());
        Self { ctx, path }
    }

    /// Mark the operation as finished, removing the path from cleanup
    pub fn success(self) {
        lock(&self.ctx).remove(&self.path);
    }
}
