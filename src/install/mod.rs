//! Materializes an install plan under the install root.
//!
//! Every package that needs installing is downloaded and unpacked into
//! `<root>/.staging/<name>/` first, concurrently. Only when all of them are
//! staged are files moved into `<root>/<name>/`, strictly in plan order. A
//! failure while moving rolls back every package placed by this operation,
//! restoring files that `force` had moved aside, so the root ends up exactly
//! as it was before.

mod lock;
mod staging;

pub use lock::{LOCK_FILE, RootLock};
pub use staging::{STAGING_DIR, StagedPackage};

use anyhow::{Context, anyhow};
use chrono::Utc;
use futures_util::TryStreamExt;
use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::ArchiveExtractorImpl;
use crate::cleanup::{self, CleanupGuard, SharedCleanupContext};
use crate::error::PackageError;
use crate::http::HttpClient;
use crate::ledger::{InstallRecord, Ledger};
use crate::manifest::validate_package_name;
use crate::resolver::{DEFAULT_CONCURRENCY, InstallPlan, PlannedPackage};
use crate::runtime::path::to_slash;
use crate::runtime::{Runtime, is_path_under, relative_path_from_dir};
use crate::source::ManifestSource;

const BACKUP_DIR: &str = "previous";

#[derive(Debug, Clone)]
pub struct InstallerOptions {
    /// Replace packages that are already installed
    pub force: bool,
    /// Maximum number of concurrent downloads
    pub concurrency: usize,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            force: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallOutcome {
    /// Records written by this operation, in plan order
    pub installed: Vec<InstallRecord>,
    /// Package names left untouched because they were already installed
    pub skipped: Vec<String>,
}

/// What one package changed on disk, so it can be undone.
#[derive(Debug)]
struct Placement {
    package_name: String,
    target: PathBuf,
    created_target: bool,
    placed: Vec<PathBuf>,
    /// (original, backup) pairs of files moved aside by `force`
    backups: Vec<(PathBuf, PathBuf)>,
    previous: Option<InstallRecord>,
    recorded: bool,
}

impl Placement {
    fn new(package_name: &str, target: PathBuf) -> Self {
        Self {
            package_name: package_name.to_string(),
            target,
            created_target: false,
            placed: Vec::new(),
            backups: Vec::new(),
            previous: None,
            recorded: false,
        }
    }
}

pub struct Installer<'a, R: Runtime + ?Sized, S: ManifestSource + ?Sized> {
    runtime: &'a R,
    http_client: &'a HttpClient,
    source: &'a S,
    extractor: ArchiveExtractorImpl,
    install_root: PathBuf,
    options: InstallerOptions,
    cleanup: SharedCleanupContext,
}

impl<'a, R: Runtime + ?Sized, S: ManifestSource + ?Sized> Installer<'a, R, S> {
    pub fn new(
        runtime: &'a R,
        http_client: &'a HttpClient,
        source: &'a S,
        install_root: PathBuf,
        options: InstallerOptions,
        cleanup: SharedCleanupContext,
    ) -> Self {
        Self {
            runtime,
            http_client,
            source,
            extractor: ArchiveExtractorImpl::new(),
            install_root,
            options,
            cleanup,
        }
    }

    pub fn package_dir(&self, package_name: &str) -> PathBuf {
        self.install_root.join(package_name)
    }

    /// Install every package of the plan that is not installed yet, updating
    /// and saving the ledger. All or nothing.
    #[tracing::instrument(skip(self, plan, ledger), fields(root = ?self.install_root))]
    pub async fn install(
        &self,
        plan: &InstallPlan,
        ledger: &mut Ledger,
    ) -> Result<InstallOutcome, PackageError> {
        let (pending, skipped) = self.select(plan, ledger)?;
        if pending.is_empty() {
            info!("Nothing to install, {} package(s) already present", skipped.len());
            return Ok(InstallOutcome {
                installed: Vec::new(),
                skipped,
            });
        }

        let staging_root = self.install_root.join(STAGING_DIR);
        let guard = CleanupGuard::new(Arc::clone(&self.cleanup), staging_root.clone());

        let result = self.stage_and_commit(&pending, &staging_root, ledger).await;

        if self.runtime.exists(&staging_root)
            && let Err(e) = self.runtime.remove_dir_all(&staging_root)
        {
            warn!("Failed to remove staging directory {:?}: {}", staging_root, e);
        }
        guard.success();

        let installed = result?;
        Ok(InstallOutcome { installed, skipped })
    }

    /// Split the plan into packages to install and names to skip.
    fn select<'p>(
        &self,
        plan: &'p InstallPlan,
        ledger: &Ledger,
    ) -> Result<(Vec<&'p PlannedPackage>, Vec<String>), PackageError> {
        let mut pending = Vec::new();
        let mut skipped = Vec::new();

        for entry in &plan.entries {
            let name = &entry.package_name;
            validate_package_name(name).map_err(|reason| PackageError::write_failure(name, reason))?;
            match ledger.get(name) {
                Some(record) if !self.options.force => {
                    if record.locator.identity() != entry.locator.identity() {
                        return Err(PackageError::write_failure(
                            name,
                            format!(
                                "'{}' is already taken by {}; use --force to replace it",
                                name, record.locator
                            ),
                        ));
                    }
                    if record.locator != entry.locator {
                        warn!(
                            "{} is installed at {}, keeping it instead of {} (use --force to replace)",
                            name, record.locator, entry.locator
                        );
                    } else {
                        debug!("{} is already installed", record.locator);
                    }
                    skipped.push(name.clone());
                }
                None if !self.options.force && self.runtime.exists(&self.package_dir(name)) => {
                    return Err(PackageError::write_failure(
                        name,
                        format!(
                            "{:?} exists but is not recorded in the ledger; use --force to overwrite it",
                            self.package_dir(name)
                        ),
                    ));
                }
                _ => pending.push(entry),
            }
        }
        Ok((pending, skipped))
    }

    async fn stage_and_commit(
        &self,
        pending: &[&PlannedPackage],
        staging_root: &Path,
        ledger: &mut Ledger,
    ) -> Result<Vec<InstallRecord>, PackageError> {
        let staged = self.stage_all(pending, staging_root).await?;

        cleanup::lock(&self.cleanup).begin_commit();
        self.commit(&staged, ledger)?;

        Ok(staged
            .iter()
            .filter_map(|s| ledger.get(&s.package_name).cloned())
            .collect())
    }

    /// Download and unpack all pending packages, bounded by the concurrency
    /// limit. The first failure abandons the downloads still in flight.
    async fn stage_all(
        &self,
        pending: &[&PlannedPackage],
        staging_root: &Path,
    ) -> Result<Vec<StagedPackage>, PackageError> {
        self.runtime
            .create_dir_all(staging_root)
            .map_err(|e| PackageError::write_failure("staging", e))?;

        stream::iter(pending.iter().copied())
            .map(|entry| {
                let url = self.source.archive_url(&entry.locator);
                async move {
                    staging::stage(
                        self.runtime,
                        self.http_client,
                        &self.extractor,
                        staging_root,
                        &entry.package_name,
                        &entry.locator,
                        &url,
                    )
                    .await
                }
            })
            .buffered(self.options.concurrency.max(1))
            .try_collect()
            .await
    }

    /// Move staged packages into place in plan order and save the ledger.
    fn commit(&self, staged: &[StagedPackage], ledger: &mut Ledger) -> Result<(), PackageError> {
        let mut placements: Vec<Placement> = Vec::with_capacity(staged.len());

        for package in staged {
            let mut placement =
                Placement::new(&package.package_name, self.package_dir(&package.package_name));
            let result = self.place(package, &mut placement, ledger);
            placements.push(placement);

            if let Err(e) = result {
                let err = PackageError::write_failure(&package.package_name, e);
                warn!("{}; rolling back", err);
                self.rollback(placements, ledger);
                return Err(err);
            }
            println!("   installed {}", package.locator);
        }

        if let Err(e) = ledger.save(self.runtime, &Ledger::path(&self.install_root)) {
            let err = PackageError::write_failure("ledger", e);
            warn!("{}; rolling back", err);
            self.rollback(placements, ledger);
            return Err(err);
        }
        Ok(())
    }

    fn place(
        &self,
        package: &StagedPackage,
        placement: &mut Placement,
        ledger: &mut Ledger,
    ) -> anyhow::Result<()> {
        let target = placement.target.clone();
        let backup_dir = package.dir.join(BACKUP_DIR);

        if let Some(previous) = ledger.get(&package.package_name).cloned() {
            for relative in &previous.files_written {
                let original = target.join(relative);
                if !is_path_under(&original, &target) {
                    warn!("Ignoring recorded file outside the package: {}", relative);
                    continue;
                }
                if !self.runtime.exists(&original) {
                    continue;
                }
                let backup = backup_dir.join(relative);
                if let Some(parent) = backup.parent() {
                    self.runtime.create_dir_all(parent)?;
                }
                self.runtime.rename(&original, &backup)?;
                placement.backups.push((original, backup));
            }
            debug!(
                "Moved {} file(s) of {} aside",
                placement.backups.len(),
                previous.locator
            );
            placement.previous = Some(previous);
        }

        if !self.runtime.exists(&target) {
            self.runtime.create_dir_all(&target)?;
            placement.created_target = true;
        }

        let mut files_written = BTreeSet::new();
        for file in collect_files(self.runtime, &package.contents_dir)? {
            let relative = relative_path_from_dir(&package.contents_dir, &file)
                .ok_or_else(|| anyhow!("Cannot place {:?}", file))?;
            let dest = target.join(&relative);
            if let Some(parent) = dest.parent() {
                self.runtime
                    .create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            // unrecorded files in the way are kept for rollback too
            if self.runtime.exists(&dest) && !self.runtime.is_dir(&dest) {
                let backup = backup_dir.join(&relative);
                if let Some(parent) = backup.parent() {
                    self.runtime.create_dir_all(parent)?;
                }
                self.runtime
                    .rename(&dest, &backup)
                    .with_context(|| format!("Failed to move {:?} aside", dest))?;
                debug!("Moved unrecorded {:?} aside", dest);
                placement.backups.push((dest.clone(), backup));
            }
            self.runtime
                .rename(&file, &dest)
                .with_context(|| format!("Failed to move {:?} into place", dest))?;
            placement.placed.push(dest);
            files_written.insert(to_slash(&relative));
        }

        ledger.put(InstallRecord {
            package_name: package.package_name.clone(),
            locator: package.locator.clone(),
            install_path: target,
            installed_at: Utc::now(),
            files_written,
            checksum: Some(package.checksum.clone()),
        });
        placement.recorded = true;
        Ok(())
    }

    /// Undo placements, newest first. Best effort: failures are logged.
    fn rollback(&self, placements: Vec<Placement>, ledger: &mut Ledger) {
        for placement in placements.into_iter().rev() {
            info!("Rolling back {}", placement.package_name);

            let mut dirs = BTreeSet::new();
            for file in placement.placed.iter().rev() {
                if let Err(e) = self.runtime.remove_file(file) {
                    warn!("Failed to remove {:?}: {}", file, e);
                }
                let mut parent = file.parent();
                while let Some(dir) = parent {
                    if dir == placement.target || !is_path_under(dir, &placement.target) {
                        break;
                    }
                    dirs.insert(dir.to_path_buf());
                    parent = dir.parent();
                }
            }
            // deepest first; non-empty directories stay
            let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
            dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
            for dir in dirs {
                let _ = self.runtime.remove_dir(&dir);
            }

            for (original, backup) in &placement.backups {
                if let Some(parent) = original.parent()
                    && let Err(e) = self.runtime.create_dir_all(parent)
                {
                    warn!("Failed to recreate {:?}: {}", parent, e);
                }
                if let Err(e) = self.runtime.rename(backup, original) {
                    warn!("Failed to restore {:?}: {}", original, e);
                }
            }

            if placement.created_target
                && let Err(e) = self.runtime.remove_dir(&placement.target)
            {
                debug!("Leaving {:?} in place: {}", placement.target, e);
            }

            if placement.recorded {
                match placement.previous {
                    Some(previous) => {
                        ledger.put(previous);
                    }
                    None => {
                        ledger.remove(&placement.package_name);
                    }
                }
            }
        }
    }
}

/// All regular files below `dir`, sorted.
fn collect_files<R: Runtime + ?Sized>(runtime: &R, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in runtime.read_dir(&current)? {
            if runtime.is_dir(&entry) {
                stack.push(entry);
            } else {
                files.push(entry);
            }
        }
    }
    files.sort();
    Ok(files)
}
