//! Uninstall action - removes a package's recorded files and its ledger entry.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Result, bail};
use log::{debug, warn};

use crate::ledger::{InstallRecord, Ledger};
use crate::locator::PackageLocator;
use crate::manifest::Manifest;
use crate::runtime::{Runtime, is_path_under};

#[derive(Debug, Clone, PartialEq)]
pub struct UninstallReport {
    pub package_name: String,
    pub locator: PackageLocator,
    pub removed_files: usize,
    /// Installed packages whose manifest still depends on the removed one
    pub dependents: Vec<String>,
}

pub struct UninstallAction<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    install_root: PathBuf,
}

impl<'a, R: Runtime + ?Sized> UninstallAction<'a, R> {
    pub fn new(runtime: &'a R, install_root: PathBuf) -> Self {
        Self {
            runtime,
            install_root,
        }
    }

    /// The record for `package_name`, if installed
    pub fn find(&self, package_name: &str) -> Result<Option<InstallRecord>> {
        let ledger = Ledger::load(self.runtime, &Ledger::path(&self.install_root))?;
        Ok(ledger.get(package_name).cloned())
    }

    /// Installed packages that declare a dependency on `record`.
    pub fn dependents(&self, ledger: &Ledger, record: &InstallRecord) -> Vec<String> {
        let identity = record.locator.identity();
        ledger
            .records()
            .filter(|other| other.package_name != record.package_name)
            .filter(|other| {
                Manifest::load(self.runtime, &other.install_path)
                    .ok()
                    .and_then(|m| m.dependency_references(&other.package_name).ok())
                    .is_some_and(|deps| deps.iter().any(|d| d.identity() == identity))
            })
            .map(|other| other.package_name.clone())
            .collect()
    }

    /// Remove the files the ledger recorded for `package_name`. Files the
    /// package directory holds beyond those are left alone.
    #[tracing::instrument(skip(self))]
    pub fn uninstall(&self, package_name: &str) -> Result<UninstallReport> {
        let ledger_path = Ledger::path(&self.install_root);
        let mut ledger = Ledger::load(self.runtime, &ledger_path)?;
        let Some(record) = ledger.get(package_name).cloned() else {
            bail!("Package {} is not installed in {:?}", package_name, self.install_root);
        };

        let dependents = self.dependents(&ledger, &record);
        if !dependents.is_empty() {
            warn!(
                "{} is still required by: {}",
                package_name,
                dependents.join(", ")
            );
        }

        let target = &record.install_path;
        let mut removed_files = 0;
        let mut dirs = BTreeSet::new();
        for relative in &record.files_written {
            let path = target.join(relative);
            if !is_path_under(&path, target) {
                warn!("Ignoring recorded file outside the package: {}", relative);
                continue;
            }
            if self.runtime.exists(&path) {
                self.runtime.remove_file(&path)?;
                removed_files += 1;
            }
            let mut parent = path.parent();
            while let Some(dir) = parent {
                if dir == target.as_path() || !is_path_under(dir, target) {
                    break;
                }
                dirs.insert(dir.to_path_buf());
                parent = dir.parent();
            }
        }

        let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in dirs.iter().chain(std::iter::once(target)) {
            if self.runtime.exists(dir) && self.runtime.read_dir(dir)?.is_empty() {
                self.runtime.remove_dir(dir)?;
            } else {
                debug!("Keeping non-empty {:?}", dir);
            }
        }

        ledger.remove(package_name);
        ledger.save(self.runtime, &ledger_path)?;

        Ok(UninstallReport {
            package_name: record.package_name,
            locator: record.locator,
            removed_files,
            dependents,
        })
    }
}
