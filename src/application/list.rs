//! List action - reads installed packages from the ledger.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::ledger::Ledger;
use crate::runtime::Runtime;

/// Information about an installed package
#[derive(Debug, Clone, PartialEq)]
pub struct PackageInfo {
    pub name: String,
    /// `owner/repo@ref` or the remote URL
    pub locator: String,
    pub installed_at: DateTime<Utc>,
    pub files: usize,
}

/// List action - queries installed packages
pub struct ListAction<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    install_root: PathBuf,
}

impl<'a, R: Runtime + ?Sized> ListAction<'a, R> {
    pub fn new(runtime: &'a R, install_root: PathBuf) -> Self {
        Self {
            runtime,
            install_root,
        }
    }

    /// All installed packages, ordered by name
    pub fn list_packages(&self) -> Result<Vec<PackageInfo>> {
        let ledger = Ledger::load(self.runtime, &Ledger::path(&self.install_root))?;
        Ok(ledger
            .records()
            .map(|record| PackageInfo {
                name: record.package_name.clone(),
                locator: record.locator.to_string(),
                installed_at: record.installed_at,
                files: record.files_written.len(),
            })
            .collect())
    }
}
