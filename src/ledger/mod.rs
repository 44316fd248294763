//! Persistent record of what is installed under an install root.
//!
//! The ledger lives at `<root>/ledger.json` and holds one [`InstallRecord`]
//! per package name. It is rewritten atomically (temp file + rename) so an
//! interrupted save never leaves a truncated ledger behind.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::locator::PackageLocator;
use crate::runtime::Runtime;

pub const LEDGER_FILE: &str = "ledger.json";

/// One installed package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    pub package_name: String,
    pub locator: PackageLocator,
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    /// Paths relative to `install_path`, always with `/` separators
    pub files_written: BTreeSet<String>,
    /// SHA-256 of the downloaded archive, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    #[serde(default)]
    packages: BTreeMap<String, InstallRecord>,
}

impl Ledger {
    pub fn path(install_root: &Path) -> PathBuf {
        install_root.join(LEDGER_FILE)
    }

    pub fn get(&self, package_name: &str) -> Option<&InstallRecord> {
        self.packages.get(package_name)
    }

    /// Insert or supersede the record for its package name.
    pub fn put(&mut self, record: InstallRecord) -> Option<InstallRecord> {
        self.packages.insert(record.package_name.clone(), record)
    }

    pub fn remove(&mut self, package_name: &str) -> Option<InstallRecord> {
        self.packages.remove(package_name)
    }

    /// All records, ordered by package name.
    pub fn records(&self) -> impl Iterator<Item = &InstallRecord> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Load the ledger, treating a missing file as an empty ledger.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            debug!("No ledger at {:?}, starting empty", path);
            return Ok(Ledger::default());
        }
        let content = runtime.read_to_string(path)?;
        let ledger: Ledger = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ledger {:?}", path))?;
        Ok(ledger)
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime + ?Sized>(&self, runtime: &R, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            runtime.create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        runtime.write(&tmp_path, json.as_bytes())?;
        runtime.rename(&tmp_path, path)?;
        debug!("Saved ledger with {} record(s) to {:?}", self.len(), path);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_record(name: &str, locator: &str, root: &Path, files: &[&str]) -> InstallRecord {
    use crate::locator::PackageReference;

    let locator = PackageReference::parse(locator)
        .ok()
        .and_then(|r| r.locator())
        .expect("test locator must be resolved");
    InstallRecord {
        package_name: name.to_string(),
        locator,
        install_path: root.join(name),
        installed_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .expect("valid timestamp")
            .with_timezone(&Utc),
        files_written: files.iter().map(|f| f.to_string()).collect(),
        checksum: Some("ab".repeat(32)),
    }
}
