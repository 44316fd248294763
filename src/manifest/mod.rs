//! The `ghpm.json` manifest carried at the root of a package repository.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path};

use crate::error::PackageError;
use crate::install::{LOCK_FILE, STAGING_DIR};
use crate::ledger::LEDGER_FILE;
use crate::locator::PackageReference;
use crate::runtime::Runtime;

/// File name of the manifest, both in repositories and in install directories.
pub const MANIFEST_FILE: &str = "ghpm.json";

/// Check that `name` can be used as a directory directly under the install
/// root without escaping it or clashing with ghpm's own entries there.
pub fn validate_package_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("package name is empty".to_string());
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(format!("'{}' is not a plain directory name", name));
    }
    let reserved = [STAGING_DIR, LOCK_FILE, LEDGER_FILE]
        .iter()
        .any(|entry| name.eq_ignore_ascii_case(entry))
        || name
            .to_ascii_lowercase()
            .strip_suffix(".tmp")
            .is_some_and(|stem| stem == LEDGER_FILE);
    if reserved {
        return Err(format!("'{}' is reserved by ghpm", name));
    }
    Ok(())
}

/// A platform-specific resource shipped by a package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatformResource {
    pub name: String,
    pub platform: String,
}

/// Package metadata declared by the package author.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(rename = "name")]
    pub package_name: String,
    #[serde(rename = "owner", default)]
    pub owner_name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub platform_resources: BTreeSet<PlatformResource>,
}

impl Manifest {
    /// Parse and validate manifest JSON. `package` only labels errors.
    pub fn parse(package: &str, json: &str) -> Result<Self, PackageError> {
        let manifest: Manifest = serde_json::from_str(json)
            .map_err(|e| PackageError::invalid_manifest(package, e.to_string()))?;
        manifest.validate(package)?;
        Ok(manifest)
    }

    fn validate(&self, package: &str) -> Result<(), PackageError> {
        validate_package_name(&self.package_name)
            .map_err(|reason| PackageError::invalid_manifest(package, format!("'name': {}", reason)))?;

        if let Some(include) = &self.include_path {
            let escapes = Path::new(include)
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                return Err(PackageError::invalid_manifest(
                    package,
                    format!("'includePath' must stay inside the package, got '{}'", include),
                ));
            }
        }

        self.dependency_references(package).map(|_| ())
    }

    /// Parse the declared dependency strings, in declared order.
    pub fn dependency_references(&self, package: &str) -> Result<Vec<PackageReference>, PackageError> {
        self.dependencies
            .iter()
            .map(|dep| {
                if dep.trim().is_empty() {
                    return Err(PackageError::invalid_manifest(package, "empty dependency string"));
                }
                PackageReference::parse(dep).map_err(|e| {
                    PackageError::invalid_manifest(package, format!("dependency '{}': {}", dep, e))
                })
            })
            .collect()
    }

    /// Load the manifest copy kept in an install directory.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime + ?Sized>(runtime: &R, dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = runtime.read_to_string(&path)?;
        let manifest = Manifest::parse(&path.display().to_string(), &content)?;
        Ok(manifest)
    }
}
