//! Install use case - resolve a reference and materialize its dependency graph.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use log::{debug, info};

use super::parse_reference;
use crate::cleanup::SharedCleanupContext;
use crate::error::PackageError;
use crate::http::HttpClient;
use crate::install::{Installer, InstallerOptions};
use crate::ledger::Ledger;
use crate::locator::PackageLocator;
use crate::manifest::Manifest;
use crate::resolver::{DEFAULT_CONCURRENCY, ResolveOptions, Resolver, VersionUpgrade};
use crate::runtime::Runtime;
use crate::source::ManifestSource;

/// Options for the install use case
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Install under the user's home instead of the project
    pub global: bool,
    /// Ref overriding any `@ref` in the reference
    pub git_ref: Option<String>,
    /// Replace packages that are already installed
    pub force: bool,
    /// Resolve and install the dependency graph, not just the root
    pub install_dependencies: bool,
    /// Bound on concurrent requests
    pub jobs: usize,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            global: false,
            git_ref: None,
            force: false,
            install_dependencies: true,
            jobs: DEFAULT_CONCURRENCY,
        }
    }
}

/// What an install did.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallReport {
    /// Name of the root package
    pub package_name: String,
    pub locator: PackageLocator,
    /// Files of the root package, relative to its directory
    pub files_written: BTreeSet<String>,
    /// Packages installed by this operation, in install order
    pub installed: Vec<String>,
    /// Packages that were already present
    pub skipped: Vec<String>,
    pub upgrades: Vec<VersionUpgrade>,
}

/// Manifests of installed packages pinned to a tag or commit, read from their
/// install directories. Unreadable ones are left out and fetched instead.
pub fn installed_manifests<R: Runtime + ?Sized>(
    runtime: &R,
    ledger: &Ledger,
) -> HashMap<PackageLocator, Manifest> {
    let mut manifests = HashMap::new();
    for record in ledger.records().filter(|r| r.locator.is_immutable()) {
        match Manifest::load(runtime, &record.install_path) {
            Ok(manifest) => {
                manifests.insert(record.locator.clone(), manifest);
            }
            Err(e) => debug!("No usable manifest for installed {}: {:#}", record.locator, e),
        }
    }
    manifests
}

/// Install use case
pub struct InstallUseCase<'a, R: Runtime + ?Sized, S: ManifestSource + ?Sized> {
    runtime: &'a R,
    source: &'a S,
    http_client: &'a HttpClient,
    install_root: PathBuf,
    cleanup: SharedCleanupContext,
}

impl<'a, R: Runtime + ?Sized, S: ManifestSource + ?Sized> InstallUseCase<'a, R, S> {
    pub fn new(
        runtime: &'a R,
        source: &'a S,
        http_client: &'a HttpClient,
        install_root: PathBuf,
        cleanup: SharedCleanupContext,
    ) -> Self {
        Self {
            runtime,
            source,
            http_client,
            install_root,
            cleanup,
        }
    }

    /// Resolve `reference` and install everything its plan needs. The caller
    /// holds the install root lock.
    #[tracing::instrument(skip(self, options))]
    pub async fn execute(
        &self,
        reference: &str,
        options: &InstallOptions,
    ) -> Result<InstallReport, PackageError> {
        let reference = parse_reference(reference, options.git_ref.as_deref())?;
        println!("   resolving {}", reference);

        let ledger_path = Ledger::path(&self.install_root);
        let mut ledger = Ledger::load(self.runtime, &ledger_path)
            .map_err(|e| PackageError::write_failure("ledger", e))?;

        let resolve_options = ResolveOptions {
            install_dependencies: options.install_dependencies,
            require_root_manifest: false,
            concurrency: options.jobs,
        };
        let plan = Resolver::new(self.source, resolve_options)
            .with_installed(installed_manifests(self.runtime, &ledger))
            .resolve(&reference)
            .await?;
        info!("Install plan has {} package(s)", plan.entries.len());

        let root = plan
            .root_entry()
            .cloned()
            .ok_or_else(|| PackageError::NetworkFailure(format!("Nothing resolved for {}", reference)))?;

        let installer = Installer::new(
            self.runtime,
            self.http_client,
            self.source,
            self.install_root.clone(),
            InstallerOptions {
                force: options.force,
                concurrency: options.jobs,
            },
            self.cleanup.clone(),
        );
        let outcome = installer.install(&plan, &mut ledger).await?;

        let files_written = ledger
            .get(&root.package_name)
            .map(|r| r.files_written.clone())
            .unwrap_or_default();

        Ok(InstallReport {
            package_name: root.package_name,
            locator: root.locator,
            files_written,
            installed: outcome.installed.into_iter().map(|r| r.package_name).collect(),
            skipped: outcome.skipped,
            upgrades: plan.upgrades,
        })
    }
}
