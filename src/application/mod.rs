//! Application layer - use cases that coordinate resolver, installer and ledger.
//!
//! This layer contains the application-specific rules and orchestrates the
//! flow of data between the CLI layer and the core components.

mod install;
mod list;
mod tree;
mod uninstall;

pub use install::{InstallOptions, InstallReport, InstallUseCase, installed_manifests};
pub use list::{ListAction, PackageInfo};
pub use tree::resolve_tree;
pub use uninstall::{UninstallAction, UninstallReport};

use crate::error::PackageError;
use crate::locator::PackageReference;

/// Parse a reference, applying an explicit `--ref` override if given.
pub fn parse_reference(input: &str, git_ref: Option<&str>) -> Result<PackageReference, PackageError> {
    let reference = PackageReference::parse(input)?;
    match git_ref {
        Some(token) => reference.with_ref(token),
        None => Ok(reference),
    }
}
