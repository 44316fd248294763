//! Resolve a reference without installing anything.

use super::parse_reference;
use crate::error::PackageError;
use crate::resolver::{InstallPlan, ResolveOptions, Resolver};
use crate::source::ManifestSource;

/// Resolve the full dependency graph of `reference`. Side-effect free.
#[tracing::instrument(skip(source, options))]
pub async fn resolve_tree<S: ManifestSource + ?Sized>(
    source: &S,
    reference: &str,
    git_ref: Option<&str>,
    options: ResolveOptions,
) -> Result<InstallPlan, PackageError> {
    let reference = parse_reference(reference, git_ref)?;
    Resolver::new(source, options).resolve(&reference).await
}
