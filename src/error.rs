//! Error taxonomy shared by the resolver, fetcher and installer.
//!
//! Every failure the core reports to its caller is one of these variants, so
//! callers can branch on the kind instead of parsing messages.

use std::fmt;
use std::time::Duration;

use crate::locator::PackageLocator;

#[derive(Debug, Clone, PartialEq)]
pub enum PackageError {
    /// The input matches neither the `owner/repo[@ref]` grammar nor a usable remote URL
    InvalidReference(String),
    /// The source repository does not exist or is not accessible
    RepositoryNotFound(String),
    /// The repository exists but carries no manifest at the expected path
    ManifestMissing(String),
    /// A manifest was found but failed to parse or validate
    InvalidManifest { package: String, reason: String },
    /// The source API quota is exhausted
    RateLimited {
        source: String,
        retry_after: Duration,
    },
    /// A transient network failure that outlived its retries
    NetworkFailure(String),
    /// The dependency relation loops back onto an ancestor
    CircularDependency { cycle: Vec<String> },
    /// Two requirements for one package cannot be reconciled automatically
    UnresolvedVersionConflict {
        existing: PackageLocator,
        requested: PackageLocator,
    },
    /// The filesystem refused a write; the operation has been rolled back
    InstallWriteFailure { package: String, reason: String },
}

impl PackageError {
    pub fn invalid_manifest(package: impl Into<String>, reason: impl Into<String>) -> Self {
        PackageError::InvalidManifest {
            package: package.into(),
            reason: reason.into(),
        }
    }

    pub fn write_failure(package: impl Into<String>, err: impl fmt::Display) -> Self {
        PackageError::InstallWriteFailure {
            package: package.into(),
            reason: format!("{:#}", err),
        }
    }

    /// Manifest absence is the one soft failure: it degrades a node to a leaf.
    pub fn is_soft(&self) -> bool {
        matches!(self, PackageError::ManifestMissing(_))
    }
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageError::InvalidReference(input) => {
                write!(
                    f,
                    "Invalid package reference '{}'. Expected 'owner/repo[@ref]' or an http(s) URL.",
                    input
                )
            }
            PackageError::RepositoryNotFound(repo) => {
                write!(f, "Repository {} was not found or is not accessible", repo)
            }
            PackageError::ManifestMissing(locator) => {
                write!(f, "{} has no ghpm.json manifest", locator)
            }
            PackageError::InvalidManifest { package, reason } => {
                write!(f, "Invalid manifest for {}: {}", package, reason)
            }
            PackageError::RateLimited {
                source,
                retry_after,
            } => {
                write!(
                    f,
                    "Rate limit exceeded for {}; retry after {}s. Set GITHUB_TOKEN to raise the quota.",
                    source,
                    retry_after.as_secs()
                )
            }
            PackageError::NetworkFailure(msg) => write!(f, "Network failure: {}", msg),
            PackageError::CircularDependency { cycle } => {
                write!(f, "Circular dependency: {}", cycle.join(" -> "))
            }
            PackageError::UnresolvedVersionConflict {
                existing,
                requested,
            } => {
                write!(
                    f,
                    "Version conflict: {} is required, but {} was already selected. Pin one version explicitly.",
                    requested, existing
                )
            }
            PackageError::InstallWriteFailure { package, reason } => {
                write!(f, "Failed to install {}: {}", package, reason)
            }
        }
    }
}

impl std::error::Error for PackageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_display() {
        let err = PackageError::CircularDependency {
            cycle: vec!["o/a".into(), "o/b".into(), "o/a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency: o/a -> o/b -> o/a");
    }

    #[test]
    fn test_rate_limited_display_mentions_token() {
        let err = PackageError::RateLimited {
            source: "api.github.com".into(),
            retry_after: Duration::from_secs(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("30s"));
        assert!(msg.contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_only_manifest_missing_is_soft() {
        assert!(PackageError::ManifestMissing("o/r@main".into()).is_soft());
        assert!(!PackageError::RepositoryNotFound("o/r".into()).is_soft());
        assert!(!PackageError::NetworkFailure("reset".into()).is_soft());
    }

    #[test]
    fn test_write_failure_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("Failed to write file");
        let err = PackageError::write_failure("zlib", err);
        assert!(err.to_string().contains("Failed to write file: disk full"));
    }
}
