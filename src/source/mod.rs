//! Manifest sources.
//!
//! A [`ManifestSource`] turns references into locators, fetches the manifest
//! behind a locator and names the archive that holds the package contents.

mod github;

use async_trait::async_trait;

use crate::error::PackageError;
use crate::http::RequestError;
use crate::locator::{PackageLocator, PackageReference};
use crate::manifest::Manifest;

pub use github::{DEFAULT_API_URL, GitHubSource};

/// Where manifests and archives come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Resolve a parsed reference to a locator with a concrete ref, looking
    /// up the default branch when the reference names none.
    async fn resolve(&self, reference: &PackageReference) -> Result<PackageLocator, PackageError>;

    /// Fetch and validate the manifest at the locator's exact ref.
    async fn fetch_manifest(&self, locator: &PackageLocator) -> Result<Manifest, PackageError>;

    /// URL of the archive holding the package contents.
    fn archive_url(&self, locator: &PackageLocator) -> String;
}

/// Map a failed request onto the package error taxonomy. `subject` names the
/// repository or package the request was about.
pub fn request_error(err: RequestError, subject: &str) -> PackageError {
    match err {
        RequestError::NotFound(_)
        | RequestError::Forbidden(_)
        | RequestError::AuthenticationFailed(_) => PackageError::RepositoryNotFound(subject.to_string()),
        RequestError::RateLimited { url, retry_after } => PackageError::RateLimited {
            source: url,
            retry_after,
        },
        RequestError::Io(msg) => PackageError::write_failure(subject, msg),
        other => PackageError::NetworkFailure(other.to_string()),
    }
}
