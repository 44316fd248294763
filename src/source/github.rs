//! GitHub manifest source.

use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::PackageError;
use crate::http::{HttpClient, RequestError};
use crate::locator::{
    GitRef, PackageIdentity, PackageLocator, PackageReference, RepoId, validate_remote_url,
};
use crate::manifest::{MANIFEST_FILE, Manifest};

use super::{ManifestSource, request_error};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Media type that makes the contents endpoint return the raw file.
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// GitHub API response types (internal).
mod api {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct RepoInfo {
        pub default_branch: String,
    }
}

/// Manifest source backed by the GitHub REST API.
pub struct GitHubSource {
    http_client: HttpClient,
    api_url: String,
    default_branches: Mutex<HashMap<PackageIdentity, String>>,
}

impl GitHubSource {
    pub fn new(http_client: HttpClient) -> Self {
        Self::with_api_url(http_client, DEFAULT_API_URL)
    }

    pub fn with_api_url(http_client: HttpClient, api_url: &str) -> Self {
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            default_branches: Mutex::new(HashMap::new()),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn repo_url(&self, repo: &RepoId) -> String {
        format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.repo)
    }

    async fn fetch_repo_info(&self, repo: &RepoId) -> Result<api::RepoInfo, RequestError> {
        let url = self.repo_url(repo);
        debug!("Fetching repo info from {}...", url);
        let info: api::RepoInfo = self.http_client.get_json(&url).await?;

        self.default_branches
            .lock()
            .await
            .insert(repo.identity(), info.default_branch.clone());
        Ok(info)
    }

    #[tracing::instrument(skip(self))]
    async fn default_branch(&self, repo: &RepoId) -> Result<String, PackageError> {
        if let Some(branch) = self.default_branches.lock().await.get(&repo.identity()) {
            debug!("Default branch of {} is cached: {}", repo, branch);
            return Ok(branch.clone());
        }

        let info = self
            .fetch_repo_info(repo)
            .await
            .map_err(|e| request_error(e, &repo.to_string()))?;
        debug!("Default branch of {} is {}", repo, info.default_branch);
        Ok(info.default_branch)
    }

    /// A missing manifest is only "missing" if the repository itself exists.
    async fn classify_missing_manifest(&self, repo: &RepoId, locator: &PackageLocator) -> PackageError {
        match self.fetch_repo_info(repo).await {
            Ok(_) => PackageError::ManifestMissing(locator.to_string()),
            Err(e) => request_error(e, &repo.to_string()),
        }
    }
}

#[async_trait]
impl ManifestSource for GitHubSource {
    async fn resolve(&self, reference: &PackageReference) -> Result<PackageLocator, PackageError> {
        match reference {
            PackageReference::Remote { url } => {
                validate_remote_url(url)?;
                Ok(PackageLocator::Remote { url: url.clone() })
            }
            PackageReference::GitHub {
                repo,
                git_ref: Some(git_ref),
            } => Ok(PackageLocator::github(repo.clone(), git_ref.clone())),
            PackageReference::GitHub { repo, git_ref: None } => {
                let branch = self.default_branch(repo).await?;
                Ok(PackageLocator::github(repo.clone(), GitRef::Branch(branch)))
            }
        }
    }

    #[tracing::instrument(skip(self), fields(locator = %locator))]
    async fn fetch_manifest(&self, locator: &PackageLocator) -> Result<Manifest, PackageError> {
        let (repo, git_ref) = match locator {
            PackageLocator::GitHub { repo, git_ref } => (repo, git_ref),
            PackageLocator::Remote { url } => {
                validate_remote_url(url)?;
                return Err(PackageError::ManifestMissing(url.clone()));
            }
        };

        let url = format!("{}/contents/{}", self.repo_url(repo), MANIFEST_FILE);
        debug!("Fetching manifest for {} from {}...", locator, url);

        match self
            .http_client
            .get_text(&url, &[("ref", git_ref.name())], RAW_MEDIA_TYPE)
            .await
        {
            Ok(body) => Manifest::parse(&locator.to_string(), &body),
            Err(RequestError::NotFound(_)) => Err(self.classify_missing_manifest(repo, locator).await),
            Err(e) => Err(request_error(e, &repo.to_string())),
        }
    }

    fn archive_url(&self, locator: &PackageLocator) -> String {
        match locator {
            PackageLocator::GitHub { repo, git_ref } => {
                format!("{}/tarball/{}", self.repo_url(repo), git_ref.name())
            }
            PackageLocator::Remote { url } => url.clone(),
        }
    }
}
