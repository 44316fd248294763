use anyhow::Result;
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use std::path::PathBuf;
use std::time::Duration;

use crate::{
    http::{HttpClient, RetryPolicy},
    runtime::Runtime,
    source::{DEFAULT_API_URL, GitHubSource},
};

/// Settings shared by all commands, taken from global CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Explicit install root (`--root` / `GHPM_ROOT`)
    pub install_root: Option<PathBuf>,
    /// GitHub API base URL (`--api-url`)
    pub api_url: Option<String>,
    /// Longest rate-limit wait honored before giving up (`--max-rate-limit-wait`)
    pub max_rate_limit_wait: Option<Duration>,
}

pub struct Config<R: Runtime> {
    pub runtime: R,
    pub http_client: HttpClient,
    pub source: GitHubSource,
    pub install_root: Option<PathBuf>,
}

impl<R: Runtime> Config<R> {
    pub fn new(runtime: R, overrides: ConfigOverrides) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(token) = runtime.env_var("GITHUB_TOKEN")
            && !token.is_empty()
        {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("Using GITHUB_TOKEN for authentication ({} chars)", token.len());
        }

        let client = Client::builder()
            .user_agent(concat!("ghpm/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        let mut policy = RetryPolicy::default();
        if let Some(wait) = overrides.max_rate_limit_wait {
            policy.max_rate_limit_wait = wait;
        }
        let http_client = HttpClient::with_policy(client, policy);
        let api_url = overrides.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let source = GitHubSource::with_api_url(http_client.clone(), api_url);

        Ok(Self {
            runtime,
            http_client,
            source,
            install_root: overrides.install_root,
        })
    }
}
