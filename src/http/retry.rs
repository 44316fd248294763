//! Retry logic for network operations with response classification.

use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum number of attempts for transient failures.
pub const MAX_RETRIES: usize = 3;

/// Delay before the first retry in milliseconds; doubled on every further attempt.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Wait used when a rate-limited response carries no usable hint.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Longest retry-after we are willing to sleep through before giving up.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(120);

/// Outcome of a failed request, classified by what a retry could achieve.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestError {
    /// Resource not found (HTTP 404)
    NotFound(String),
    /// Quota exhausted (HTTP 429, or 403 with no remaining rate limit)
    RateLimited { url: String, retry_after: Duration },
    /// Authentication failed (HTTP 401)
    AuthenticationFailed(String),
    /// Forbidden access (HTTP 403 that is not a rate limit)
    Forbidden(String),
    /// Other client errors that won't succeed on retry
    ClientError { url: String, status: u16 },
    /// Connection failures, timeouts, 5xx responses and truncated bodies
    Transient(String),
    /// The response body could not be decoded
    Decode(String),
    /// The local sink for a download failed
    Io(String),
}

impl RequestError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RequestError::Transient(_))
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::NotFound(url) => write!(f, "Not found: {}", url),
            RequestError::RateLimited { url, retry_after } => write!(
                f,
                "Rate limit exceeded for {} (retry after {}s). Try again later or set GITHUB_TOKEN environment variable.",
                url,
                retry_after.as_secs()
            ),
            RequestError::AuthenticationFailed(url) => {
                write!(f, "Authentication failed for {}. Check your GITHUB_TOKEN.", url)
            }
            RequestError::Forbidden(url) => {
                write!(f, "Access forbidden: {}. You may need authentication.", url)
            }
            RequestError::ClientError { url, status } => {
                write!(f, "Request error: HTTP {} from {}", status, url)
            }
            RequestError::Transient(msg) => write!(f, "Transient network error: {}", msg),
            RequestError::Decode(msg) => write!(f, "Invalid response body: {}", msg),
            RequestError::Io(msg) => write!(f, "Local I/O error: {}", msg),
        }
    }
}

impl std::error::Error for RequestError {}

/// How often and how patiently a request is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            base_delay: Duration::from_millis(RETRY_DELAY_MS),
            max_rate_limit_wait: MAX_RATE_LIMIT_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Policy without any sleeping, for tests.
    pub fn immediate() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            base_delay: Duration::ZERO,
            max_rate_limit_wait: Duration::from_secs(1),
        }
    }

    /// Exponential backoff: `base`, `2 * base`, `4 * base`, ...
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(2u32.pow(exp))
    }
}

/// Classifies a non-success response. Returns `None` for 2xx/3xx.
pub fn classify_response(url: &str, status: StatusCode, headers: &HeaderMap) -> Option<RequestError> {
    if status.is_success() || status.is_redirection() {
        return None;
    }

    let error = match status {
        StatusCode::UNAUTHORIZED => RequestError::AuthenticationFailed(url.to_string()),
        StatusCode::TOO_MANY_REQUESTS => RequestError::RateLimited {
            url: url.to_string(),
            retry_after: retry_after(headers),
        },
        StatusCode::FORBIDDEN if rate_limit_exhausted(headers) => RequestError::RateLimited {
            url: url.to_string(),
            retry_after: retry_after(headers),
        },
        StatusCode::FORBIDDEN => RequestError::Forbidden(url.to_string()),
        StatusCode::NOT_FOUND => RequestError::NotFound(url.to_string()),
        s if s.is_client_error() => RequestError::ClientError {
            url: url.to_string(),
            status: s.as_u16(),
        },
        // 5xx server errors are retryable
        s => RequestError::Transient(format!("HTTP {} from {}", s.as_u16(), url)),
    };
    Some(error)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    header_u64(headers, "x-ratelimit-remaining") == Some(0) || headers.contains_key("retry-after")
}

/// Reads the wait hint from `Retry-After` (seconds) or `x-ratelimit-reset` (epoch seconds).
fn retry_after(headers: &HeaderMap) -> Duration {
    if let Some(secs) = header_u64(headers, "retry-after") {
        return Duration::from_secs(secs);
    }
    if let Some(reset) = header_u64(headers, "x-ratelimit-reset") {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        return Duration::from_secs(reset.saturating_sub(now));
    }
    DEFAULT_RATE_LIMIT_WAIT
}

/// Executes an async operation with retry logic.
///
/// Transient failures are retried up to `max_attempts` with exponential
/// backoff. A rate-limited response is waited out once (at least the
/// advertised retry-after, provided it fits `max_rate_limit_wait`) and then
/// retried a single time. Everything else fails immediately.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T, RequestError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut attempt = 1;
    let mut waited_for_rate_limit = false;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(RequestError::RateLimited { url, retry_after })
                if !waited_for_rate_limit && retry_after <= policy.max_rate_limit_wait =>
            {
                warn!(
                    "{}: rate limited by {}, waiting {}s before retrying once...",
                    operation_name,
                    url,
                    retry_after.as_secs()
                );
                tokio::time::sleep(retry_after).await;
                waited_for_rate_limit = true;
            }
            Err(RequestError::RateLimited { url, retry_after }) if !waited_for_rate_limit => {
                warn!(
                    "{}: rate limited by {} for {}s, longer than the {}s allowed by --max-rate-limit-wait",
                    operation_name,
                    url,
                    retry_after.as_secs(),
                    policy.max_rate_limit_wait.as_secs()
                );
                return Err(RequestError::RateLimited { url, retry_after });
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                    operation_name,
                    attempt,
                    policy.max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!("{}: giving up: {}", operation_name, e);
                return Err(e);
            }
        }
    }
}
