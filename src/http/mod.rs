//! HTTP client module with retry logic and error handling.

mod client;
mod retry;

pub use client::{Download, HttpClient};
pub use retry::{
    DEFAULT_RATE_LIMIT_WAIT, MAX_RETRIES, RETRY_DELAY_MS, RequestError, RetryPolicy,
    classify_response, with_retry,
};
