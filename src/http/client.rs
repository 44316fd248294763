//! HTTP client with built-in retry logic and error classification.

use log::debug;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::io::Write;

use super::retry::{RequestError, RetryPolicy, classify_response, with_retry};

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    /// Bytes written to the sink
    pub bytes: u64,
    /// Length announced by the server, if any
    pub expected_bytes: Option<u64>,
}

/// HTTP client with built-in retry logic for network operations.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self::with_policy(client, RetryPolicy::default())
    }

    pub fn with_policy(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RequestError> {
        debug!("GET JSON from {}...", url);

        with_retry(&self.policy, "GET JSON", || async {
            let response = self.send(self.client.get(url), url).await?;
            response
                .json::<T>()
                .await
                .map_err(|e| RequestError::Decode(format!("{}: {}", url, e)))
        })
        .await
    }

    /// Performs a GET request with query parameters and an explicit media
    /// type, returning the body as text.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        accept: &str,
    ) -> Result<String, RequestError> {
        debug!("GET {} with query {:?}...", url, query);

        with_retry(&self.policy, "GET text", || async {
            let request = self.client.get(url).query(query).header(ACCEPT, accept);
            let response = self.send(request, url).await?;
            response
                .text()
                .await
                .map_err(|e| RequestError::Transient(format!("{}: {}", url, e)))
        })
        .await
    }

    /// Downloads a URL into the writer produced by `create_writer`.
    ///
    /// A fresh writer is created for every attempt. A body shorter or longer
    /// than the announced `Content-Length` counts as a transient failure.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<Download, RequestError>
    where
        W: Write,
        F: Fn() -> anyhow::Result<W>,
    {
        debug!("Downloading file from {}...", url);

        with_retry(&self.policy, "Download", || {
            self.download_file_once(url, &create_writer)
        })
        .await
    }

    /// Single download attempt without retry.
    async fn download_file_once<W, F>(&self, url: &str, create_writer: &F) -> Result<Download, RequestError>
    where
        W: Write,
        F: Fn() -> anyhow::Result<W>,
    {
        let mut response = self.send(self.client.get(url), url).await?;
        let expected_bytes = response.content_length();

        let mut writer = create_writer().map_err(|e| RequestError::Io(format!("{:#}", e)))?;
        let mut bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RequestError::Transient(format!("{}: {}", url, e)))?
        {
            writer
                .write_all(&chunk)
                .map_err(|e| RequestError::Io(e.to_string()))?;
            bytes += chunk.len() as u64;
        }
        writer.flush().map_err(|e| RequestError::Io(e.to_string()))?;

        if let Some(expected) = expected_bytes {
            if expected != bytes {
                return Err(RequestError::Transient(format!(
                    "{}: received {} of {} bytes",
                    url, bytes, expected
                )));
            }
        }

        debug!("Downloaded {:.2} MB", bytes as f64 / (1024.0 * 1024.0));

        Ok(Download {
            bytes,
            expected_bytes,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Response, RequestError> {
        let response = request
            .send()
            .await
            .map_err(|e| RequestError::Transient(format!("{}: {}", url, e)))?;

        match classify_response(url, response.status(), response.headers()) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }
}
