//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with a per-request timeout
//! - Error classification (timeout, HTTP status, network)
//! - Retrying failed fetches according to a `RetryPolicy`

use crate::config::UserAgentConfig;
use crate::crawler::retry::RetryPolicy;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;

/// Maximum number of redirects followed per request
const MAX_REDIRECTS: usize = 10;

/// A failed page fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },
}

/// Builds an HTTP client with proper configuration
///
/// The client carries the crawler's descriptive User-Agent on every request.
/// Timeouts are applied per request by [`PageFetcher`], not on the client.
///
/// # Example
///
/// ```no_run
/// use sumi_glean::config::UserAgentConfig;
/// use sumi_glean::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiGlean".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches HTML pages, retrying transient failures
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl PageFetcher {
    /// Creates a fetcher from a client and retry policy
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Fetches a page body, retrying per the policy
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Non-2xx status | Retry, delay = base × attempt |
    /// | Timeout | Retry, delay = timeout base × attempt |
    /// | Connection/transport error | Retry, delay = base × attempt |
    ///
    /// After the last attempt the final error is returned; callers treat
    /// that as a skipped page, never as a job failure.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let mut attempt = 1;

        loop {
            match fetch_once(&self.client, url, timeout).await {
                Ok(body) => return Ok(body),
                Err(e) if self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt, &e);
                    tracing::warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        self.policy.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Giving up on {} after {} attempt(s): {}",
                        url,
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Performs a single GET request and classifies the outcome
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `timeout` - Deadline for the whole request, body included
pub async fn fetch_once(client: &Client, url: &str, timeout: Duration) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(|e| classify_error(url, e))
}

/// Maps a reqwest error onto the fetch error taxonomy
fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = error.status() {
        FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
