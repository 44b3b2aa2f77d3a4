use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CACHE_CONTROL;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::FeedConfig;
use crate::feed::Downloader;
use crate::request::Request;
use crate::storage::ResponseCache;
use crate::util::{validate_feed_url, UrlValidationError};

/// Errors that can occur while downloading a feed.
///
/// These cover the full lifecycle of a fetch: URL checks, network issues,
/// HTTP errors and body limits. A failed fetch never yields a body.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Empty, unparsable, non-HTTP or blocked URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Connect or read timeout elapsed
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body was not valid UTF-8
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
}

impl From<UrlValidationError> for FetchError {
    fn from(e: UrlValidationError) -> Self {
        FetchError::InvalidUrl(e.to_string())
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e)
    }
}

/// Default [`Downloader`] backed by `reqwest`.
///
/// Responses are kept in a [`ResponseCache`] owned by this downloader. A
/// request without `skip_cache` is answered from the cache while the entry is
/// younger than `cache_max_age_secs`; `skip_cache` sends `max-age=0` and always
/// goes to the network, refreshing the cached copy.
pub struct HttpDownloader {
    client: reqwest::Client,
    cache: Option<ResponseCache>,
    max_age_secs: u64,
    max_bytes: usize,
    max_retries: u32,
    retry_base_delay: Duration,
    block_private_hosts: bool,
}

impl HttpDownloader {
    /// Builds a downloader with its own client configured from `config`.
    pub fn new(config: &FeedConfig, cache: Option<ResponseCache>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client, config, cache))
    }

    /// Uses a caller-provided client (custom proxies, TLS roots, ...).
    pub fn with_client(
        client: reqwest::Client,
        config: &FeedConfig,
        cache: Option<ResponseCache>,
    ) -> Self {
        Self {
            client,
            cache,
            max_age_secs: config.cache_max_age_secs,
            max_bytes: config.max_feed_bytes,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            block_private_hosts: config.block_private_hosts,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn cached(&self, url: &str, max_age: u64) -> Option<String> {
        let cache = self.cache.as_ref()?;
        if max_age == 0 {
            return None;
        }
        match cache.get_fresh(url, max_age).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Response cache lookup failed, fetching");
                None
            }
        }
    }

    async fn fetch(&self, url: &str, max_age: u64) -> Result<String, FetchError> {
        let mut retry_count = 0;

        let bytes = loop {
            let response = self
                .client
                .get(url)
                .header(CACHE_CONTROL, format!("public, max-age={max_age}"))
                .send()
                .await
                .map_err(classify)?;

            let status = response.status();

            // EDGE-004: Handle rate limiting and server errors with exponential backoff
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(if status.is_server_error() {
                        FetchError::HttpStatus(status.as_u16())
                    } else {
                        FetchError::RateLimited(self.max_retries)
                    });
                }

                let delay = self.backoff(retry_count);
                tracing::warn!(
                    url = %url,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Retryable HTTP status, backing off"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // 4xx and other non-success statuses fail immediately
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            match read_limited_bytes(response, self.max_bytes).await {
                Ok(bytes) => break bytes,
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    // EDGE-005: Handle incomplete downloads with retry and exponential backoff
                    if retry_count >= self.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }

                    let delay = self.backoff(retry_count);
                    tracing::debug!(
                        url = %url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn execute(&self, request: &Request) -> Result<String, FetchError> {
        if request.url().trim().is_empty() {
            return Err(FetchError::InvalidUrl("empty URL".to_string()));
        }

        let url = self.to_fetch_url(request);
        validate_feed_url(&url, self.block_private_hosts)?;

        let max_age = if request.skip_cache() {
            0
        } else {
            self.max_age_secs
        };

        if let Some(body) = self.cached(&url, max_age).await {
            tracing::debug!(url = %url, "Response retrieved from cache");
            return Ok(body);
        }

        let started = Instant::now();
        tracing::debug!(
            url = %url,
            skip_cache = request.skip_cache(),
            max_age = max_age,
            "Requesting feed"
        );
        let body = self.fetch(&url, max_age).await?;
        tracing::debug!(
            url = %url,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Feed downloaded"
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&url, &body).await {
                tracing::warn!(url = %url, error = %e, "Failed to cache response");
            }
        }

        Ok(body)
    }

    async fn clear_cache(&self) -> bool {
        let Some(cache) = &self.cache else {
            return true;
        };
        match cache.clear().await {
            Ok(removed) => {
                tracing::debug!(removed = removed, "Response cache cleared");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to clear response cache");
                false
            }
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
