//! Rate-limited HTTP fetching with transient retries

use crate::{AcquireError, RateLimiter};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A fetched response body
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Requested URL
    pub url: String,
    /// Final URL after redirects
    pub final_url: String,
    /// Declared content type
    pub content_type: Option<String>,
    /// Response body
    pub body: Vec<u8>,
}

/// Largest body [`HttpFetcher::fetch`] accepts unless configured otherwise
pub const DEFAULT_MAX_BODY_BYTES: u64 = 100 * 1024 * 1024;

/// HTTP client that takes one limiter token per network attempt
///
/// Timeouts, connection failures, 5xx and 429 are retried on the same URL
/// up to `retries` times with exponential backoff (`backoff × 2ⁿ`). Every
/// retry takes a fresh token.
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retries: u32,
    backoff: Duration,
    max_body: u64,
    attempts: AtomicU64,
}

enum Attempt {
    Done(reqwest::Response),
    NotFound,
    Retry(String),
    Fail(AcquireError),
}

impl HttpFetcher {
    /// Create a fetcher
    pub fn new(
        limiter: Arc<RateLimiter>,
        timeout: Duration,
        user_agent: &str,
        retries: u32,
        backoff: Duration,
    ) -> Result<Self, AcquireError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| AcquireError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter,
            retries,
            backoff,
            max_body: DEFAULT_MAX_BODY_BYTES,
            attempts: AtomicU64::new(0),
        })
    }

    /// Cap the size of fetched bodies
    pub fn with_max_body(mut self, bytes: u64) -> Self {
        self.max_body = bytes;
        self
    }

    /// Shared rate limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Network attempts made so far, retries included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Fetch a URL; any non-2xx status is an error
    ///
    /// The body is streamed and abandoned once it passes the size cap; a
    /// declared `Content-Length` over the cap is refused before reading.
    pub async fn fetch(&self, url: &str) -> Result<Fetched, AcquireError> {
        let mut response = self
            .send(url, &[], &[])
            .await?
            .ok_or_else(|| AcquireError::Rejected(format!("{} returned 404", url)))?;

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(len) = declared {
            if len > self.max_body {
                return Err(self.too_large(url, len));
            }
        }

        let mut body = Vec::with_capacity(declared.unwrap_or(0) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AcquireError::TransientNetwork(format!("{}: body read failed: {}", url, e)))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_body {
                return Err(self.too_large(url, (body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Fetched {
            url: url.to_string(),
            final_url,
            content_type,
            body,
        })
    }

    fn too_large(&self, url: &str, len: u64) -> AcquireError {
        warn!(url, len, max = self.max_body, "response body over size cap");
        AcquireError::Validation(format!("{}: body exceeds {} bytes", url, self.max_body))
    }

    /// GET a JSON document; `None` on 404
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, AcquireError> {
        self.get_json_with_headers(url, query, &[]).await
    }

    /// GET a JSON document with extra request headers; `None` on 404
    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Option<T>, AcquireError> {
        let Some(response) = self.send(url, query, headers).await? else {
            return Ok(None);
        };
        let value = response
            .json::<T>()
            .await
            .map_err(|e| AcquireError::Validation(format!("{}: invalid JSON: {}", url, e)))?;
        Ok(Some(value))
    }

    async fn send(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Option<reqwest::Response>, AcquireError> {
        let mut retries = 0u32;
        loop {
            self.limiter.acquire(1).await?;
            self.attempts.fetch_add(1, Ordering::Relaxed);

            match self.attempt(url, query, headers).await {
                Attempt::Done(response) => return Ok(Some(response)),
                Attempt::NotFound => return Ok(None),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry(reason) => {
                    if retries >= self.retries {
                        return Err(AcquireError::TransientNetwork(format!("{}: {}", url, reason)));
                    }
                    let delay = self.backoff * 2u32.saturating_pow(retries);
                    retries += 1;
                    warn!(url, reason = %reason, retry = retries, delay_ms = delay.as_millis() as u64, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &str, query: &[(&str, &str)], headers: &[(&str, &str)]) -> Attempt {
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                return Attempt::Retry(e.to_string())
            }
            Err(e) => return Attempt::Fail(AcquireError::Rejected(format!("{}: {}", url, e))),
        };

        let status = response.status();
        debug!(url, status = status.as_u16(), "fetched");
        if status.is_success() {
            Attempt::Done(response)
        } else if status == StatusCode::NOT_FOUND {
            Attempt::NotFound
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Attempt::Retry(format!("HTTP {}", status))
        } else {
            Attempt::Fail(AcquireError::Rejected(format!("{} returned HTTP {}", url, status)))
        }
    }
}
