//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the engine, including:
//! - Building one pooled HTTP client with a browser-like header set
//! - Manual redirect handling with a hop limit, with cross-host hops
//!   passed to a [`RedirectGuard`]
//! - Streaming the body under a size cap
//! - Retrying transient failures with exponential backoff
//! - A hard deadline over the whole fetch

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::scrape::{FetchOutcome, ScrapeOptions};
use crate::url::host_key;
use crate::FetchError;
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::time::{Duration, Instant};
use url::Url;

/// Builds the shared HTTP client
///
/// The client pools connections per host and is safe to use from any number
/// of concurrent requests. Redirects are not followed by the client; the
/// fetcher follows them itself so it can enforce its own hop limit.
///
/// # Example
///
/// ```no_run
/// use scrapeflow_engine::config::{FetcherConfig, UserAgentConfig};
/// use scrapeflow_engine::scrape::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    config: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );

    Client::builder()
        .user_agent(user_agent.user_agent.clone())
        .default_headers(headers)
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(90))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

/// Approves redirect hops that leave the current host
#[async_trait]
pub trait RedirectGuard: Send + Sync {
    /// Returns `Err(FetchError::Denied { .. })` to stop the redirect chain
    async fn check_hop(&self, target: &Url) -> Result<(), FetchError>;
}

/// Fetches pages over HTTP(S)
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(client: Client, config: FetcherConfig) -> Self {
        Self { client, config }
    }

    /// Builds a fetcher with its own client
    pub fn from_config(
        user_agent: &UserAgentConfig,
        config: &FetcherConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, config)?;
        Ok(Self::new(client, config.clone()))
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetches a URL with retries, under the request's deadline and size cap
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Connection error / reset | Retry with backoff |
    /// | HTTP 502, 503, 504 | Retry with backoff |
    /// | Other HTTP 4xx/5xx | Fail immediately |
    /// | Redirect chain over the limit | Fail immediately |
    /// | Body over `max_bytes` | Fail immediately |
    /// | Cross-host hop refused by the guard | Fail immediately |
    /// | Deadline reached | Fail, in-flight request dropped |
    pub async fn fetch(&self, url: &Url, options: &ScrapeOptions) -> Result<FetchOutcome, FetchError> {
        self.fetch_guarded(url, options, None).await
    }

    /// Like [`Fetcher::fetch`], asking `guard` before each redirect onto another host
    pub async fn fetch_guarded(
        &self,
        url: &Url,
        options: &ScrapeOptions,
        guard: Option<&dyn RedirectGuard>,
    ) -> Result<FetchOutcome, FetchError> {
        let deadline = options.timeout();
        let work = self.fetch_with_retries(url, options.max_bytes, guard);

        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: options.timeout_ms,
            }),
        }
    }

    /// Fetches a URL once (redirects still followed), under a deadline and size cap
    pub async fn fetch_single(
        &self,
        url: &Url,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<FetchOutcome, FetchError> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.fetch_once(url, max_bytes, None)).await {
            Ok(result) => result.map(|outcome| FetchOutcome {
                elapsed: start.elapsed(),
                ..outcome
            }),
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn fetch_with_retries(
        &self,
        url: &Url,
        max_bytes: u64,
        guard: Option<&dyn RedirectGuard>,
    ) -> Result<FetchOutcome, FetchError> {
        let start = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            tracing::debug!("Fetching {} (attempt {})", url, attempt + 1);

            match self.fetch_once(url, max_bytes, guard).await {
                Ok(outcome) => {
                    return Ok(FetchOutcome {
                        elapsed: start.elapsed(),
                        ..outcome
                    });
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "Transient failure fetching {}: {}; retrying in {:?}",
                        url,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Backoff before retry number `attempt + 1`: base, base * 4, base * 16, ...
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 4u64.saturating_pow(attempt);
        Duration::from_millis(self.config.retry_base_delay_ms.saturating_mul(factor))
    }

    /// One attempt: follows redirects, then streams the final body
    async fn fetch_once(
        &self,
        url: &Url,
        max_bytes: u64,
        guard: Option<&dyn RedirectGuard>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut current = url.clone();
        let mut redirects: u32 = 0;

        loop {
            let response = self
                .client
                .get(current.as_str())
                .send()
                .await
                .map_err(|e| network_error(&current, e))?;

            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = redirect_location(&response) {
                    if redirects >= self.config.max_redirects {
                        return Err(FetchError::TooManyRedirects {
                            url: current.to_string(),
                            limit: self.config.max_redirects,
                        });
                    }

                    let next = next_hop(&current, &location)?;
                    if let Some(guard) = guard {
                        if host_key(&next) != host_key(&current) {
                            guard.check_hop(&next).await?;
                        }
                    }
                    tracing::debug!("Redirect {} -> {} ({})", current, next, status.as_u16());
                    redirects += 1;
                    current = next;
                    continue;
                }
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            let body = read_body_capped(response, max_bytes, &current).await?;

            return Ok(FetchOutcome {
                status_code: status.as_u16(),
                final_url: current,
                body,
                content_type,
                elapsed: Duration::ZERO,
            });
        }
    }
}

/// Reads a response body chunk by chunk, aborting once it exceeds `max_bytes`
async fn read_body_capped(
    mut response: Response,
    max_bytes: u64,
    url: &Url,
) -> Result<Vec<u8>, FetchError> {
    let too_large = || FetchError::ResponseTooLarge {
        url: url.to_string(),
        limit: max_bytes,
    };

    if let Some(length) = response.content_length() {
        if length > max_bytes {
            return Err(too_large());
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| network_error(url, e))? {
        if (body.len() + chunk.len()) as u64 > max_bytes {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

fn redirect_location(response: &Response) -> Option<String> {
    // 304 Not Modified carries no Location and is not a hop
    if response.status() == StatusCode::NOT_MODIFIED {
        return None;
    }
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn next_hop(current: &Url, location: &str) -> Result<Url, FetchError> {
    let invalid = || FetchError::InvalidRedirect {
        url: current.to_string(),
        location: location.to_string(),
    };

    let mut next = current.join(location).map_err(|_| invalid())?;
    if next.scheme() != "http" && next.scheme() != "https" {
        return Err(invalid());
    }
    next.set_fragment(None);
    Ok(next)
}

fn network_error(url: &Url, error: reqwest::Error) -> FetchError {
    let message = if error.is_connect() {
        format!("connection failed: {}", error)
    } else if error.is_timeout() {
        format!("connection timed out: {}", error)
    } else {
        error.to_string()
    };

    FetchError::Network {
        url: url.to_string(),
        message,
    }
}
