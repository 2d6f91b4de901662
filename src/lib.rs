//! ScrapeFlow engine: URL-to-structured-data extraction
//!
//! This crate fetches a single third-party page, parses it defensively and
//! extracts structured signals (title, meta tags, headers, links, images,
//! visible text), while respecting robots.txt and per-host rate limits.

pub mod config;
pub mod policy;
pub mod robots;
pub mod scrape;
pub mod server;
pub mod state;
pub mod url;

use std::fmt;
use thiserror::Error;

/// Pipeline stage a request is in (or failed in)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validating,
    PolicyCheck,
    Fetching,
    Rendering,
    Parsing,
    Extracting,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::PolicyCheck => "policy-check",
            Self::Fetching => "fetching",
            Self::Rendering => "rendering",
            Self::Parsing => "parsing",
            Self::Extracting => "extracting",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of failure, independent of the stage that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    PolicyDenied,
    FetchTimeout,
    FetchNetworkError,
    TooManyRedirects,
    ResponseTooLarge,
    /// Recovered locally by falling back to the static fetch; never surfaced by the orchestrator
    RenderFailed,
    ParseError,
    InternalError,
}

impl ErrorKind {
    /// HTTP status returned to the caller for this kind of failure
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::PolicyDenied => 403,
            Self::FetchTimeout => 504,
            Self::FetchNetworkError | Self::TooManyRedirects | Self::ResponseTooLarge => 502,
            Self::RenderFailed | Self::ParseError | Self::InternalError => 500,
        }
    }
}

/// Error returned by the orchestrator for a failed scrape request
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScrapeError {
    /// Stage in which the request failed
    pub stage: Stage,

    /// What went wrong
    pub kind: ErrorKind,

    /// Short, human-readable message
    pub message: String,

    /// When the caller may retry (rate limiting only)
    pub retry_after_ms: Option<u64>,
}

impl ScrapeError {
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after_ms: Option<u64>) -> Self {
        self.retry_after_ms = retry_after_ms;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Invalid URL format: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingDomain,

    #[error("URL is required")]
    Empty,
}

/// Errors produced by the fetcher
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Too many redirects (limit {limit}), last attempted {url}")]
    TooManyRedirects { url: String, limit: u32 },

    #[error("Response from {url} exceeds {limit} bytes")]
    ResponseTooLarge { url: String, limit: u64 },

    #[error("Upstream {url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid redirect from {url} to {location}")]
    InvalidRedirect { url: String, location: String },

    #[error("Redirect to {url} denied: {reason}")]
    Denied {
        url: String,
        reason: String,
        retry_after_ms: Option<u64>,
    },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::FetchTimeout,
            Self::TooManyRedirects { .. } => ErrorKind::TooManyRedirects,
            Self::ResponseTooLarge { .. } => ErrorKind::ResponseTooLarge,
            Self::Denied { .. } => ErrorKind::PolicyDenied,
            Self::Network { .. } | Self::HttpStatus { .. } | Self::InvalidRedirect { .. } => {
                ErrorKind::FetchNetworkError
            }
        }
    }

    /// Whether the fetcher may retry after this error
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }
}

/// Errors produced by a render pass
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering is not available")]
    Unavailable,

    #[error("Failed to start renderer: {0}")]
    Spawn(String),

    #[error("Renderer timed out after {0}ms")]
    Timeout(u64),

    #[error("Renderer exited with {0}")]
    Failed(String),

    #[error("Renderer output exceeds {0} bytes")]
    TooLarge(u64),

    #[error("Renderer produced no output")]
    EmptyOutput,

    #[error("Renderer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while building the document tree
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Response body is not text")]
    Binary,
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use policy::{PolicyDecision, PolicyGate};
pub use scrape::{Orchestrator, ScrapeOptions, ScrapeRequest, ScrapeResult};
pub use state::PolicyStore;
