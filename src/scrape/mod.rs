//! Scrape pipeline
//!
//! This module contains the request lifecycle and every stage it runs:
//! - HTTP fetching with redirects, retries and a streaming size cap
//! - Render selection and pluggable headless rendering
//! - Encoding detection and DOM building
//! - Structured extraction
//! - Orchestration under one end-to-end deadline

mod dom;
mod encoding;
mod extractor;
mod fetcher;
mod orchestrator;
mod renderer;

pub use dom::{parse, Document, Element, Elements, Node};
pub use encoding::{decode_body, detect_encoding};
pub use extractor::extract;
pub use fetcher::{build_http_client, Fetcher, RedirectGuard};
pub use orchestrator::Orchestrator;
pub use renderer::{
    estimate_text_ratio, needs_rendering, CommandRenderer, NoopRenderer, Renderer,
};

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// One scrape request
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    /// Absolute http(s) URL to scrape
    pub url: String,
    pub options: ScrapeOptions,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>, options: ScrapeOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }
}

/// Per-request knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions {
    /// Allow a headless render pass when the static page looks script-built
    pub render_js: bool,

    /// End-to-end deadline for the whole request
    pub timeout_ms: u64,

    /// Cap on the page body size
    pub max_bytes: u64,
}

impl ScrapeOptions {
    /// Options taken from the configured defaults
    pub fn from_config(config: &Config) -> Self {
        Self {
            render_js: config.renderer.enabled,
            timeout_ms: config.fetcher.timeout_ms,
            max_bytes: config.fetcher.max_bytes,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Raw response handed from the fetcher (or renderer) to the parser
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status_code: u16,
    /// URL after redirects; relative references resolve against it
    pub final_url: Url,
    pub body: Vec<u8>,
    pub content_type: String,
    pub elapsed: Duration,
}

impl FetchOutcome {
    pub fn is_html(&self) -> bool {
        let content_type = self.content_type.to_ascii_lowercase();
        content_type.is_empty()
            || content_type.contains("text/html")
            || content_type.contains("application/xhtml")
    }
}

/// A heading element in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// `h1` through `h6`
    pub tag: String,
    pub text: String,
}

/// An anchor with its resolved target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub url: String,
}

/// An image with its resolved source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    pub alt: String,
    #[serde(default)]
    pub title: String,
}

/// Structured data extracted from one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    /// Final URL after redirects
    pub url: String,
    pub title: String,
    pub meta_tags: BTreeMap<String, String>,
    pub headers: Vec<Header>,
    pub links: Vec<Link>,
    pub images: Vec<Image>,
    pub text_content: String,
    pub word_count: usize,
    /// JSON-LD blocks found in the page
    pub schema_data: Vec<serde_json::Value>,
    /// Whether the content came from a render pass
    pub rendered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl ScrapeResult {
    /// Stamps how and when the content was obtained
    pub fn with_provenance(self, rendered: bool, scraped_at: DateTime<Utc>) -> Self {
        Self {
            rendered,
            scraped_at: Some(scraped_at),
            ..self
        }
    }
}
