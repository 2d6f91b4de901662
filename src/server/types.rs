//! Wire types for the HTTP API

use crate::scrape::ScrapeOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/scrape`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeBody {
    pub url: Option<String>,
    #[serde(default)]
    pub options: Option<OptionsPatch>,
}

/// Per-request overrides; absent fields keep the configured defaults
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsPatch {
    pub render_js: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl OptionsPatch {
    pub fn apply(self, defaults: ScrapeOptions) -> ScrapeOptions {
        ScrapeOptions {
            render_js: self.render_js.unwrap_or(defaults.render_js),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            max_bytes: self.max_bytes.unwrap_or(defaults.max_bytes),
        }
    }
}

/// Error body returned with every non-2xx status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retry_after_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
