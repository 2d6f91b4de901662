//! Robots.txt handling module
//!
//! Parses robots.txt with the robotstxt matcher and caches it per host with a TTL.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use crate::scrape::Fetcher;
use crate::FetchError;
use std::time::Duration;
use url::Url;

/// robots.txt content beyond this size is not read
const MAX_ROBOTS_BYTES: u64 = 512 * 1024;

/// Returns the robots.txt location for the origin of `page_url`
pub fn robots_url(page_url: &Url) -> Result<Url, FetchError> {
    page_url
        .join("/robots.txt")
        .map_err(|e| FetchError::Network {
            url: page_url.to_string(),
            message: e.to_string(),
        })
}

/// Fetches robots.txt for the origin of `page_url`
///
/// A 4xx answer means the site publishes no rules and yields an allow-all
/// entry. Every other failure is returned to the caller, which decides how
/// to treat an unreachable robots.txt.
pub async fn fetch_robots(
    fetcher: &Fetcher,
    page_url: &Url,
    timeout: Duration,
) -> Result<ParsedRobots, FetchError> {
    let url = robots_url(page_url)?;

    match fetcher.fetch_single(&url, timeout, MAX_ROBOTS_BYTES).await {
        Ok(outcome) => {
            let content = String::from_utf8_lossy(&outcome.body);
            Ok(ParsedRobots::from_content(&content))
        }
        Err(FetchError::HttpStatus { status, .. }) if (400..500).contains(&status) => {
            tracing::debug!("No robots.txt at {} (HTTP {})", url, status);
            Ok(ParsedRobots::allow_all())
        }
        Err(e) => Err(e),
    }
}
