//! URL handling module
//!
//! This module provides target URL validation (the `Validating` stage),
//! host key extraction for per-host policy state, and resolution of
//! `href`/`src` attributes against a page's final URL.

mod domain;
mod resolve;

use crate::{UrlError, UrlResult};
use url::Url;

// Re-export main functions
pub use domain::host_key;
pub use resolve::resolve_reference;

/// Validates a caller-supplied scrape target
///
/// The URL must be absolute, use the `http` or `https` scheme and name a
/// host. Surrounding whitespace is ignored and the fragment is dropped,
/// since it is never sent to the server.
///
/// # Examples
///
/// ```
/// use scrapeflow_engine::url::validate_target_url;
///
/// let url = validate_target_url(" https://example.com/page#top ").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
///
/// assert!(validate_target_url("ftp://example.com/").is_err());
/// assert!(validate_target_url("/relative/path").is_err());
/// ```
pub fn validate_target_url(raw: &str) -> UrlResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut url = Url::parse(raw).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);
    Ok(url)
}
