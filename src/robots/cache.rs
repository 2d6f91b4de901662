//! Robots.txt caching implementation
//!
//! A cache entry remembers when its robots.txt was fetched and expires after
//! the configured TTL.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Largest TTL chrono can represent
const MAX_TTL_SECS: u64 = (i64::MAX / 1000) as u64;

/// Cached robots.txt data for a host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// How long the entry stays fresh
    pub ttl: Duration,
}

impl CachedRobots {
    /// Creates a new entry stamped with the current time
    pub fn new(content: ParsedRobots, ttl_secs: u64) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    /// Checks if the entry is older than its TTL
    pub fn is_stale(&self) -> bool {
        self.age() > self.ttl
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks if a URL is allowed according to the cached robots.txt
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.content.is_allowed(url, user_agent)
    }
}
