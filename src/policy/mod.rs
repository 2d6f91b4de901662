//! Policy gate
//!
//! Decides whether a request may go out before the fetcher sees it:
//! robots.txt rules first, then the per-host rate limit. A request denied by
//! robots.txt does not spend a rate-limit token.
//!
//! An unreachable robots.txt (network error, timeout, 5xx) is treated as
//! allow-all and cached like a real answer, so an outage on the target site's
//! robots endpoint neither blocks scraping nor triggers a refetch per request.

use crate::config::{Config, PolicyConfig};
use crate::robots::{fetch_robots, CachedRobots, ParsedRobots};
use crate::scrape::Fetcher;
use crate::state::PolicyStore;
use crate::url::host_key;
use std::time::{Duration, Instant};
use url::Url;

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,

    /// Why the request was denied
    pub reason: Option<String>,

    /// When a rate-limited caller may try again
    pub retry_after_ms: Option<u64>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after_ms: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            retry_after_ms: None,
        }
    }

    pub fn rate_limited(wait: Duration) -> Self {
        Self {
            allowed: false,
            reason: Some("Rate limit exceeded for host".to_string()),
            retry_after_ms: Some(ceil_millis(wait)),
        }
    }
}

/// Applies robots.txt and rate-limit policy
#[derive(Debug, Clone)]
pub struct PolicyGate {
    config: PolicyConfig,
    robots_agent: String,
    fetcher: Fetcher,
}

impl PolicyGate {
    /// `fetcher` is used for robots.txt requests only
    pub fn new(config: PolicyConfig, robots_agent: impl Into<String>, fetcher: Fetcher) -> Self {
        Self {
            config,
            robots_agent: robots_agent.into(),
            fetcher,
        }
    }

    pub fn from_config(config: &Config, fetcher: Fetcher) -> Self {
        Self::new(
            config.policy.clone(),
            config.user_agent.robots_agent.clone(),
            fetcher,
        )
    }

    /// Checks `url` against robots.txt and the host's request budget
    ///
    /// Only this host's state is locked; checks for other hosts proceed
    /// concurrently.
    pub async fn check(&self, url: &Url, store: &PolicyStore) -> PolicyDecision {
        let Some(host) = host_key(url) else {
            return PolicyDecision::deny("URL has no host");
        };

        let handle = store.host(&host);
        let mut state = handle.lock().await;

        if self.config.respect_robots {
            if state.fresh_robots().is_none() {
                let robots = self.load_robots(url, &host).await;
                state.robots = Some(CachedRobots::new(robots, self.config.robots_ttl_secs));
            }

            let allowed = state
                .robots
                .as_ref()
                .map_or(true, |cached| cached.is_allowed(url.as_str(), &self.robots_agent));
            if !allowed {
                tracing::info!("Blocked by robots.txt: {} (agent {})", url, self.robots_agent);
                return PolicyDecision::deny(format!(
                    "Disallowed by robots.txt for {}",
                    self.robots_agent
                ));
            }
        }

        match state.admit(Instant::now()) {
            Ok(()) => {
                tracing::debug!(
                    "Admitted request to {} ({} allowed so far)",
                    host,
                    state.requests_allowed
                );
                PolicyDecision::allow()
            }
            Err(wait) => {
                tracing::info!(
                    "Rate limit reached for {} ({} allowed, {} limited); retry in {:?}",
                    host,
                    state.requests_allowed,
                    state.requests_limited,
                    wait
                );
                PolicyDecision::rate_limited(wait)
            }
        }
    }

    async fn load_robots(&self, url: &Url, host: &str) -> ParsedRobots {
        let timeout = Duration::from_millis(self.config.robots_timeout_ms);
        match fetch_robots(&self.fetcher, url, timeout).await {
            Ok(robots) => {
                tracing::debug!("Fetched robots.txt for {}", host);
                robots
            }
            Err(e) => {
                tracing::debug!("robots.txt unavailable for {} ({}); allowing all", host, e);
                ParsedRobots::allow_all()
            }
        }
    }
}

fn ceil_millis(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    let millis = nanos / 1_000_000 + u128::from(nanos % 1_000_000 != 0);
    u64::try_from(millis).unwrap_or(u64::MAX)
}
