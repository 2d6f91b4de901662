use crate::robots::CachedRobots;
use std::time::{Duration, Instant};

/// Token bucket rate limiter
///
/// Holds up to `capacity` tokens and refills continuously at
/// `refill_per_sec`. Every allowed request takes one token.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket allowing `requests` per minute
    pub fn per_minute(requests: u32, now: Instant) -> Self {
        let capacity = f64::from(requests.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = self.last_refill.max(now);
    }

    /// Takes one token, or returns how long until one is available
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }

    /// Tokens currently available (after refilling up to `now`)
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Tracks everything the policy gate knows about one host
#[derive(Debug, Clone)]
pub struct HostState {
    /// Request budget for this host
    pub bucket: TokenBucket,

    /// Cached robots.txt for this host
    pub robots: Option<CachedRobots>,

    /// Requests let through by the gate
    pub requests_allowed: u64,

    /// Requests refused by the rate limiter
    pub requests_limited: u64,
}

impl HostState {
    /// Creates a new HostState with a full bucket
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            bucket: TokenBucket::per_minute(requests_per_minute, Instant::now()),
            robots: None,
            requests_allowed: 0,
            requests_limited: 0,
        }
    }

    /// Returns the robots.txt entry if it is still fresh
    pub fn fresh_robots(&self) -> Option<&CachedRobots> {
        self.robots.as_ref().filter(|cached| !cached.is_stale())
    }

    /// Applies the rate limit for one request at `now`
    pub fn admit(&mut self, now: Instant) -> Result<(), Duration> {
        match self.bucket.try_acquire(now) {
            Ok(()) => {
                self.requests_allowed += 1;
                Ok(())
            }
            Err(wait) => {
                self.requests_limited += 1;
                Err(wait)
            }
        }
    }
}
