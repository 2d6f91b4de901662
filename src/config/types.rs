use serde::Deserialize;

/// Browser-like User-Agent sent with every page request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure for the ScrapeFlow engine
///
/// Every section is optional; a missing section takes its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub fetcher: FetcherConfig,
    pub policy: PolicyConfig,
    pub renderer: RendererConfig,
}

/// HTTP service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Address the `/api/scrape` service binds to
    pub listen_addr: String,

    /// Whether to answer cross-origin requests
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5000".to_string(),
            cors_enabled: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Full User-Agent header value for page and robots.txt requests
    pub user_agent: String,

    /// Product token matched against robots.txt `User-agent` groups
    pub robots_agent: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            robots_agent: "ScrapeFlowBot".to_string(),
        }
    }
}

/// Fetcher behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// Default end-to-end deadline for one scrape (milliseconds)
    pub timeout_ms: u64,

    /// Connect timeout for a single connection attempt (milliseconds)
    pub connect_timeout_ms: u64,

    /// Default cap on the response body size
    pub max_bytes: u64,

    /// Maximum number of redirects followed before failing
    pub max_redirects: u32,

    /// Additional attempts after a transient failure
    pub max_retries: u32,

    /// First backoff delay; each retry waits four times longer (milliseconds)
    pub retry_base_delay_ms: u64,

    /// Idle pooled connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 20_000,
            connect_timeout_ms: 10_000,
            max_bytes: 10 * 1024 * 1024,
            max_redirects: 5,
            max_retries: 2,
            retry_base_delay_ms: 200,
            pool_max_idle_per_host: 8,
        }
    }
}

/// Crawling etiquette configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolicyConfig {
    /// Whether robots.txt is consulted before fetching
    pub respect_robots: bool,

    /// How long a fetched robots.txt stays cached (seconds)
    pub robots_ttl_secs: u64,

    /// Deadline for fetching robots.txt (milliseconds)
    pub robots_timeout_ms: u64,

    /// Token bucket capacity and refill rate per host
    pub requests_per_minute: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            respect_robots: true,
            robots_ttl_secs: 3600,
            robots_timeout_ms: 5_000,
            requests_per_minute: 30,
        }
    }
}

/// Headless rendering configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RendererConfig {
    /// Default for `renderJs` when the request does not say
    pub enabled: bool,

    /// Render every page instead of asking the selector
    pub always: bool,

    /// Headless browser executable
    pub command: String,

    /// Arguments; `{url}` and `{settle_ms}` are substituted
    pub args: Vec<String>,

    /// Settle window after load (milliseconds)
    pub settle_ms: u64,

    /// Visible-text ratio below which a page is rendered
    pub min_text_ratio: f64,

    /// Pages with fewer anchors than this (and fewer images than `min_images`) are rendered; 0 disables
    pub min_links: usize,

    /// See `min_links`
    pub min_images: usize,

    /// Phrases (matched case-insensitively) that mark a challenge or block
    /// page served with a 200; such pages are rendered. Empty disables
    pub block_markers: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            always: false,
            command: "chromium".to_string(),
            args: vec![
                "--headless".to_string(),
                "--disable-gpu".to_string(),
                "--no-sandbox".to_string(),
                "--dump-dom".to_string(),
                "--virtual-time-budget={settle_ms}".to_string(),
                "{url}".to_string(),
            ],
            settle_ms: 2_000,
            min_text_ratio: 0.10,
            min_links: 0,
            min_images: 0,
            block_markers: [
                "captcha",
                "robot check",
                "security check",
                "access denied",
                "automated access",
                "please verify you are a human",
            ]
            .iter()
            .map(|marker| marker.to_string())
            .collect(),
        }
    }
}
