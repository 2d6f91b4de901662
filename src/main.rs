//! ScrapeFlow main entry point
//!
//! Command-line interface for the ScrapeFlow extraction engine.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scrapeflow_engine::config::{load_config_with_hash, Config};
use scrapeflow_engine::scrape::{Orchestrator, ScrapeRequest};
use scrapeflow_engine::server;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// ScrapeFlow: URL-to-structured-data extraction
///
/// Fetches a page (rendering it headlessly when it is script-built), parses
/// it and returns its title, meta tags, headers, links, images and text,
/// while respecting robots.txt and per-host rate limits.
#[derive(Parser, Debug)]
#[command(name = "scrapeflow")]
#[command(version)]
#[command(about = "URL-to-structured-data extraction service", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve(ConfigArg),

    /// Scrape one URL and print the result as JSON
    Scrape {
        #[command(flatten)]
        config: ConfigArg,

        /// URL to scrape
        url: String,

        /// Allow a headless render pass for script-built pages
        #[arg(long)]
        render: bool,

        /// End-to-end deadline in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Print compact instead of pretty JSON
        #[arg(long)]
        compact: bool,
    },

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Path to TOML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ConfigArg {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve(args) => {
            let config = load(args.config.as_deref())?;
            let orchestrator = Orchestrator::from_config(config)?;
            server::serve(orchestrator).await?;
        }
        Command::Scrape {
            config,
            url,
            render,
            timeout_ms,
            compact,
        } => {
            let config = load(config.config.as_deref())?;
            handle_scrape(config, url, render, timeout_ms, compact).await?;
        }
        Command::CheckConfig { config } => {
            let (config, hash) = load_config_with_hash(&config)
                .with_context(|| format!("Invalid configuration {}", config.display()))?;
            print_config(&config, &hash);
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG`, when set, overrides the verbosity flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let default_filter = if quiet {
        // Only show errors
        "error"
    } else {
        match verbose {
            0 => "scrapeflow_engine=info,warn",
            1 => "scrapeflow_engine=debug,tower_http=debug,info",
            2 => "scrapeflow_engine=trace,debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        tracing::info!("No configuration file given; using defaults");
        return Ok(Config::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

/// Handles the `scrape` command: one request, result on stdout
async fn handle_scrape(
    config: Config,
    url: String,
    render: bool,
    timeout_ms: Option<u64>,
    compact: bool,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;

    let mut options = orchestrator.default_options();
    options.render_js |= render;
    if let Some(timeout_ms) = timeout_ms {
        options.timeout_ms = timeout_ms;
    }

    let result = orchestrator
        .scrape(ScrapeRequest::new(url, options))
        .await
        .map_err(|e| anyhow::anyhow!("{} (HTTP {}, {})", e, e.status_code(), e.stage))?;

    let json = if compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{}", json);

    Ok(())
}

/// Handles the `check-config` command
fn print_config(config: &Config, hash: &str) {
    println!("=== ScrapeFlow Configuration ===\n");
    println!("Hash: {}", hash);

    println!("\nServer:");
    println!("  Listen address: {}", config.server.listen_addr);
    println!("  CORS enabled: {}", config.server.cors_enabled);

    println!("\nUser Agent:");
    println!("  User-Agent: {}", config.user_agent.user_agent);
    println!("  Robots agent: {}", config.user_agent.robots_agent);

    println!("\nFetcher:");
    println!("  Timeout: {}ms", config.fetcher.timeout_ms);
    println!("  Connect timeout: {}ms", config.fetcher.connect_timeout_ms);
    println!("  Max bytes: {}", config.fetcher.max_bytes);
    println!("  Max redirects: {}", config.fetcher.max_redirects);
    println!(
        "  Retries: {} (base delay {}ms)",
        config.fetcher.max_retries, config.fetcher.retry_base_delay_ms
    );

    println!("\nPolicy:");
    println!("  Respect robots.txt: {}", config.policy.respect_robots);
    println!("  Robots cache TTL: {}s", config.policy.robots_ttl_secs);
    println!(
        "  Rate limit: {} requests/minute per host",
        config.policy.requests_per_minute
    );

    println!("\nRenderer:");
    println!("  Enabled: {}", config.renderer.enabled);
    if config.renderer.enabled {
        println!(
            "  Command: {} {}",
            config.renderer.command,
            config.renderer.args.join(" ")
        );
        println!("  Settle window: {}ms", config.renderer.settle_ms);
        println!("  Always render: {}", config.renderer.always);
    }
    println!("  Min text ratio: {}", config.renderer.min_text_ratio);
    println!("  Block markers: {}", config.renderer.block_markers.len());

    println!("\n✓ Configuration is valid");
}
