//! Configuration module for the ScrapeFlow engine
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use scrapeflow_engine::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scrapeflow.toml")).unwrap();
//! println!("Listening on {}", config.server.listen_addr);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FetcherConfig, PolicyConfig, RendererConfig, ServerConfig, UserAgentConfig,
    DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
