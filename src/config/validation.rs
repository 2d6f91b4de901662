use crate::config::types::{
    Config, FetcherConfig, PolicyConfig, RendererConfig, ServerConfig, UserAgentConfig,
};
use crate::ConfigError;
use std::net::SocketAddr;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_server_config(&config.server)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_policy_config(&config.policy)?;
    validate_renderer_config(&config.renderer)?;
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    config.listen_addr.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!(
            "listen_addr '{}' is not a socket address: {}",
            config.listen_addr, e
        ))
    })?;
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.robots_agent.is_empty() {
        return Err(ConfigError::Validation(
            "robots_agent cannot be empty".to_string(),
        ));
    }

    // robots.txt product tokens are restricted to letters, digits, '-' and '_'
    if !config
        .robots_agent
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "robots_agent must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.robots_agent
        )));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "timeout_ms must be > 0".to_string(),
        ));
    }

    if config.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "connect_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.max_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_bytes must be >= 1024, got {}",
            config.max_bytes
        )));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    if config.max_retries > 5 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 5, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

fn validate_policy_config(config: &PolicyConfig) -> Result<(), ConfigError> {
    if config.requests_per_minute < 1 {
        return Err(ConfigError::Validation(format!(
            "requests_per_minute must be >= 1, got {}",
            config.requests_per_minute
        )));
    }

    if config.robots_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "robots_timeout_ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_renderer_config(config: &RendererConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.min_text_ratio) {
        return Err(ConfigError::Validation(format!(
            "min_text_ratio must be between 0 and 1, got {}",
            config.min_text_ratio
        )));
    }

    if config.enabled && config.command.trim().is_empty() {
        return Err(ConfigError::Validation(
            "renderer command cannot be empty when rendering is enabled".to_string(),
        ));
    }

    Ok(())
}
