use scrapeflow_engine::config::Config;
use scrapeflow_engine::scrape::{Orchestrator, ScrapeOptions, ScrapeRequest};
use wiremock::ResponseTemplate;

/// Default configuration with quick retries for tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.fetcher.retry_base_delay_ms = 10;
    config.fetcher.timeout_ms = 5_000;
    config.policy.robots_timeout_ms = 1_000;
    config
}

pub fn orchestrator(config: Config) -> Orchestrator {
    Orchestrator::from_config(config).expect("valid test config")
}

pub fn request(orchestrator: &Orchestrator, url: impl Into<String>) -> ScrapeRequest {
    ScrapeRequest::new(url, orchestrator.default_options())
}

pub fn request_with(url: impl Into<String>, options: ScrapeOptions) -> ScrapeRequest {
    ScrapeRequest::new(url, options)
}

/// 200 response with an HTML body
pub fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into().into_bytes(), "text/html; charset=utf-8")
}

pub fn redirect(location: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("location", location)
}

pub const EXAMPLE_PAGE: &str = r#"<!doctype html>
<html>
  <head>
    <title>Example</title>
    <meta name="description" content="An example page">
  </head>
  <body>
    <h1>Welcome</h1>
    <a href="/about">About</a>
  </body>
</html>"#;
