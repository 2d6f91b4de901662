//! Render selection and headless rendering
//!
//! A static fetch is enough for most pages. Pages whose markup is mostly
//! script (single-page applications, empty framework roots), and challenge
//! pages served with a 200, are handed to a [`Renderer`] that executes the
//! page and returns the materialized DOM.

use crate::config::RendererConfig;
use crate::scrape::FetchOutcome;
use crate::RenderError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use url::Url;

/// Framework roots that are empty until scripts run
const EMPTY_ROOT_MARKERS: &[&str] = &[
    r#"<div id="root"></div>"#,
    r#"<div id="app"></div>"#,
    r#"<div id="__next"></div>"#,
    "<app-root></app-root>",
];

/// Framework fingerprints; they only count on pages with little visible text
const FRAMEWORK_HINTS: &[&str] = &[
    "window.__NEXT_DATA__",
    "window.__NUXT__",
    "ng-app",
    "data-reactroot",
];

/// Below this many visible characters a framework fingerprint means "not populated"
const SPARSE_TEXT_CHARS: usize = 200;

/// Capability to execute a page and return its materialized HTML
///
/// Implementations must stop all work (and release any process or
/// connection) when the returned future is dropped.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        url: &Url,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<FetchOutcome, RenderError>;
}

/// Renderer used when rendering is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn render(
        &self,
        _url: &Url,
        _timeout: Duration,
        _max_bytes: u64,
    ) -> Result<FetchOutcome, RenderError> {
        Err(RenderError::Unavailable)
    }
}

/// Renders by running a headless browser that prints the DOM to stdout
///
/// The default configuration runs
/// `chromium --headless --disable-gpu --no-sandbox --dump-dom --virtual-time-budget=<settle> <url>`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    settle: Duration,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>, settle: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            settle,
        }
    }

    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            Duration::from_millis(config.settle_ms),
        )
    }

    /// Command-line arguments for one render, with placeholders substituted
    fn arguments(&self, url: &Url, settle: Duration) -> Vec<String> {
        let settle_ms = settle.as_millis().to_string();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{settle_ms}", &settle_ms)
                    .replace("{url}", url.as_str())
            })
            .collect();

        if !self.args.iter().any(|arg| arg.contains("{url}")) {
            args.push(url.to_string());
        }
        args
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(
        &self,
        url: &Url,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<FetchOutcome, RenderError> {
        let start = Instant::now();
        let settle = self.settle.min(timeout);

        let mut child = Command::new(&self.program)
            .args(self.arguments(url, settle))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Spawn(format!("{}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RenderError::Spawn("stdout not captured".to_string()))?;

        let work = async {
            let mut body = Vec::new();
            stdout.take(max_bytes.saturating_add(1)).read_to_end(&mut body).await?;
            if body.len() as u64 > max_bytes {
                return Err(RenderError::TooLarge(max_bytes));
            }
            let status = child.wait().await?;
            Ok::<_, RenderError>((body, status))
        };

        // On timeout or error the child is dropped here and killed
        let (body, status) = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result?,
            Err(_) => return Err(RenderError::Timeout(timeout.as_millis() as u64)),
        };

        if !status.success() {
            return Err(RenderError::Failed(status.to_string()));
        }
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(RenderError::EmptyOutput);
        }

        Ok(FetchOutcome {
            status_code: 200,
            final_url: url.clone(),
            body,
            content_type: "text/html; charset=utf-8".to_string(),
            elapsed: start.elapsed(),
        })
    }
}

/// Decides whether a static fetch should be re-done through a renderer
pub fn needs_rendering(outcome: &FetchOutcome, config: &RendererConfig) -> bool {
    if !outcome.is_html() || outcome.body.is_empty() {
        return false;
    }

    let body = String::from_utf8_lossy(&outcome.body);
    let (visible, ratio) = estimate_visible_text(&body);

    if ratio < config.min_text_ratio {
        return true;
    }

    if EMPTY_ROOT_MARKERS.iter().any(|marker| body.contains(marker)) {
        return true;
    }

    if visible < SPARSE_TEXT_CHARS && FRAMEWORK_HINTS.iter().any(|hint| body.contains(hint)) {
        return true;
    }

    let lower = body.to_lowercase();

    if outcome.status_code == 200 && is_block_page(&lower, &config.block_markers) {
        return true;
    }

    if config.min_links > 0 || config.min_images > 0 {
        let links = lower.matches("<a ").count();
        let images = lower.matches("<img").count();
        if links < config.min_links && images < config.min_images {
            return true;
        }
    }

    false
}

/// Whether the lowercased markup contains one of the block-page phrases
fn is_block_page(lower: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .map(|marker| marker.trim().to_lowercase())
        .any(|marker| !marker.is_empty() && lower.contains(&marker))
}

/// Ratio of visible, non-whitespace characters to total markup size
///
/// Characters inside tags and inside `<script>`/`<style>` blocks do not count.
pub fn estimate_text_ratio(html: &str) -> f64 {
    estimate_visible_text(html).1
}

fn estimate_visible_text(html: &str) -> (usize, f64) {
    let total = html.len();
    if total == 0 {
        return (0, 0.0);
    }

    let lower = html.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut visible = 0usize;
    let mut pos = 0usize;

    while pos < bytes.len() {
        if bytes[pos] == b'<' {
            let rest = &lower[pos..];
            let skip_until = if rest.starts_with("<script") {
                Some("</script")
            } else if rest.starts_with("<style") {
                Some("</style")
            } else {
                None
            };

            if let Some(closing) = skip_until {
                match rest.find(closing) {
                    Some(offset) => pos += offset + closing.len(),
                    None => break,
                }
            }

            match lower[pos..].find('>') {
                Some(offset) => pos += offset + 1,
                None => break,
            }
            continue;
        }

        // Count characters, not bytes, but step over whole UTF-8 sequences
        let ch_len = utf8_len(bytes[pos]);
        if !bytes[pos].is_ascii_whitespace() {
            visible += 1;
        }
        pos += ch_len;
    }

    (visible, visible as f64 / total as f64)
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}
