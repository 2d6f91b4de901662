//! Request orchestration
//!
//! Drives one request through
//! `Validating -> PolicyCheck -> Fetching -> (Rendering) -> Parsing -> Extracting -> Done`.
//! Everything after validation shares a single deadline; when it expires
//! the in-flight stage future is dropped, which closes its sockets and kills
//! any renderer process, and the error names the stage that was running.
//! Redirects onto another host go through the policy gate as well.

use crate::config::{validate, Config};
use crate::policy::PolicyGate;
use crate::scrape::dom::parse;
use crate::scrape::extractor::extract;
use crate::scrape::fetcher::{Fetcher, RedirectGuard};
use crate::scrape::renderer::{needs_rendering, CommandRenderer, NoopRenderer, Renderer};
use crate::scrape::{FetchOutcome, ScrapeOptions, ScrapeRequest, ScrapeResult};
use crate::state::PolicyStore;
use crate::url::{host_key, validate_target_url};
use crate::{ConfigError, ErrorKind, FetchError, ScrapeError, Stage};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;
use url::Url;

/// Time kept back from a render pass so the static fallback can still be parsed
const RENDER_MARGIN: Duration = Duration::from_millis(250);

/// Upper bound on a request deadline
const MAX_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

const STAGES: [Stage; 7] = [
    Stage::Validating,
    Stage::PolicyCheck,
    Stage::Fetching,
    Stage::Rendering,
    Stage::Parsing,
    Stage::Extracting,
    Stage::Done,
];

struct Inner {
    config: Config,
    fetcher: Fetcher,
    gate: PolicyGate,
    store: Arc<PolicyStore>,
    renderer: Arc<dyn Renderer>,
}

/// Runs scrape requests
///
/// Cheap to clone; clones share the HTTP connection pool, the policy store
/// and the renderer. Any number of requests may run concurrently.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Creates an orchestrator over an existing policy store and renderer
    pub fn new(
        config: Config,
        store: Arc<PolicyStore>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, ConfigError> {
        validate(&config)?;

        let fetcher = Fetcher::from_config(&config.user_agent, &config.fetcher)?;
        let gate = PolicyGate::from_config(&config, fetcher.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                gate,
                store,
                renderer,
            }),
        })
    }

    /// Creates an orchestrator with a fresh policy store and the configured renderer
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let store = Arc::new(PolicyStore::new(&config.policy));
        let renderer: Arc<dyn Renderer> = if config.renderer.enabled {
            Arc::new(CommandRenderer::from_config(&config.renderer))
        } else {
            Arc::new(NoopRenderer)
        };
        Self::new(config, store, renderer)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.inner.store
    }

    /// Options used when a request does not carry its own
    pub fn default_options(&self) -> ScrapeOptions {
        ScrapeOptions::from_config(&self.inner.config)
    }

    /// Scrapes one URL
    pub async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeResult, ScrapeError> {
        let span = tracing::info_span!("scrape", url = %request.url);
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: ScrapeRequest) -> Result<ScrapeResult, ScrapeError> {
        let started = Instant::now();
        let url = validate_target_url(&request.url)
            .map_err(|e| ScrapeError::new(Stage::Validating, ErrorKind::InvalidInput, e.to_string()))?;
        let options = request.options;
        validate_options(&options)?;

        let tracker = StageTracker::new(Stage::Validating);
        let deadline = started + options.timeout().min(MAX_DEADLINE);

        let result = match tokio::time::timeout_at(
            deadline,
            self.pipeline(&url, options, deadline, &tracker),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let stage = tracker.get();
                Err(ScrapeError::new(
                    stage,
                    ErrorKind::FetchTimeout,
                    format!(
                        "Request timed out after {}ms while {}",
                        options.timeout_ms, stage
                    ),
                ))
            }
        };

        match &result {
            Ok(scraped) => tracing::info!(
                "Scraped {} ({} words, rendered: {}) in {:?}",
                scraped.url,
                scraped.word_count,
                scraped.rendered,
                started.elapsed()
            ),
            Err(e) => tracing::warn!("Scrape failed at {} ({:?}): {}", e.stage, e.kind, e),
        }

        result
    }

    async fn pipeline(
        &self,
        url: &Url,
        options: ScrapeOptions,
        deadline: Instant,
        tracker: &StageTracker,
    ) -> Result<ScrapeResult, ScrapeError> {
        tracker.set(Stage::PolicyCheck);
        let decision = self.inner.gate.check(url, &self.inner.store).await;
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "Request denied by policy".to_string());
            return Err(
                ScrapeError::new(Stage::PolicyCheck, ErrorKind::PolicyDenied, reason)
                    .with_retry_after(decision.retry_after_ms),
            );
        }

        tracker.set(Stage::Fetching);
        let fetch_options = ScrapeOptions {
            timeout_ms: remaining(deadline).as_millis() as u64,
            ..options
        };
        let hops = HopPolicy::new(&self.inner.gate, &self.inner.store, url);
        let outcome = self
            .inner
            .fetcher
            .fetch_guarded(url, &fetch_options, Some(&hops as &dyn RedirectGuard))
            .await
            .map_err(fetch_failure)?;
        tracing::debug!(
            "Fetched {} ({} bytes, HTTP {}) in {:?}",
            outcome.final_url,
            outcome.body.len(),
            outcome.status_code,
            outcome.elapsed
        );

        let (outcome, rendered) = if self.wants_render(&options, &outcome) {
            tracker.set(Stage::Rendering);
            self.render_or_fallback(outcome, options.max_bytes, deadline)
                .await
        } else {
            (outcome, false)
        };

        tracker.set(Stage::Parsing);
        let FetchOutcome {
            final_url,
            body,
            content_type,
            ..
        } = outcome;
        let document = run_blocking(Stage::Parsing, move || {
            let declared = (!content_type.is_empty()).then_some(content_type.as_str());
            parse(&body, declared)
        })
        .await?
        .map_err(|e| ScrapeError::new(Stage::Parsing, ErrorKind::ParseError, e.to_string()))?;

        tracker.set(Stage::Extracting);
        let result = run_blocking(Stage::Extracting, move || extract(&document, &final_url)).await?;

        tracker.set(Stage::Done);
        Ok(result.with_provenance(rendered, Utc::now()))
    }

    fn wants_render(&self, options: &ScrapeOptions, outcome: &FetchOutcome) -> bool {
        let config = &self.inner.config.renderer;
        options.render_js && outcome.is_html() && (config.always || needs_rendering(outcome, config))
    }

    /// Renders the page, keeping the static outcome when rendering fails
    async fn render_or_fallback(
        &self,
        outcome: FetchOutcome,
        max_bytes: u64,
        deadline: Instant,
    ) -> (FetchOutcome, bool) {
        let budget = remaining(deadline).saturating_sub(RENDER_MARGIN);
        if budget.is_zero() {
            tracing::warn!("No time left to render {}; using static content", outcome.final_url);
            return (outcome, false);
        }

        match self
            .inner
            .renderer
            .render(&outcome.final_url, budget, max_bytes)
            .await
        {
            Ok(rendered) => {
                tracing::debug!(
                    "Rendered {} ({} bytes) in {:?}",
                    rendered.final_url,
                    rendered.body.len(),
                    rendered.elapsed
                );
                (rendered, true)
            }
            Err(e) => {
                tracing::warn!(
                    "Render failed for {}: {}; using static content",
                    outcome.final_url,
                    e
                );
                (outcome, false)
            }
        }
    }
}

fn validate_options(options: &ScrapeOptions) -> Result<(), ScrapeError> {
    let invalid = |message: &str| ScrapeError::new(Stage::Validating, ErrorKind::InvalidInput, message);

    if options.timeout_ms == 0 {
        return Err(invalid("timeoutMs must be greater than 0"));
    }
    if options.max_bytes == 0 {
        return Err(invalid("maxBytes must be greater than 0"));
    }
    Ok(())
}

fn fetch_failure(error: FetchError) -> ScrapeError {
    match error {
        FetchError::Denied {
            reason,
            retry_after_ms,
            ..
        } => ScrapeError::new(Stage::PolicyCheck, ErrorKind::PolicyDenied, reason)
            .with_retry_after(retry_after_ms),
        error => ScrapeError::new(Stage::Fetching, error.kind(), error.to_string()),
    }
}

/// Sends redirect targets on new hosts through the policy gate
///
/// Each host is checked at most once per request, so retried attempts that
/// follow the same chain do not spend the target host's budget again.
struct HopPolicy<'a> {
    gate: &'a PolicyGate,
    store: &'a PolicyStore,
    admitted: tokio::sync::Mutex<HashSet<String>>,
}

impl<'a> HopPolicy<'a> {
    fn new(gate: &'a PolicyGate, store: &'a PolicyStore, origin: &Url) -> Self {
        let admitted = host_key(origin).into_iter().collect();
        Self {
            gate,
            store,
            admitted: tokio::sync::Mutex::new(admitted),
        }
    }
}

#[async_trait]
impl<'a> RedirectGuard for HopPolicy<'a> {
    async fn check_hop(&self, target: &Url) -> Result<(), FetchError> {
        let Some(host) = host_key(target) else {
            return Ok(());
        };

        let mut admitted = self.admitted.lock().await;
        if admitted.contains(&host) {
            return Ok(());
        }

        let decision = self.gate.check(target, self.store).await;
        if !decision.allowed {
            tracing::info!("Redirect to {} refused by policy", target);
            return Err(FetchError::Denied {
                url: target.to_string(),
                reason: decision
                    .reason
                    .unwrap_or_else(|| "Request denied by policy".to_string()),
                retry_after_ms: decision.retry_after_ms,
            });
        }

        admitted.insert(host);
        Ok(())
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Runs CPU-bound work off the async workers
async fn run_blocking<T, F>(stage: Stage, work: F) -> Result<T, ScrapeError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        ScrapeError::new(
            stage,
            ErrorKind::InternalError,
            format!("{} task failed: {}", stage, e),
        )
    })
}

/// Stage currently in progress, readable after the pipeline future is dropped
#[derive(Debug)]
struct StageTracker(AtomicU8);

impl StageTracker {
    fn new(stage: Stage) -> Self {
        Self(AtomicU8::new(stage as u8))
    }

    fn set(&self, stage: Stage) {
        tracing::debug!("Stage -> {}", stage);
        self.0.store(stage as u8, Ordering::Relaxed);
    }

    fn get(&self) -> Stage {
        STAGES
            .get(usize::from(self.0.load(Ordering::Relaxed)))
            .copied()
            .unwrap_or(Stage::Done)
    }
}
