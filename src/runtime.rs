//! # News runtime
//! Periodic ingestion ticks on a tokio interval.
//!
//! Ticks never overlap: a timer firing while a tick is in flight is skipped
//! and the next interval tries again. Every failure inside a tick goes to the
//! observer's `on_error`; nothing here panics or aborts the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::cluster::StoryBundle;
use crate::config::pipeline::DEFAULT_POLL_INTERVAL_MS;
use crate::error::{RuntimeConfigError, TickError};
use crate::ingest::types::FeedFetcher;
use crate::orchestrator::{run_pipeline_once, PipelineInputs, StoryWriter};
use crate::synthesis::types::{ProviderKind, SynthesisProvider};

pub const REMOTE_PROVIDER_ID: &str = "remote-analysis";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("runtime_ticks_total", "Ingestion ticks run, by outcome.");
        describe_counter!(
            "runtime_ticks_skipped_total",
            "Timer firings dropped because a tick was still in flight."
        );
        describe_gauge!("runtime_last_tick_ts", "Unix seconds of the last successful tick.");
    });
}

pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Model request handed to an external candidate producer. Carries no
/// credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRequest {
    pub story_id: String,
    pub provider: SynthesisProvider,
    pub request: AnalysisRequest,
}

pub fn build_remote_request(prompt: String, model: &str) -> AnalysisRequest {
    AnalysisRequest {
        prompt,
        model: model.to_string(),
        max_tokens: DEFAULT_MAX_TOKENS,
        temperature: DEFAULT_TEMPERATURE,
    }
}

pub fn default_prompt(bundle: &StoryBundle) -> String {
    bundle
        .summary_hint
        .clone()
        .unwrap_or_else(|| bundle.headline.clone())
}

/// Hooks into each tick. All methods have no-op defaults.
pub trait RuntimeObserver: Send + Sync {
    fn analysis_prompt(&self, bundle: &StoryBundle) -> String {
        default_prompt(bundle)
    }

    /// Called per bundle, before the bundle is written.
    fn on_candidate_requested(&self, _request: &CandidateRequest) {}

    fn on_error(&self, _error: &TickError) {}
}

/// Observer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl RuntimeObserver for LoggingObserver {
    fn on_error(&self, error: &TickError) {
        tracing::error!(target: "runtime", error = %error, "ingestion tick failed");
    }
}

#[derive(Debug, Clone)]
pub struct NewsRuntimeConfig {
    pub inputs: PipelineInputs,
    /// `None` means the 30 minute default.
    pub poll_interval_ms: Option<i64>,
    pub run_on_start: bool,
    pub enabled: bool,
    pub analysis_model: String,
}

pub fn normalize_poll_interval(ms: Option<i64>) -> Result<Duration, RuntimeConfigError> {
    match ms {
        None => Ok(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS as u64)),
        Some(v) if v <= 0 => Err(RuntimeConfigError::NonPositivePollInterval(v)),
        Some(v) => Ok(Duration::from_millis(v as u64)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed { bundles: usize },
    Skipped,
    Failed,
}

struct RuntimeInner {
    inputs: PipelineInputs,
    analysis_model: String,
    fetcher: Arc<dyn FeedFetcher>,
    writer: Option<Arc<dyn StoryWriter>>,
    observer: Arc<dyn RuntimeObserver>,
    running: AtomicBool,
    in_flight: AtomicBool,
    last_run: Mutex<Option<DateTime<Utc>>>,
    stop: Notify,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RuntimeInner {
    async fn run_tick(&self) -> TickOutcome {
        if !self.running.load(Ordering::Acquire) {
            return TickOutcome::Skipped;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            counter!("runtime_ticks_skipped_total").increment(1);
            tracing::debug!(target: "runtime", "tick still in flight; skipping");
            return TickOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        match self.tick_once().await {
            Ok(bundles) => {
                let now = Utc::now();
                if let Ok(mut last) = self.last_run.lock() {
                    *last = Some(now);
                }
                counter!("runtime_ticks_total", "outcome" => "ok").increment(1);
                gauge!("runtime_last_tick_ts").set(now.timestamp() as f64);
                TickOutcome::Completed { bundles }
            }
            Err(e) => {
                counter!("runtime_ticks_total", "outcome" => "error").increment(1);
                self.observer.on_error(&e);
                TickOutcome::Failed
            }
        }
    }

    async fn tick_once(&self) -> Result<usize, TickError> {
        let writer = self.writer.as_ref().ok_or(TickError::MissingWriteAdapter)?;
        let bundles = run_pipeline_once(&self.inputs, self.fetcher.as_ref(), now_ms()).await;

        for bundle in &bundles {
            let request = build_remote_request(self.observer.analysis_prompt(bundle), &self.analysis_model);
            self.observer.on_candidate_requested(&CandidateRequest {
                story_id: bundle.story_id.clone(),
                provider: SynthesisProvider {
                    provider_id: REMOTE_PROVIDER_ID.to_string(),
                    model_id: request.model.clone(),
                    kind: ProviderKind::Remote,
                },
                request,
            });

            writer
                .write_story_bundle(bundle)
                .await
                .map_err(|reason| TickError::Write {
                    story_id: bundle.story_id.clone(),
                    reason,
                })?;
        }
        Ok(bundles.len())
    }
}

/// Control surface returned by [`start_news_runtime`].
#[derive(Clone)]
pub struct NewsRuntimeHandle {
    inner: Arc<RuntimeInner>,
}

impl NewsRuntimeHandle {
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            self.inner.stop.notify_one();
            tracing::info!(target: "runtime", "news runtime stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.inner.last_run.lock().ok().and_then(|g| *g)
    }

    /// Run one tick now, subject to the same in-flight guard as the timer.
    pub async fn run_tick(&self) -> TickOutcome {
        self.inner.run_tick().await
    }
}

/// Validate the interval, then start the timer loop if enabled.
///
/// A disabled runtime returns an inert handle: not running, never ticks.
/// Must be called from within a tokio runtime when enabled.
pub fn start_news_runtime(
    config: NewsRuntimeConfig,
    fetcher: Arc<dyn FeedFetcher>,
    writer: Option<Arc<dyn StoryWriter>>,
    observer: Arc<dyn RuntimeObserver>,
) -> Result<NewsRuntimeHandle, RuntimeConfigError> {
    let interval = normalize_poll_interval(config.poll_interval_ms)?;
    ensure_metrics_described();

    let inner = Arc::new(RuntimeInner {
        inputs: config.inputs,
        analysis_model: config.analysis_model,
        fetcher,
        writer,
        observer,
        running: AtomicBool::new(config.enabled),
        in_flight: AtomicBool::new(false),
        last_run: Mutex::new(None),
        stop: Notify::new(),
    });
    let handle = NewsRuntimeHandle { inner: inner.clone() };

    if !config.enabled {
        tracing::info!(target: "runtime", "news runtime disabled");
        return Ok(handle);
    }

    tracing::info!(
        target: "runtime",
        interval_ms = interval.as_millis() as u64,
        sources = inner.inputs.sources.len(),
        run_on_start = config.run_on_start,
        "news runtime started"
    );

    let run_on_start = config.run_on_start;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; that first firing is the run-on-start tick
        let mut first = true;
        loop {
            tokio::select! {
                _ = inner.stop.notified() => break,
                _ = ticker.tick() => {
                    if !inner.running.load(Ordering::Acquire) {
                        break;
                    }
                    if std::mem::take(&mut first) && !run_on_start {
                        continue;
                    }
                    let tick_inner = inner.clone();
                    tokio::spawn(async move {
                        tick_inner.run_tick().await;
                    });
                }
            }
        }
    });

    Ok(handle)
}
