//! Topic synthesis service: binary entrypoint.
//! Boots the ingestion runtime, the synthesis pipeline and the Axum HTTP
//! server over a shared in-memory store.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use topic_synthesis::api::{create_router, AppState};
use topic_synthesis::config::load_pipeline_config;
use topic_synthesis::ingest::providers::http::HttpFeedFetcher;
use topic_synthesis::metrics::Metrics;
use topic_synthesis::orchestrator::PipelineInputs;
use topic_synthesis::runtime::{now_ms, start_news_runtime, LoggingObserver, NewsRuntimeConfig};
use topic_synthesis::store::MemoryStore;
use topic_synthesis::synthesis::TopicSynthesisPipeline;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_LOG_FILTER: &str =
    "topic_synthesis=info,ingest=info,normalize=info,cluster=info,runtime=info,synthesis=info,warn";
const TIMEOUT_SWEEP_EVERY: Duration = Duration::from_secs(30);

/// `LOG_FORMAT=json` switches to JSON lines; otherwise compact text.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_pipeline_config()?;
    let metrics = Metrics::init()?;
    let store = Arc::new(MemoryStore::default());

    let runtime = start_news_runtime(
        NewsRuntimeConfig {
            inputs: PipelineInputs {
                sources: cfg.sources.clone(),
                topics: cfg.topics.clone(),
                normalize: cfg.normalize,
                cluster: cfg.cluster,
            },
            poll_interval_ms: Some(cfg.runtime.poll_interval_ms),
            run_on_start: cfg.runtime.run_on_start,
            enabled: cfg.runtime_enabled,
            analysis_model: cfg.analysis_model.clone(),
        },
        Arc::new(HttpFeedFetcher::new()?),
        Some(store.clone()),
        Arc::new(LoggingObserver),
    )?;

    let pipeline = Arc::new(Mutex::new(
        TopicSynthesisPipeline::new(
            cfg.synthesis_enabled,
            cfg.synthesis,
            cfg.digest,
            store.clone(),
            Some(store.clone()),
        )
        .context("invalid synthesis config")?,
    ));

    // Close gathering windows that ran past their timeout.
    if cfg.synthesis_enabled {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TIMEOUT_SWEEP_EVERY);
            loop {
                ticker.tick().await;
                let closed = pipeline
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .check_timeouts(now_ms());
                if !closed.is_empty() {
                    tracing::info!(target: "synthesis", closed = closed.len(), "timed-out windows closed");
                }
            }
        });
    }

    let state = AppState {
        pipeline,
        store,
        runtime: Some(runtime.clone()),
    };
    let app = create_router(state).merge(metrics.router());

    let addr: SocketAddr = match std::env::var("BIND_ADDR") {
        Ok(v) => v.parse().with_context(|| format!("invalid BIND_ADDR {v}"))?,
        Err(_) => DEFAULT_BIND_ADDR.parse()?,
    };
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        %addr,
        runtime_enabled = cfg.runtime_enabled,
        synthesis_enabled = cfg.synthesis_enabled,
        sources = cfg.sources.len(),
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            runtime.stop();
        })
        .await
        .context("http server")?;
    Ok(())
}
