// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod hash;
pub mod ingest;
pub mod metrics;
pub mod normalize;
pub mod orchestrator;
pub mod runtime;
pub mod store;

// Comment tracking, epoch scheduling, candidate gathering and selection
pub mod synthesis;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::cluster::{cluster_items, StoryBundle};
pub use crate::config::{load_pipeline_config, PipelineConfig};
pub use crate::orchestrator::{run_pipeline_once, PipelineInputs, StoryWriter, TopicMapping};
pub use crate::runtime::{start_news_runtime, NewsRuntimeConfig, NewsRuntimeHandle, RuntimeObserver};
pub use crate::store::MemoryStore;
pub use crate::synthesis::{EpochContext, SynthesisSink, TopicSynthesisPipeline};
