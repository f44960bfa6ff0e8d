// src/config/pipeline.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};

use crate::cluster::ClusterOptions;
use crate::ingest::config::sanitize_sources;
use crate::ingest::types::FeedSource;
use crate::normalize::NormalizeOptions;
use crate::orchestrator::TopicMapping;
use crate::synthesis::types::{DigestConfig, SynthesisConfig};

pub const DEFAULT_PIPELINE_CONFIG_TOML: &str = "config/pipeline.toml";
pub const DEFAULT_PIPELINE_CONFIG_JSON: &str = "config/pipeline.json";
pub const DEFAULT_POLL_INTERVAL_MS: i64 = 30 * 60 * 1000;
pub const DEFAULT_ANALYSIS_MODEL: &str = "gpt-4o-mini";

pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_NEWS_RUNTIME_ENABLED: &str = "NEWS_RUNTIME_ENABLED";
pub const ENV_TOPIC_SYNTHESIS_ENABLED: &str = "TOPIC_SYNTHESIS_ENABLED";
pub const ENV_NEWS_POLL_INTERVAL_MS: &str = "NEWS_POLL_INTERVAL_MS";
pub const ENV_ANALYSIS_MODEL: &str = "ANALYSIS_MODEL";

/// Env-style flag. Unset or blank is off; `0`, `false`, `off`, `no` are
/// off; anything else is on.
pub fn is_truthy_flag(raw: Option<&str>) -> bool {
    let Some(v) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };
    !matches!(
        v.to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}

// parse optional integer env; garbage is ignored so the file value stands
fn parse_interval_env(raw: Option<String>) -> Option<i64> {
    let raw = raw?;
    match raw.trim().parse::<i64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(target: "runtime", value = %raw, "ignoring non-integer NEWS_POLL_INTERVAL_MS");
            None
        }
    }
}

fn default_poll_interval() -> i64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_true() -> bool {
    true
}
fn default_model() -> String {
    DEFAULT_ANALYSIS_MODEL.to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RuntimeSection {
    /// Signed so a misconfigured value reaches runtime validation intact.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: i64,
    #[serde(default = "default_true")]
    pub run_on_start: bool,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            run_on_start: true,
        }
    }
}

/// On-disk shape. Every section is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineFileConfig {
    /// Kept untyped so one bad entry does not fail the whole file.
    #[serde(default)]
    pub feed_sources: Vec<serde_json::Value>,
    #[serde(default)]
    pub topics: TopicMapping,
    #[serde(default)]
    pub normalize: NormalizeOptions,
    #[serde(default)]
    pub cluster: ClusterOptions,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default = "default_model")]
    pub analysis_model: String,
}

impl Default for PipelineFileConfig {
    fn default() -> Self {
        Self {
            feed_sources: Vec::new(),
            topics: TopicMapping::default(),
            normalize: NormalizeOptions::default(),
            cluster: ClusterOptions::default(),
            synthesis: SynthesisConfig::default(),
            digest: DigestConfig::default(),
            runtime: RuntimeSection::default(),
            analysis_model: default_model(),
        }
    }
}

impl PipelineFileConfig {
    /// Parse by extension hint: `json` is JSON, anything else TOML.
    pub fn from_str_with_hint(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext.eq_ignore_ascii_case("json") {
            serde_json::from_str(s).context("parsing pipeline config json")
        } else {
            toml::from_str(s).context("parsing pipeline config toml")
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config at {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Self::from_str_with_hint(&content, ext)
    }
}

/// Resolved settings the binary runs with.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sources: Vec<FeedSource>,
    pub topics: TopicMapping,
    pub normalize: NormalizeOptions,
    pub cluster: ClusterOptions,
    pub synthesis: SynthesisConfig,
    pub digest: DigestConfig,
    pub runtime: RuntimeSection,
    pub runtime_enabled: bool,
    pub synthesis_enabled: bool,
    pub analysis_model: String,
}

impl From<PipelineFileConfig> for PipelineConfig {
    fn from(file: PipelineFileConfig) -> Self {
        Self {
            sources: sanitize_sources(file.feed_sources),
            topics: file.topics,
            normalize: file.normalize,
            cluster: file.cluster,
            synthesis: file.synthesis,
            digest: file.digest,
            runtime: file.runtime,
            runtime_enabled: false,
            synthesis_enabled: false,
            analysis_model: file.analysis_model,
        }
    }
}

impl PipelineConfig {
    /// Overlay the enable flags, poll interval and model from the environment.
    pub fn apply_env(&mut self) {
        self.runtime_enabled = is_truthy_flag(std::env::var(ENV_NEWS_RUNTIME_ENABLED).ok().as_deref());
        self.synthesis_enabled =
            is_truthy_flag(std::env::var(ENV_TOPIC_SYNTHESIS_ENABLED).ok().as_deref());

        if let Some(ms) = parse_interval_env(std::env::var(ENV_NEWS_POLL_INTERVAL_MS).ok()) {
            self.runtime.poll_interval_ms = ms;
        }
        if let Some(model) = std::env::var(ENV_ANALYSIS_MODEL)
            .ok()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
        {
            self.analysis_model = model;
        }
    }
}

/// `$PIPELINE_CONFIG_PATH`, then `config/pipeline.toml`, then
/// `config/pipeline.json`. `None` means run on defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    [DEFAULT_PIPELINE_CONFIG_TOML, DEFAULT_PIPELINE_CONFIG_JSON]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Load file config (or defaults) and apply env overrides.
///
/// An explicit `$PIPELINE_CONFIG_PATH` that cannot be read is an error.
pub fn load_pipeline_config() -> Result<PipelineConfig> {
    let file = match resolve_config_path() {
        Some(path) => {
            tracing::info!(target: "runtime", path = %path.display(), "loading pipeline config");
            PipelineFileConfig::load_from_file(&path)?
        }
        None => {
            tracing::info!(target: "runtime", "no pipeline config found; using defaults");
            PipelineFileConfig::default()
        }
    };
    let mut cfg = PipelineConfig::from(file);
    cfg.apply_env();
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
        analysis_model = "local-small"

        [topics]
        default_topic_id = "topic-news"
        [topics.source_topics]
        bbc = "topic-world"

        [synthesis]
        quorum_size = 2

        [runtime]
        poll_interval_ms = 60000

        [[feed_sources]]
        id = "bbc"
        name = "BBC"
        feed_url = "https://feeds.bbci.co.uk/news/rss.xml"
        enabled = true

        [[feed_sources]]
        id = "broken"
        name = "Broken"
        feed_url = "ftp://nope"
        enabled = true
    "#;

    #[test]
    fn truthy_flags() {
        for on in ["1", "true", "yes", "on", "anything", " TRUE "] {
            assert!(is_truthy_flag(Some(on)), "{on}");
        }
        for off in ["0", "false", "FALSE", "off", "no", "", "   "] {
            assert!(!is_truthy_flag(Some(off)), "{off:?}");
        }
        assert!(!is_truthy_flag(None));
    }

    #[test]
    fn toml_sections_and_defaults() {
        let file = PipelineFileConfig::from_str_with_hint(SAMPLE, "toml").unwrap();
        let cfg = PipelineConfig::from(file);
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.topics.topic_for("bbc"), "topic-world");
        assert_eq!(cfg.topics.topic_for("other"), "topic-news");
        assert_eq!(cfg.synthesis.quorum_size, 2);
        assert_eq!(cfg.synthesis.epoch_debounce_ms, 1_800_000);
        assert_eq!(cfg.digest.max_quote_length, 280);
        assert_eq!(cfg.runtime.poll_interval_ms, 60_000);
        assert!(cfg.runtime.run_on_start);
        assert_eq!(cfg.analysis_model, "local-small");
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file = PipelineFileConfig::from_str_with_hint("{}", "json").unwrap();
        assert_eq!(file.runtime.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(file.analysis_model, DEFAULT_ANALYSIS_MODEL);
        assert_eq!(file.synthesis, SynthesisConfig::default());
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        std::env::set_var(ENV_NEWS_RUNTIME_ENABLED, "true");
        std::env::set_var(ENV_TOPIC_SYNTHESIS_ENABLED, "off");
        std::env::set_var(ENV_NEWS_POLL_INTERVAL_MS, "5000");
        std::env::set_var(ENV_ANALYSIS_MODEL, "gpt-test");

        let mut cfg = PipelineConfig::from(PipelineFileConfig::default());
        cfg.apply_env();
        assert!(cfg.runtime_enabled);
        assert!(!cfg.synthesis_enabled);
        assert_eq!(cfg.runtime.poll_interval_ms, 5_000);
        assert_eq!(cfg.analysis_model, "gpt-test");

        std::env::set_var(ENV_NEWS_POLL_INTERVAL_MS, "soon");
        let mut cfg = PipelineConfig::from(PipelineFileConfig::default());
        cfg.apply_env();
        assert_eq!(cfg.runtime.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);

        for k in [
            ENV_NEWS_RUNTIME_ENABLED,
            ENV_TOPIC_SYNTHESIS_ENABLED,
            ENV_NEWS_POLL_INTERVAL_MS,
            ENV_ANALYSIS_MODEL,
        ] {
            std::env::remove_var(k);
        }
    }

    #[test]
    #[serial]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("custom.json");
        std::fs::write(&p, r#"{"runtime": {"poll_interval_ms": 1234, "run_on_start": false}}"#).unwrap();
        std::env::set_var(ENV_PIPELINE_CONFIG_PATH, &p);

        assert_eq!(resolve_config_path(), Some(p.clone()));
        let cfg = load_pipeline_config().unwrap();
        assert_eq!(cfg.runtime.poll_interval_ms, 1234);
        assert!(!cfg.runtime.run_on_start);

        std::env::set_var(ENV_PIPELINE_CONFIG_PATH, dir.path().join("missing.toml"));
        assert!(load_pipeline_config().is_err());
        std::env::remove_var(ENV_PIPELINE_CONFIG_PATH);
    }
}
