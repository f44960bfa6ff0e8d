// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::ingest::types::FeedSource;

/// Load a feed-source list from an explicit path. Supports TOML
/// (`[[sources]]` tables) or JSON (a bare array or `{"sources": [...]}`).
pub fn load_feed_sources_from(path: &Path) -> Result<Vec<FeedSource>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feed_sources(&content, ext.as_str())
}

fn parse_feed_sources(s: &str, hint_ext: &str) -> Result<Vec<FeedSource>> {
    #[derive(serde::Deserialize)]
    struct Wrapped {
        sources: Vec<serde_json::Value>,
    }

    if hint_ext == "toml" {
        let w: Wrapped = toml::from_str(s).context("parsing feed sources toml")?;
        return Ok(sanitize_sources(w.sources));
    }
    if let Ok(list) = serde_json::from_str::<Vec<serde_json::Value>>(s) {
        return Ok(sanitize_sources(list));
    }
    if let Ok(w) = serde_json::from_str::<Wrapped>(s) {
        return Ok(sanitize_sources(w.sources));
    }
    if let Ok(w) = toml::from_str::<Wrapped>(s) {
        return Ok(sanitize_sources(w.sources));
    }
    Err(anyhow!("unsupported feed source format"))
}

/// Keep entries that deserialize and validate; warn about the rest.
/// Duplicate ids keep their first occurrence.
pub fn sanitize_sources(entries: Vec<serde_json::Value>) -> Vec<FeedSource> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        let source: FeedSource = match serde_json::from_value(entry) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(target: "ingest", index = idx, error = %e, "malformed feed source skipped");
                continue;
            }
        };
        if let Err(e) = source.validate() {
            tracing::warn!(target: "ingest", index = idx, source = %source.id, error = %e, "invalid feed source skipped");
            continue;
        }
        if !seen.insert(source.id.clone()) {
            tracing::warn!(target: "ingest", source = %source.id, "duplicate feed source id skipped");
            continue;
        }
        out.push(source);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_and_json_formats_work() {
        let toml = r#"
            [[sources]]
            id = "bbc"
            name = "BBC News"
            feed_url = "https://feeds.bbci.co.uk/news/rss.xml"
            trust_tier = "primary"
            enabled = true
        "#;
        let json = r#"[{"id":"wire","name":"Wire","feed_url":"https://wire.example.org/feed","enabled":false}]"#;

        let t = parse_feed_sources(toml, "toml").unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].id, "bbc");
        assert_eq!(t[0].trust_tier, Some(crate::ingest::types::TrustTier::Primary));

        let j = parse_feed_sources(json, "json").unwrap();
        assert_eq!(j.len(), 1);
        assert!(!j[0].enabled);
    }

    #[test]
    fn bad_entries_are_skipped_not_fatal() {
        let json = r#"[
            {"id":"ok","name":"Ok","feed_url":"https://ok.example.com/rss","enabled":true},
            {"id":"","name":"Empty id","feed_url":"https://x.example.com/rss","enabled":true},
            {"id":"nourl","name":"No url","enabled":true},
            {"id":"badurl","name":"Bad","feed_url":"mailto:someone","enabled":true},
            {"id":"ok","name":"Dup","feed_url":"https://dup.example.com/rss","enabled":true}
        ]"#;
        let out = parse_feed_sources(json, "json").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Ok");
    }

    #[test]
    fn unknown_format_errors() {
        assert!(parse_feed_sources("<<<", "txt").is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("sources.json");
        std::fs::write(
            &p,
            r#"{"sources":[{"id":"a","name":"A","feed_url":"http://a.example.com/rss","enabled":true}]}"#,
        )
        .unwrap();
        let v = load_feed_sources_from(&p).unwrap();
        assert_eq!(v[0].id, "a");
    }
}
