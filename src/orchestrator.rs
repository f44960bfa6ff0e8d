//! # Ingestion tick
//! Ingest → normalize → group by topic → cluster, producing story bundles in
//! `(topic_id, story_id)` order.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cluster::{cluster_items, ClusterOptions, StoryBundle};
use crate::ingest::ingest_feeds;
use crate::ingest::types::{FeedFetcher, FeedSource};
use crate::normalize::{normalize_and_dedup, NormalizeOptions, NormalizedItem};

pub const DEFAULT_TOPIC_ID: &str = "topic-news";

/// Which topic each source's stories belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TopicMapping {
    pub default_topic_id: String,
    pub source_topics: BTreeMap<String, String>,
}

impl Default for TopicMapping {
    fn default() -> Self {
        Self {
            default_topic_id: DEFAULT_TOPIC_ID.to_string(),
            source_topics: BTreeMap::new(),
        }
    }
}

impl TopicMapping {
    pub fn topic_for(&self, source_id: &str) -> &str {
        self.source_topics
            .get(source_id)
            .map(String::as_str)
            .unwrap_or(self.default_topic_id.as_str())
    }
}

/// External persistence for bundles.
#[async_trait]
pub trait StoryWriter: Send + Sync {
    async fn write_story_bundle(&self, bundle: &StoryBundle) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub sources: Vec<FeedSource>,
    pub topics: TopicMapping,
    pub normalize: NormalizeOptions,
    pub cluster: ClusterOptions,
}

/// Partition items by mapped topic. Item order inside a group is kept.
pub fn group_by_topic(
    items: Vec<NormalizedItem>,
    topics: &TopicMapping,
) -> BTreeMap<String, Vec<NormalizedItem>> {
    let mut groups: BTreeMap<String, Vec<NormalizedItem>> = BTreeMap::new();
    for item in items {
        let topic = topics.topic_for(&item.source_id).to_string();
        groups.entry(topic).or_default().push(item);
    }
    groups
}

/// Cluster already-normalized items, every topic group independently.
/// A group whose topic id is unusable is skipped with a warning.
pub fn cluster_by_topic(
    items: Vec<NormalizedItem>,
    topics: &TopicMapping,
    opts: ClusterOptions,
    now_ms: u64,
) -> Vec<StoryBundle> {
    let mut bundles = Vec::new();
    for (topic_id, group) in group_by_topic(items, topics) {
        match cluster_items(&group, &topic_id, opts, now_ms) {
            Ok(mut b) => bundles.append(&mut b),
            Err(e) => {
                tracing::warn!(target: "cluster", topic = %topic_id, error = %e, "topic group skipped");
            }
        }
    }
    bundles.sort_by(|a, b| {
        a.topic_id
            .cmp(&b.topic_id)
            .then_with(|| a.story_id.cmp(&b.story_id))
    });
    bundles
}

/// One full pass over the configured sources.
pub async fn run_pipeline_once(
    inputs: &PipelineInputs,
    fetcher: &dyn FeedFetcher,
    now_ms: u64,
) -> Vec<StoryBundle> {
    let raw = ingest_feeds(&inputs.sources, fetcher).await;
    let raw_count = raw.len();
    let normalized = normalize_and_dedup(raw, inputs.normalize);
    let normalized_count = normalized.len();
    let bundles = cluster_by_topic(normalized, &inputs.topics, inputs.cluster, now_ms);

    tracing::info!(
        target: "runtime",
        raw = raw_count,
        normalized = normalized_count,
        bundles = bundles.len(),
        "pipeline pass finished"
    );
    bundles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_hex;
    use crate::normalize::extract_entity_keys;

    fn item(source: &str, url: &str, title: &str) -> NormalizedItem {
        NormalizedItem {
            source_id: source.into(),
            publisher: source.into(),
            url: url.into(),
            canonical_url: url.into(),
            title: title.into(),
            published_at: Some(1_000),
            summary: None,
            author: None,
            url_hash: hash_hex(url),
            entity_keys: extract_entity_keys(title),
        }
    }

    fn mapping() -> TopicMapping {
        TopicMapping {
            default_topic_id: "topic-general".into(),
            source_topics: BTreeMap::from([("econ".to_string(), "topic-economy".to_string())]),
        }
    }

    #[test]
    fn unmapped_sources_use_default_topic() {
        let groups = group_by_topic(
            vec![
                item("econ", "https://e.com/1", "Rates hold steady"),
                item("wire", "https://w.com/1", "Storm season starts"),
            ],
            &mapping(),
        );
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["topic-economy", "topic-general"]);
    }

    #[test]
    fn bundles_sorted_by_topic_then_story() {
        let items = vec![
            item("wire", "https://w.com/1", "Storm season starts early"),
            item("econ", "https://e.com/1", "Central bank holds rates"),
            item("wire", "https://w.com/2", "Election turnout record"),
        ];
        let bundles = cluster_by_topic(items, &mapping(), ClusterOptions::default(), 0);
        assert_eq!(bundles.len(), 3);
        assert_eq!(bundles[0].topic_id, "topic-economy");
        assert!(bundles[1].story_id < bundles[2].story_id);
    }

    #[test]
    fn blank_topic_group_is_skipped() {
        let mut m = mapping();
        m.source_topics.insert("bad".into(), " ".into());
        let bundles = cluster_by_topic(
            vec![item("bad", "https://b.com/1", "Anything goes here")],
            &m,
            ClusterOptions::default(),
            0,
        );
        assert!(bundles.is_empty());
    }
}
