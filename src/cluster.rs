//! # Story Clustering
//! Groups normalized items of one topic into content-addressed story bundles.
//!
//! Items are sorted by `(published_at, url_hash)` and assigned greedily to the
//! first open cluster in the same time bucket with significant entity-key
//! overlap. Every id derived here is a pure function of the cluster contents,
//! so any permutation of the same input yields the same `story_id` and
//! `provenance_hash`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::hash::hash_hex;
use crate::normalize::{normalize_title, NormalizedItem};

pub const DEFAULT_CLUSTER_BUCKET_MS: u64 = 60 * 60 * 1000;
pub const STORY_BUNDLE_SCHEMA_VERSION: &str = "story-bundle-v0";
const MIN_ENTITY_OVERLAP: usize = 2;
const FALLBACK_ENTITY: &str = "general";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterOptions {
    pub bucket_ms: u64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            bucket_ms: DEFAULT_CLUSTER_BUCKET_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryBundleSource {
    pub source_id: String,
    pub publisher: String,
    /// Canonical url.
    pub url: String,
    pub url_hash: String,
    /// Falls back to the cluster's bucket start for undated items.
    pub published_at: u64,
    pub title: String,
}

impl StoryBundleSource {
    fn sort_key(&self) -> (&str, &str, &str) {
        (&self.source_id, &self.url_hash, &self.title)
    }

    fn serialized(&self) -> String {
        [
            self.source_id.as_str(),
            self.publisher.as_str(),
            self.url.as_str(),
            self.url_hash.as_str(),
            &self.published_at.to_string(),
            self.title.as_str(),
        ]
        .join("|")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterFeatures {
    pub entity_keys: Vec<String>,
    pub time_bucket: String,
    pub semantic_signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryBundle {
    pub schema_version: String,
    pub story_id: String,
    pub topic_id: String,
    pub headline: String,
    pub summary_hint: Option<String>,
    pub window_start: u64,
    pub window_end: u64,
    pub sources: Vec<StoryBundleSource>,
    pub cluster_features: ClusterFeatures,
    pub provenance_hash: String,
    pub created_at: u64,
}

/// The shape handed to synthesis candidate producers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryBundleInput {
    pub story_id: String,
    pub topic_id: String,
    pub sources: Vec<StoryBundleInputSource>,
    pub normalized_facts_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryBundleInputSource {
    pub source_id: String,
    pub url: String,
    pub publisher: String,
    pub published_at: u64,
    pub url_hash: String,
}

impl StoryBundle {
    pub fn to_input_candidate(&self) -> StoryBundleInput {
        StoryBundleInput {
            story_id: self.story_id.clone(),
            topic_id: self.topic_id.clone(),
            sources: self
                .sources
                .iter()
                .map(|s| StoryBundleInputSource {
                    source_id: s.source_id.clone(),
                    url: s.url.clone(),
                    publisher: s.publisher.clone(),
                    published_at: s.published_at,
                    url_hash: s.url_hash.clone(),
                })
                .collect(),
            normalized_facts_text: self
                .summary_hint
                .clone()
                .unwrap_or_else(|| self.headline.clone()),
        }
    }
}

/// Per-story confidence that the cluster describes one event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleVerification {
    pub story_id: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub method: String,
    pub verified_at: u64,
}

struct Cluster<'a> {
    bucket_start: u64,
    bucket_end: u64,
    items: Vec<&'a NormalizedItem>,
    entities: BTreeSet<String>,
}

fn bucket_start(ts: Option<u64>, bucket_ms: u64) -> u64 {
    match ts {
        Some(t) => (t / bucket_ms) * bucket_ms,
        None => 0,
    }
}

/// Hour-resolution UTC label, e.g. `2024-02-05T12`.
pub fn bucket_label(bucket_start_ms: u64) -> String {
    i64::try_from(bucket_start_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%dT%H").to_string())
        .unwrap_or_else(|| bucket_start_ms.to_string())
}

fn fallback_entity(title: &str) -> String {
    normalize_title(title)
        .split_whitespace()
        .find(|t| t.len() >= 4)
        .unwrap_or(FALLBACK_ENTITY)
        .to_string()
}

fn entity_keys_for(item: &NormalizedItem) -> Vec<String> {
    if item.entity_keys.is_empty() {
        vec![fallback_entity(&item.title)]
    } else {
        item.entity_keys.clone()
    }
}

/// Shared keys must reach `min(2, ceil(smaller/2))`, so one common token
/// cannot merge unrelated stories with rich key sets.
fn has_significant_overlap(cluster: &BTreeSet<String>, keys: &[String]) -> bool {
    let shared = keys.iter().filter(|k| cluster.contains(*k)).count();
    let smaller = cluster.len().min(keys.len());
    let needed = MIN_ENTITY_OVERLAP.min(smaller.div_ceil(2));
    shared > 0 && shared >= needed
}

fn build_clusters(items: &[NormalizedItem], bucket_ms: u64) -> Vec<Cluster<'_>> {
    let mut sorted: Vec<&NormalizedItem> = items.iter().collect();
    sorted.sort_by(|a, b| {
        (a.published_at.unwrap_or(0), &a.url_hash, &a.source_id, &a.title).cmp(&(
            b.published_at.unwrap_or(0),
            &b.url_hash,
            &b.source_id,
            &b.title,
        ))
    });

    let mut clusters: Vec<Cluster<'_>> = Vec::new();
    for item in sorted {
        let start = bucket_start(item.published_at, bucket_ms);
        let keys = entity_keys_for(item);

        let existing = clusters
            .iter_mut()
            .find(|c| c.bucket_start == start && has_significant_overlap(&c.entities, &keys));

        match existing {
            Some(c) => {
                c.items.push(item);
                c.bucket_end = c.bucket_end.max(item.published_at.unwrap_or(c.bucket_end));
                c.entities.extend(keys);
            }
            None => clusters.push(Cluster {
                bucket_start: start,
                bucket_end: (start + bucket_ms).max(item.published_at.unwrap_or(start)),
                items: vec![item],
                entities: keys.into_iter().collect(),
            }),
        }
    }
    clusters
}

fn semantic_signature(items: &[&NormalizedItem]) -> String {
    let mut titles: Vec<String> = items.iter().map(|i| i.title.trim().to_lowercase()).collect();
    titles.sort();
    hash_hex(&titles.join("|"))
}

fn provenance_hash(sources: &[StoryBundleSource]) -> String {
    let mut rows: Vec<String> = sources.iter().map(StoryBundleSource::serialized).collect();
    rows.sort();
    hash_hex(&rows.join("||"))
}

/// Most recent item wins; ties go to the lexicographically smallest title.
fn headline(items: &[&NormalizedItem]) -> String {
    items
        .iter()
        .min_by(|a, b| {
            b.published_at
                .unwrap_or(0)
                .cmp(&a.published_at.unwrap_or(0))
                .then_with(|| a.title.cmp(&b.title))
        })
        .map(|i| i.title.clone())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn to_bundle(cluster: &Cluster<'_>, topic_id: &str, now_ms: u64) -> StoryBundle {
    let entity_keys: Vec<String> = cluster.entities.iter().cloned().collect();
    let time_bucket = bucket_label(cluster.bucket_start);
    let signature = semantic_signature(&cluster.items);
    let story_seed = [
        topic_id,
        time_bucket.as_str(),
        &entity_keys.join(","),
        signature.as_str(),
    ]
    .join("|");

    let mut sources: Vec<StoryBundleSource> = cluster
        .items
        .iter()
        .map(|i| StoryBundleSource {
            source_id: i.source_id.clone(),
            publisher: i.publisher.clone(),
            url: i.canonical_url.clone(),
            url_hash: i.url_hash.clone(),
            published_at: i.published_at.unwrap_or(cluster.bucket_start),
            title: i.title.clone(),
        })
        .collect();
    sources.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    StoryBundle {
        schema_version: STORY_BUNDLE_SCHEMA_VERSION.to_string(),
        story_id: format!("story-{}", hash_hex(&story_seed)),
        topic_id: topic_id.to_string(),
        headline: headline(&cluster.items),
        summary_hint: cluster.items.iter().find_map(|i| i.summary.clone()),
        window_start: cluster.bucket_start,
        window_end: cluster.bucket_end.max(cluster.bucket_start),
        provenance_hash: provenance_hash(&sources),
        sources,
        cluster_features: ClusterFeatures {
            entity_keys,
            time_bucket,
            semantic_signature: signature,
        },
        created_at: now_ms,
    }
}

fn bundles_with_clusters<'a>(
    items: &'a [NormalizedItem],
    topic_id: &str,
    opts: ClusterOptions,
    now_ms: u64,
) -> Result<Vec<(StoryBundle, Cluster<'a>)>, ValidationError> {
    if topic_id.trim().is_empty() {
        return Err(ValidationError::Empty { field: "topic_id" });
    }
    if opts.bucket_ms == 0 {
        return Err(ValidationError::OutOfRange {
            field: "bucket_ms",
            detail: "must be positive".into(),
        });
    }

    let mut out: Vec<(StoryBundle, Cluster<'a>)> = build_clusters(items, opts.bucket_ms)
        .into_iter()
        .map(|c| (to_bundle(&c, topic_id, now_ms), c))
        .collect();
    out.sort_by(|(a, _), (b, _)| {
        a.window_start
            .cmp(&b.window_start)
            .then_with(|| a.story_id.cmp(&b.story_id))
    });
    Ok(out)
}

/// Cluster one topic's items into story bundles, sorted by
/// `(window_start, story_id)`.
pub fn cluster_items(
    items: &[NormalizedItem],
    topic_id: &str,
    opts: ClusterOptions,
    now_ms: u64,
) -> Result<Vec<StoryBundle>, ValidationError> {
    let bundles: Vec<StoryBundle> = bundles_with_clusters(items, topic_id, opts, now_ms)?
        .into_iter()
        .map(|(b, _)| b)
        .collect();
    counter!("cluster_bundles_total").increment(bundles.len() as u64);
    Ok(bundles)
}

// --- Verification confidence scoring ---

fn entity_overlap_ratio(cluster: &Cluster<'_>) -> f64 {
    let sets: Vec<BTreeSet<String>> = cluster
        .items
        .iter()
        .map(|i| entity_keys_for(i).into_iter().collect())
        .collect();
    if sets.len() < 2 {
        return 0.0;
    }
    let (mut shared, mut union) = (0usize, 0usize);
    for (i, a) in sets.iter().enumerate() {
        for b in &sets[i + 1..] {
            shared += a.intersection(b).count();
            union += a.union(b).count();
        }
    }
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

fn timestamp_spread(cluster: &Cluster<'_>) -> Option<u64> {
    let ts: Vec<u64> = cluster.items.iter().filter_map(|i| i.published_at).collect();
    if ts.len() < 2 {
        return None;
    }
    let max = ts.iter().copied().max()?;
    let min = ts.iter().copied().min()?;
    Some(max - min)
}

fn source_count(cluster: &Cluster<'_>) -> usize {
    cluster
        .items
        .iter()
        .map(|i| i.source_id.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

fn cluster_confidence(cluster: &Cluster<'_>, bucket_ms: u64) -> f64 {
    let entity = entity_overlap_ratio(cluster);
    let time = match timestamp_spread(cluster) {
        None => 1.0,
        Some(spread) => (1.0 - spread as f64 / bucket_ms as f64).max(0.0),
    };
    let diversity = if cluster.items.is_empty() {
        0.0
    } else {
        source_count(cluster) as f64 / cluster.items.len() as f64
    };
    entity * 0.4 + time * 0.3 + diversity * 0.3
}

/// Verification records keyed by `story_id` for the bundles `cluster_items`
/// would produce from the same input.
pub fn build_verification_map(
    items: &[NormalizedItem],
    topic_id: &str,
    opts: ClusterOptions,
    now_ms: u64,
) -> Result<BTreeMap<String, BundleVerification>, ValidationError> {
    let pairs = bundles_with_clusters(items, topic_id, opts, now_ms)?;
    Ok(pairs
        .into_iter()
        .map(|(bundle, cluster)| {
            let spread_h = timestamp_spread(&cluster).unwrap_or(0) as f64 / 3_600_000.0;
            let record = BundleVerification {
                story_id: bundle.story_id.clone(),
                confidence: cluster_confidence(&cluster, opts.bucket_ms),
                evidence: vec![
                    format!("entity_overlap:{:.2}", entity_overlap_ratio(&cluster)),
                    format!("time_proximity:{spread_h:.1}h"),
                    format!("source_count:{}", source_count(&cluster)),
                ],
                method: "entity_time_cluster".to_string(),
                verified_at: now_ms,
            };
            (bundle.story_id, record)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_hex;
    use crate::normalize::extract_entity_keys;

    // 2024-02-05T12:00:00Z
    const T0: u64 = 1_707_134_400_000;

    fn item(source: &str, url: &str, title: &str, ts: Option<u64>) -> NormalizedItem {
        NormalizedItem {
            source_id: source.into(),
            publisher: source.into(),
            url: url.into(),
            canonical_url: url.into(),
            title: title.into(),
            published_at: ts,
            summary: None,
            author: None,
            url_hash: hash_hex(url),
            entity_keys: extract_entity_keys(title),
        }
    }

    #[test]
    fn related_items_share_a_bundle() {
        let items = vec![
            item("a", "https://a.com/1", "Senate passes budget bill", Some(T0 + 60_000)),
            item("b", "https://b.com/1", "Budget bill clears senate vote", Some(T0 + 120_000)),
            item("c", "https://c.com/1", "Hurricane nears coastline", Some(T0 + 180_000)),
        ];
        let bundles = cluster_items(&items, "topic-1", ClusterOptions::default(), 5).unwrap();
        assert_eq!(bundles.len(), 2);

        let senate = bundles.iter().find(|b| b.sources.len() == 2).unwrap();
        assert_eq!(senate.headline, "Budget bill clears senate vote");
        assert_eq!(senate.window_start, T0);
        assert_eq!(senate.cluster_features.time_bucket, "2024-02-05T12");
        assert_eq!(senate.sources[0].source_id, "a");
        assert_eq!(senate.created_at, 5);
        assert!(senate.story_id.starts_with("story-"));
        assert_eq!(senate.schema_version, STORY_BUNDLE_SCHEMA_VERSION);
    }

    #[test]
    fn different_buckets_never_merge() {
        let items = vec![
            item("a", "https://a.com/1", "Senate passes budget bill", Some(T0)),
            item("b", "https://b.com/1", "Senate passes budget bill", Some(T0 + DEFAULT_CLUSTER_BUCKET_MS)),
        ];
        let bundles = cluster_items(&items, "t", ClusterOptions::default(), 0).unwrap();
        assert_eq!(bundles.len(), 2);
        assert!(bundles[0].window_start < bundles[1].window_start);
    }

    #[test]
    fn undated_and_keyless_items_use_fallbacks() {
        let mut a = item("a", "https://a.com/x", "Big win", None);
        a.entity_keys.clear();
        let mut b = item("b", "https://b.com/x", "Ok", None);
        b.entity_keys.clear();
        let bundles = cluster_items(&[a, b], "t", ClusterOptions::default(), 0).unwrap();
        // "Big win" has no 4+ char token, "Ok" neither: both fall back to "general".
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].window_start, 0);
        assert_eq!(bundles[0].cluster_features.entity_keys, vec!["general"]);
        assert_eq!(bundles[0].sources[0].published_at, 0);
    }

    #[test]
    fn headline_tie_breaks_on_title() {
        let items = vec![
            item("a", "https://a.com/1", "Zeta senate budget", Some(T0)),
            item("b", "https://b.com/1", "Alpha senate budget", Some(T0)),
        ];
        let bundles = cluster_items(&items, "t", ClusterOptions::default(), 0).unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].headline, "Alpha senate budget");
    }

    #[test]
    fn ids_ignore_arrival_order() {
        let mut items = vec![
            item("a", "https://a.com/1", "Senate passes budget bill", Some(T0 + 1)),
            item("b", "https://b.com/1", "Budget bill clears senate", Some(T0 + 1)),
            item("c", "https://c.com/1", "Senate budget bill debate", Some(T0 + 2)),
        ];
        let first = cluster_items(&items, "t", ClusterOptions::default(), 0).unwrap();
        items.reverse();
        let second = cluster_items(&items, "t", ClusterOptions::default(), 0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_topic_is_rejected() {
        assert!(cluster_items(&[], " ", ClusterOptions::default(), 0).is_err());
        assert!(cluster_items(&[], "t", ClusterOptions::default(), 0).unwrap().is_empty());
    }

    #[test]
    fn single_token_does_not_merge_rich_stories() {
        let items = vec![
            item("a", "https://a.com/1", "Biden signs climate infrastructure package", Some(T0)),
            item("b", "https://b.com/1", "Biden attends baseball opener stadium", Some(T0 + 1)),
        ];
        let bundles = cluster_items(&items, "t", ClusterOptions::default(), 0).unwrap();
        assert_eq!(bundles.len(), 2);
    }

    #[test]
    fn verification_map_scores_each_story() {
        let items = vec![
            item("a", "https://a.com/1", "Senate passes budget bill", Some(T0)),
            item("b", "https://b.com/1", "Senate budget bill passes", Some(T0)),
        ];
        let bundles = cluster_items(&items, "t", ClusterOptions::default(), 0).unwrap();
        let map = build_verification_map(&items, "t", ClusterOptions::default(), 0).unwrap();
        let rec = map.get(&bundles[0].story_id).unwrap();
        // identical keys, zero spread, two distinct sources
        assert!((rec.confidence - 1.0).abs() < 1e-9);
        assert_eq!(rec.evidence[2], "source_count:2");
        assert_eq!(rec.method, "entity_time_cluster");
    }

    #[test]
    fn input_candidate_prefers_summary() {
        let mut a = item("a", "https://a.com/1", "Senate passes budget bill", Some(T0));
        a.summary = Some("Vote was 51-49.".into());
        let bundles = cluster_items(&[a], "t", ClusterOptions::default(), 0).unwrap();
        let input = bundles[0].to_input_candidate();
        assert_eq!(input.normalized_facts_text, "Vote was 51-49.");
        assert_eq!(input.sources.len(), 1);
    }
}
