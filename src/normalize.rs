//! # Normalization & Dedup
//! URL canonicalization, lexical entity keys and two-pass deduplication
//! (exact canonical url, then same-source near-duplicate title per time bucket).

use std::collections::HashSet;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::hash::hash_hex;
use crate::ingest::types::RawItem;

pub const DEFAULT_NEAR_DUPLICATE_WINDOW_MS: u64 = 60 * 60 * 1000;

const TRACKING_PARAMS: [&str; 7] = ["fbclid", "gclid", "mc_cid", "mc_eid", "ref", "ref_src", "s"];

const STOPWORDS: [&str; 17] = [
    "about", "after", "again", "against", "among", "been", "being", "from", "have", "into",
    "that", "their", "there", "these", "this", "those", "with",
];

const MIN_ENTITY_KEY_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Bucket width for near-duplicate detection.
    pub near_duplicate_window_ms: u64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            near_duplicate_window_ms: DEFAULT_NEAR_DUPLICATE_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedItem {
    pub source_id: String,
    pub publisher: String,
    pub url: String,
    pub canonical_url: String,
    pub title: String,
    pub published_at: Option<u64>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub url_hash: String,
    pub entity_keys: Vec<String>,
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.trim().to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Canonical form of a url: lower-case scheme/host, no fragment, no tracking
/// params, remaining params sorted by key, no trailing slash (root stays `/`).
///
/// Unparseable input is returned trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = url::Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    let mut retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    // stable: equal keys keep their relative order
    retained.sort_by(|a, b| a.0.cmp(&b.0));

    parsed.set_fragment(None);
    let query = if retained.is_empty() {
        String::new()
    } else {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        ser.extend_pairs(retained.iter());
        format!("?{}", ser.finish())
    };

    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = parsed.path().trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };

    format!("{scheme}://{host}{port}{path}{query}")
}

/// Lower-case, replace anything but ascii alphanumerics/whitespace with a
/// space. Shared by entity keys and title normalization.
fn fold_ascii(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Tokens of ≥4 chars, stopwords removed, deduplicated and sorted.
pub fn extract_entity_keys(text: &str) -> Vec<String> {
    let mut keys: Vec<String> = fold_ascii(text)
        .split_whitespace()
        .filter(|t| t.len() >= MIN_ENTITY_KEY_LEN && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Lower-cased, punctuation stripped, whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    fold_ascii(title).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn near_duplicate_key(item: &RawItem, window_ms: u64) -> (String, String, Option<u64>) {
    let bucket = item.published_at.map(|t| t / window_ms.max(1));
    (item.source_id.clone(), normalize_title(&item.title), bucket)
}

fn normalize_item(item: RawItem, canonical_url: String) -> NormalizedItem {
    let entity_keys = extract_entity_keys(&format!(
        "{} {}",
        item.title,
        item.summary.as_deref().unwrap_or_default()
    ));
    NormalizedItem {
        publisher: item.source_id.clone(),
        url_hash: hash_hex(&canonical_url),
        source_id: item.source_id,
        url: item.url,
        canonical_url,
        title: item.title,
        published_at: item.published_at,
        summary: item.summary,
        author: item.author,
        entity_keys,
    }
}

/// Normalize and deduplicate in input order; the first occurrence wins.
/// Items failing validation are skipped with a warning.
pub fn normalize_and_dedup(items: Vec<RawItem>, opts: NormalizeOptions) -> Vec<NormalizedItem> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_near: HashSet<(String, String, Option<u64>)> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    let (mut exact, mut near) = (0u64, 0u64);

    for item in items {
        if let Err(e) = item.validate() {
            tracing::warn!(target: "normalize", source = %item.source_id, error = %e, "invalid raw item skipped");
            continue;
        }

        let canonical = canonicalize_url(&item.url);
        if seen_urls.contains(&canonical) {
            exact += 1;
            continue;
        }
        let near_key = near_duplicate_key(&item, opts.near_duplicate_window_ms);
        if seen_near.contains(&near_key) {
            near += 1;
            continue;
        }

        seen_urls.insert(canonical.clone());
        seen_near.insert(near_key);
        out.push(normalize_item(item, canonical));
    }

    counter!("normalize_duplicates_total", "kind" => "exact").increment(exact);
    counter!("normalize_duplicates_total", "kind" => "near").increment(near);
    tracing::debug!(target: "normalize", kept = out.len(), exact, near, "dedup finished");
    out
}
