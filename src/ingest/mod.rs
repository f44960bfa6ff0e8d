// src/ingest/mod.rs
pub mod config;
pub mod parser;
pub mod providers;
pub mod types;

use crate::ingest::types::{FeedFetcher, FeedSource, RawItem};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_items_parsed_total",
            "Feed items extracted from fetched documents."
        );
        describe_counter!(
            "ingest_items_rejected_total",
            "Feed items dropped by validation."
        );
        describe_counter!(
            "ingest_sources_failed_total",
            "Feed sources skipped due to transport or status errors."
        );
        describe_counter!(
            "ingest_sources_invalid_total",
            "Feed sources skipped due to invalid configuration."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Decode entities, strip markup, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode (covers the XML five plus &nbsp; and friends)
    let decoded = html_escape::decode_html_entities(s);

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    let stripped = re_tags.replace_all(&decoded, " ");

    // 3) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

/// Fetch and parse every enabled, valid source.
///
/// Failures are isolated per source: an invalid entry, a transport error or a
/// non-2xx response is logged and contributes zero items. Output order follows
/// source order but callers must not rely on it.
pub async fn ingest_feeds(sources: &[FeedSource], fetcher: &dyn FeedFetcher) -> Vec<RawItem> {
    ensure_metrics_described();

    let mut items = Vec::new();
    for source in sources {
        if let Err(e) = source.validate() {
            tracing::warn!(target: "ingest", source = %source.id, error = %e, "invalid feed source skipped");
            counter!("ingest_sources_invalid_total").increment(1);
            continue;
        }
        if !source.enabled {
            continue;
        }

        match fetcher.fetch(source).await {
            Ok(body) => {
                let mut parsed = parser::parse_feed_xml(&body, &source.id);
                tracing::debug!(
                    target: "ingest",
                    source = %source.id,
                    fetcher = fetcher.name(),
                    items = parsed.len(),
                    "feed parsed"
                );
                items.append(&mut parsed);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", source = %source.id, error = ?e, "failed to fetch feed");
                counter!("ingest_sources_failed_total").increment(1);
            }
        }
    }
    items
}
