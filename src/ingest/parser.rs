// src/ingest/parser.rs
//! Tolerant RSS/Atom item extraction.
//!
//! Walks the document with `quick_xml`'s event reader and collects the direct
//! children of every `<item>` / `<entry>`. End-name checking is off so sloppy
//! feeds still yield whatever items precede the first hard syntax error.

use std::collections::HashMap;

use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use crate::ingest::clean_text;
use crate::ingest::types::RawItem;

const TIMESTAMP_TAGS: [&str; 3] = ["pubdate", "published", "updated"];
const SUMMARY_TAGS: [&str; 3] = ["description", "summary", "content:encoded"];
const AUTHOR_TAGS: [&str; 2] = ["author", "dc:creator"];

#[derive(Default)]
struct Fragment {
    fields: HashMap<String, String>,
    href: Option<String>,
}

impl Fragment {
    fn first_of(&self, tags: &[&str]) -> Option<String> {
        tags.iter()
            .filter_map(|t| self.fields.get(*t))
            .map(|raw| clean_text(raw))
            .find(|s| !s.is_empty())
    }

    fn link(&self) -> Option<String> {
        self.href
            .clone()
            .or_else(|| self.fields.get("link").map(|raw| clean_text(raw)))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

struct Capture {
    name: String,
    buf: String,
}

/// Parse RSS 2.0 and Atom documents into raw items for `source_id`.
///
/// Items without a link or title, and items that fail validation, are
/// skipped with a warning.
pub fn parse_feed_xml(xml: &str, source_id: &str) -> Vec<RawItem> {
    let t0 = std::time::Instant::now();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut out = Vec::new();
    let mut current: Option<Fragment> = None;
    let mut capture: Option<Capture> = None;
    // Element depth relative to the open item (0 = direct child level).
    let mut depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = qualified_name(&e);
                if let Some(frag) = current.as_mut() {
                    if depth == 0 {
                        record_href(frag, &name, &e);
                        capture = Some(Capture {
                            name,
                            buf: String::new(),
                        });
                    } else if let Some(c) = capture.as_mut() {
                        c.buf.push(' ');
                    }
                    depth += 1;
                } else if is_item_tag(&name) {
                    current = Some(Fragment::default());
                    depth = 0;
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(frag) = current.as_mut() {
                    record_href(frag, &qualified_name(&e), &e);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(c) = capture.as_mut() {
                    c.buf.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(c) = capture.as_mut() {
                    c.buf.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if current.is_none() {
                    continue;
                }
                if depth == 0 {
                    if is_item_tag(&name) {
                        if let Some(frag) = current.take() {
                            if let Some(item) = build_item(&frag, source_id) {
                                out.push(item);
                            }
                        }
                    }
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    if let (Some(c), Some(frag)) = (capture.take(), current.as_mut()) {
                        frag.fields.entry(c.name).or_insert(c.buf);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    source = source_id,
                    position = reader.buffer_position(),
                    error = %e,
                    "feed xml error, keeping items parsed so far"
                );
                break;
            }
            Ok(_) => {}
        }
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_items_parsed_total").increment(out.len() as u64);
    out
}

fn build_item(frag: &Fragment, source_id: &str) -> Option<RawItem> {
    let url = frag.link()?;
    let title = frag.first_of(&["title"])?;

    let item = RawItem {
        source_id: source_id.to_string(),
        url,
        title,
        published_at: TIMESTAMP_TAGS
            .iter()
            .filter_map(|t| frag.fields.get(*t))
            .find_map(|raw| parse_timestamp_ms(&clean_text(raw))),
        summary: frag.first_of(&SUMMARY_TAGS),
        author: frag.first_of(&AUTHOR_TAGS),
    };

    match item.validate() {
        Ok(()) => Some(item),
        Err(e) => {
            tracing::warn!(
                target: "ingest",
                source = source_id,
                error = %e,
                "invalid feed item skipped"
            );
            counter!("ingest_items_rejected_total").increment(1);
            None
        }
    }
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn is_item_tag(name: &str) -> bool {
    name == "item" || name == "entry"
}

fn record_href(frag: &mut Fragment, name: &str, e: &BytesStart<'_>) {
    if name != "link" || frag.href.is_some() {
        return;
    }
    let href = e
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"href")
        .map(|a| html_escape::decode_html_entities(&String::from_utf8_lossy(&a.value)).to_string())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    frag.href = href;
}

/// RFC 2822 (RSS) or RFC 3339 (Atom) into unix milliseconds.
/// Pre-epoch and unparseable values yield `None`.
pub fn parse_timestamp_ms(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let nanos = OffsetDateTime::parse(raw, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .map(OffsetDateTime::unix_timestamp_nanos)
        .ok()
        .or_else(|| {
            // `time` rejects obsolete zone names such as "GMT"/"EST".
            chrono::DateTime::parse_from_rfc2822(raw)
                .ok()
                .map(|dt| i128::from(dt.timestamp_millis()) * 1_000_000)
        })?;
    u64::try_from(nanos / 1_000_000).ok()
}
