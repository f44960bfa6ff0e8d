// src/synthesis/digest.rs
//! Topic digests: claims, counterclaims and sanitized quotes from verified
//! comments in one window.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;
use crate::hash::hash_hex;
use crate::synthesis::types::{DigestConfig, Stance, TopicDigest, VerifiedComment};

pub const REDACTION_MARKER: &str = "[REDACTED]";

static RE_HEX_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{16,}\b").unwrap());
static RE_PREFIXED_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(principal|author|user|nullifier)[:\s]+\S+").unwrap());

#[derive(Debug, Clone)]
pub struct DigestInput<'a> {
    pub topic_id: &'a str,
    pub window_start: u64,
    pub window_end: u64,
    pub comments: &'a [VerifiedComment],
    pub verified_comment_count: usize,
    pub unique_verified_principals: usize,
}

/// Depends only on `(topic, window)`; retries over a different comment set
/// keep the same id.
pub fn derive_digest_id(topic_id: &str, window_start: u64, window_end: u64) -> String {
    format!(
        "dg-{}",
        hash_hex(&format!("digest:{topic_id}:{window_start}:{window_end}"))
    )
}

/// Replace hash-like tokens and `principal:`-style references with a marker.
pub fn sanitize_quote(text: &str) -> String {
    let s = RE_HEX_ID.replace_all(text, REDACTION_MARKER);
    let s = RE_PREFIXED_ID.replace_all(&s, REDACTION_MARKER);
    s.trim().to_string()
}

fn truncate_quote(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_len.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn contents<'a>(
    comments: &'a [VerifiedComment],
    keep: impl Fn(Stance) -> bool + 'a,
) -> impl Iterator<Item = &'a str> + 'a {
    comments
        .iter()
        .filter(move |c| keep(c.stance))
        .map(|c| c.content.trim())
        .filter(|s| !s.is_empty())
}

pub fn build_digest(input: &DigestInput<'_>, cfg: &DigestConfig) -> Result<TopicDigest, ValidationError> {
    if input.topic_id.trim().is_empty() {
        return Err(ValidationError::Empty { field: "topic_id" });
    }
    if input.window_end < input.window_start {
        return Err(ValidationError::OutOfRange {
            field: "window_end",
            detail: format!("{} precedes window_start {}", input.window_end, input.window_start),
        });
    }
    for c in input.comments {
        c.validate()?;
    }

    let key_claims = contents(input.comments, |s| matches!(s, Stance::Concur | Stance::Discuss))
        .take(cfg.max_claims)
        .map(str::to_string)
        .collect();

    let salient_counterclaims = contents(input.comments, |s| s == Stance::Counter)
        .take(cfg.max_counterclaims)
        .map(str::to_string)
        .collect();

    let representative_quotes = contents(input.comments, |_| true)
        .map(|q| sanitize_quote(&truncate_quote(q, cfg.max_quote_length)))
        .filter(|q| !q.is_empty())
        .take(cfg.max_quotes)
        .collect();

    Ok(TopicDigest {
        digest_id: derive_digest_id(input.topic_id, input.window_start, input.window_end),
        topic_id: input.topic_id.to_string(),
        window_start: input.window_start,
        window_end: input.window_end,
        verified_comment_count: input.verified_comment_count,
        unique_verified_principals: input.unique_verified_principals,
        key_claims,
        salient_counterclaims,
        representative_quotes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, stance: Stance, content: &str) -> VerifiedComment {
        VerifiedComment {
            comment_id: id.into(),
            content: content.into(),
            stance,
            principal_hash: format!("p-{id}"),
            timestamp: 1,
        }
    }

    fn input<'a>(comments: &'a [VerifiedComment]) -> DigestInput<'a> {
        DigestInput {
            topic_id: "T",
            window_start: 100,
            window_end: 200,
            comments,
            verified_comment_count: comments.len(),
            unique_verified_principals: comments.len(),
        }
    }

    #[test]
    fn digest_id_ignores_comment_content() {
        let a = [comment("1", Stance::Concur, "yes")];
        let b = [comment("2", Stance::Counter, "no")];
        let cfg = DigestConfig::default();
        let da = build_digest(&input(&a), &cfg).unwrap();
        let db = build_digest(&input(&b), &cfg).unwrap();
        assert_eq!(da.digest_id, db.digest_id);
        assert!(da.digest_id.starts_with("dg-"));
        assert_ne!(da.digest_id, derive_digest_id("T", 100, 201));
    }

    #[test]
    fn claims_and_counterclaims_split_by_stance() {
        let cs = [
            comment("1", Stance::Concur, "  A  "),
            comment("2", Stance::Counter, "B"),
            comment("3", Stance::Discuss, "C"),
            comment("4", Stance::Concur, "   "),
        ];
        let d = build_digest(&input(&cs), &DigestConfig::default()).unwrap();
        assert_eq!(d.key_claims, vec!["A", "C"]);
        assert_eq!(d.salient_counterclaims, vec!["B"]);
        assert_eq!(d.representative_quotes, vec!["A", "B", "C"]);
    }

    #[test]
    fn caps_apply_first_n() {
        let cs: Vec<_> = (0..8).map(|i| comment(&i.to_string(), Stance::Counter, &format!("x{i}"))).collect();
        let cfg = DigestConfig { max_counterclaims: 2, max_quotes: 3, ..Default::default() };
        let d = build_digest(&input(&cs), &cfg).unwrap();
        assert_eq!(d.salient_counterclaims, vec!["x0", "x1"]);
        assert_eq!(d.representative_quotes.len(), 3);
    }

    #[test]
    fn identifiers_are_redacted() {
        let q = sanitize_quote("as principal:alice-secret said, see deadbeefdeadbeef00");
        assert!(!q.contains("alice-secret"));
        assert!(!q.contains("deadbeefdeadbeef00"));
        assert_eq!(q, "as [REDACTED] said, see [REDACTED]");
        assert_eq!(sanitize_quote("USER: bob"), "[REDACTED]");
    }

    #[test]
    fn redacted_quotes_keep_the_marker() {
        let cs = [
            comment("1", Stance::Discuss, "nullifier:abc"),
            comment("2", Stance::Discuss, "fine"),
        ];
        let d = build_digest(&input(&cs), &DigestConfig::default()).unwrap();
        assert_eq!(d.representative_quotes, vec![REDACTION_MARKER, "fine"]);
    }

    #[test]
    fn long_quotes_are_truncated_with_ellipsis() {
        let long = "z".repeat(300);
        let cs = [comment("1", Stance::Concur, &long)];
        let d = build_digest(&input(&cs), &DigestConfig::default()).unwrap();
        let q = &d.representative_quotes[0];
        assert_eq!(q.chars().count(), 280);
        assert!(q.ends_with('…'));
        // claims keep full text
        assert_eq!(d.key_claims[0].len(), 300);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut i = input(&[]);
        i.window_end = 50;
        assert!(build_digest(&i, &DigestConfig::default()).is_err());
    }
}
