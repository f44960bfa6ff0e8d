// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Primary,
    Secondary,
}

/// One configured feed. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub id: String,
    pub name: String,
    pub feed_url: String,
    #[serde(default)]
    pub trust_tier: Option<TrustTier>,
    pub enabled: bool,
}

impl FeedSource {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::Empty { field: "id" });
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }
        require_http_url("feed_url", &self.feed_url)
    }
}

/// A feed entry as parsed, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawItem {
    pub source_id: String,
    pub url: String,
    pub title: String,
    /// Unix milliseconds.
    pub published_at: Option<u64>,
    pub summary: Option<String>,
    pub author: Option<String>,
}

impl RawItem {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_id.trim().is_empty() {
            return Err(ValidationError::Empty { field: "source_id" });
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::Empty { field: "title" });
        }
        require_http_url("url", &self.url)?;
        if self.summary.as_deref().is_some_and(str::is_empty) {
            return Err(ValidationError::Empty { field: "summary" });
        }
        if self.author.as_deref().is_some_and(str::is_empty) {
            return Err(ValidationError::Empty { field: "author" });
        }
        Ok(())
    }
}

pub(crate) fn require_http_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value.trim()) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.has_host() => Ok(()),
        _ => Err(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

/// Transport seam: returns the raw feed body for a source.
///
/// Implementations must fail on transport errors and non-2xx statuses;
/// `ingest_feeds` isolates those failures per source.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedSource) -> Result<String>;
    fn name(&self) -> &'static str;
}
