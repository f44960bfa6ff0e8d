// src/ingest/providers/fixture.rs
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::ingest::types::{FeedFetcher, FeedSource};

/// Serves feed bodies from memory, keyed by feed url.
///
/// Unknown urls behave like a 404 so per-source failure isolation can be
/// exercised without a network.
#[derive(Debug, Default, Clone)]
pub struct FixtureFeedFetcher {
    bodies: HashMap<String, String>,
}

impl FixtureFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, feed_url: &str, xml: &str) -> Self {
        self.bodies.insert(feed_url.to_string(), xml.to_string());
        self
    }
}

#[async_trait]
impl FeedFetcher for FixtureFeedFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<String> {
        self.bodies
            .get(&source.feed_url)
            .cloned()
            .ok_or_else(|| anyhow!("feed {} returned HTTP 404", source.id))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
