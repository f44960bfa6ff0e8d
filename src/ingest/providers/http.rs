// src/ingest/providers/http.rs
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::ingest::types::{FeedFetcher, FeedSource};

/// Fetches feeds over HTTP(S) with `reqwest`.
#[derive(Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("topic-synthesis/0.1 (feed ingestion)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<String> {
        let resp = self
            .client
            .get(&source.feed_url)
            .send()
            .await
            .with_context(|| format!("GET {}", source.feed_url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("feed {} returned HTTP {}", source.id, status.as_u16());
        }

        resp.text()
            .await
            .with_context(|| format!("reading body of feed {}", source.id))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
