//! store.rs: in-memory host adapters for the binary and tests.
//!
//! Implements every external seam of the pipeline (bundle writer, epoch
//! metadata, verified comments, synthesis sink) over plain maps. Outputs are
//! capped like a ring log.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::cluster::StoryBundle;
use crate::orchestrator::StoryWriter;
use crate::runtime::now_ms;
use crate::synthesis::types::{TopicDigest, TopicEpochMeta, TopicSynthesisOutput, VerifiedComment};
use crate::synthesis::{EpochContext, SynthesisSink};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default)]
struct EpochLedger {
    current_epoch: u64,
    last_epoch_timestamp: Option<u64>,
    epochs_today: u32,
    day: u64,
}

#[derive(Debug)]
pub struct MemoryStore {
    bundles: Mutex<BTreeMap<String, StoryBundle>>,
    comments: Mutex<HashMap<String, Vec<VerifiedComment>>>,
    epochs: Mutex<HashMap<String, EpochLedger>>,
    outputs: Mutex<Vec<TopicSynthesisOutput>>,
    cap: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            bundles: Mutex::new(BTreeMap::new()),
            comments: Mutex::new(HashMap::new()),
            epochs: Mutex::new(HashMap::new()),
            outputs: Mutex::new(Vec::new()),
            cap: cap.clamp(1, 10_000),
        }
    }

    pub fn record_comment(&self, topic_id: &str, comment: VerifiedComment) {
        let mut all = lock(&self.comments);
        let list = all.entry(topic_id.to_string()).or_default();
        if !list.iter().any(|c| c.comment_id == comment.comment_id) {
            list.push(comment);
        }
    }

    pub fn remove_comment(&self, topic_id: &str, comment_id: &str) {
        if let Some(list) = lock(&self.comments).get_mut(topic_id) {
            list.retain(|c| c.comment_id != comment_id);
        }
    }

    pub fn bundles(&self) -> Vec<StoryBundle> {
        lock(&self.bundles).values().cloned().collect()
    }

    pub fn outputs(&self) -> Vec<TopicSynthesisOutput> {
        lock(&self.outputs).clone()
    }

    pub fn latest_output(&self, topic_id: &str) -> Option<TopicSynthesisOutput> {
        lock(&self.outputs)
            .iter()
            .rev()
            .find(|o| o.topic_id == topic_id)
            .cloned()
    }

    /// Epoch meta as of `now`: the per-day counter resets on UTC day change.
    pub fn epoch_meta_at(&self, topic_id: &str, now: u64) -> TopicEpochMeta {
        let ledger = lock(&self.epochs).get(topic_id).copied().unwrap_or_default();
        TopicEpochMeta {
            current_epoch: ledger.current_epoch,
            last_epoch_timestamp: ledger.last_epoch_timestamp,
            epochs_today: if ledger.day == now / DAY_MS {
                ledger.epochs_today
            } else {
                0
            },
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(1_000)
    }
}

#[async_trait]
impl StoryWriter for MemoryStore {
    async fn write_story_bundle(&self, bundle: &StoryBundle) -> Result<()> {
        lock(&self.bundles).insert(bundle.story_id.clone(), bundle.clone());
        Ok(())
    }
}

impl EpochContext for MemoryStore {
    /// Topics with no history start at epoch 0.
    fn topic_epoch_meta(&self, topic_id: &str) -> Option<TopicEpochMeta> {
        Some(self.epoch_meta_at(topic_id, now_ms()))
    }

    fn verified_comments(&self, topic_id: &str, window_start: u64, window_end: u64) -> Vec<VerifiedComment> {
        lock(&self.comments)
            .get(topic_id)
            .map(|list| {
                list.iter()
                    .filter(|c| (window_start..=window_end).contains(&c.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl SynthesisSink for MemoryStore {
    fn on_synthesis_produced(&self, output: &TopicSynthesisOutput) {
        {
            let mut epochs = lock(&self.epochs);
            let ledger = epochs.entry(output.topic_id.clone()).or_default();
            let day = output.created_at / DAY_MS;
            ledger.epochs_today = if ledger.day == day { ledger.epochs_today + 1 } else { 1 };
            ledger.day = day;
            ledger.current_epoch = output.epoch;
            ledger.last_epoch_timestamp = Some(output.created_at);
        }

        let mut outputs = lock(&self.outputs);
        outputs.push(output.clone());
        if outputs.len() > self.cap {
            let excess = outputs.len() - self.cap;
            outputs.drain(0..excess);
        }
    }

    fn on_epoch_opened(&self, topic_id: &str, epoch: u64, digest: &TopicDigest) {
        tracing::info!(
            target: "synthesis",
            topic = %topic_id,
            epoch,
            digest = %digest.digest_id,
            claims = digest.key_claims.len(),
            "awaiting candidates"
        );
    }
}
