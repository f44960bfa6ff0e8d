// src/synthesis/gatherer.rs
//! Per-topic candidate gathering windows.
//!
//! A window opens when an epoch is triggered, collects candidates until
//! quorum or timeout, and is removed from the registry when it closes.

use std::collections::HashMap;

use crate::error::AdmissionRejection;
use crate::synthesis::types::{SynthesisCandidate, SynthesisConfig, TopicDigest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherStatus {
    Gathering,
    QuorumReached,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct GathererState {
    pub topic_id: String,
    pub epoch: u64,
    pub candidates: Vec<SynthesisCandidate>,
    pub opened_at: u64,
    pub config: SynthesisConfig,
    /// Digest that opened the window, carried into the output's inputs.
    pub digest: Option<TopicDigest>,
}

impl GathererState {
    pub fn new(topic_id: &str, epoch: u64, opened_at: u64, config: SynthesisConfig) -> Self {
        Self {
            topic_id: topic_id.to_string(),
            epoch,
            candidates: Vec::new(),
            opened_at,
            config,
            digest: None,
        }
    }

    pub fn status(&self, now: u64) -> GatherStatus {
        if self.candidates.len() >= self.config.quorum_size {
            GatherStatus::QuorumReached
        } else if now.saturating_sub(self.opened_at) >= self.config.candidate_timeout_ms {
            GatherStatus::TimedOut
        } else {
            GatherStatus::Gathering
        }
    }

    /// Validate and append. Returns the status after admission.
    pub fn admit(&mut self, candidate: SynthesisCandidate, now: u64) -> Result<GatherStatus, AdmissionRejection> {
        candidate.validate()?;
        if candidate.topic_id != self.topic_id {
            return Err(AdmissionRejection::TopicMismatch {
                expected: self.topic_id.clone(),
                got: candidate.topic_id,
            });
        }
        if candidate.epoch != self.epoch {
            return Err(AdmissionRejection::EpochMismatch {
                expected: self.epoch,
                got: candidate.epoch,
            });
        }
        if self.candidates.iter().any(|c| c.candidate_id == candidate.candidate_id) {
            return Err(AdmissionRejection::DuplicateCandidate {
                candidate_id: candidate.candidate_id,
            });
        }
        self.candidates.push(candidate);
        Ok(self.status(now))
    }
}

/// Open windows keyed by topic. At most one per topic.
#[derive(Debug, Default)]
pub struct GathererRegistry {
    open: HashMap<String, GathererState>,
}

impl GathererRegistry {
    pub fn open(&mut self, state: GathererState) {
        self.open.insert(state.topic_id.clone(), state);
    }

    pub fn get(&self, topic_id: &str) -> Option<&GathererState> {
        self.open.get(topic_id)
    }

    pub fn get_mut(&mut self, topic_id: &str) -> Option<&mut GathererState> {
        self.open.get_mut(topic_id)
    }

    pub fn is_open(&self, topic_id: &str) -> bool {
        self.open.contains_key(topic_id)
    }

    pub fn close(&mut self, topic_id: &str) -> Option<GathererState> {
        self.open.remove(topic_id)
    }

    /// Topics whose window timed out at `now`, sorted for stable sweeps.
    pub fn timed_out(&self, now: u64) -> Vec<String> {
        let mut topics: Vec<String> = self
            .open
            .values()
            .filter(|s| s.status(now) == GatherStatus::TimedOut)
            .map(|s| s.topic_id.clone())
            .collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
