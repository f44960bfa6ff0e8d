// src/synthesis/types.rs
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const TOPIC_SYNTHESIS_SCHEMA_VERSION: &str = "topic-synthesis-v2";
pub const SELECTION_RULE: &str = "deterministic";

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty { field })
    } else {
        Ok(())
    }
}

// --- Comment stream ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    Add,
    Retract,
}

/// One add/retract event. Participants only appear as hashes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentEvent {
    pub comment_id: String,
    pub topic_id: String,
    pub principal_hash: String,
    pub verified: bool,
    pub kind: CommentKind,
    pub timestamp: u64,
}

impl CommentEvent {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("comment_id", &self.comment_id)?;
        require("topic_id", &self.topic_id)?;
        require("principal_hash", &self.principal_hash)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentActivity {
    pub comment_count: usize,
    pub unique_principals: usize,
}

/// Supplied by the host; never mutated here.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicEpochMeta {
    pub current_epoch: u64,
    pub last_epoch_timestamp: Option<u64>,
    pub epochs_today: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Concur,
    Counter,
    Discuss,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedComment {
    pub comment_id: String,
    pub content: String,
    pub stance: Stance,
    pub principal_hash: String,
    pub timestamp: u64,
}

impl VerifiedComment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("comment_id", &self.comment_id)?;
        require("principal_hash", &self.principal_hash)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicDigest {
    pub digest_id: String,
    pub topic_id: String,
    pub window_start: u64,
    pub window_end: u64,
    pub verified_comment_count: usize,
    pub unique_verified_principals: usize,
    pub key_claims: Vec<String>,
    pub salient_counterclaims: Vec<String>,
    pub representative_quotes: Vec<String>,
}

// --- Candidates ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Frame {
    pub frame: String,
    pub reframe: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SynthesisProvider {
    pub provider_id: String,
    pub model_id: String,
    pub kind: ProviderKind,
}

/// One independently produced synthesis proposal for a topic epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SynthesisCandidate {
    pub candidate_id: String,
    pub topic_id: String,
    pub epoch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on_prior_epoch: Option<u64>,
    #[serde(default)]
    pub critique_notes: Vec<String>,
    pub facts_summary: String,
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub divergence_hints: Vec<String>,
    pub provider: SynthesisProvider,
    pub created_at: u64,
}

impl SynthesisCandidate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("candidate_id", &self.candidate_id)?;
        require("topic_id", &self.topic_id)?;
        require("facts_summary", &self.facts_summary)?;
        require("provider.provider_id", &self.provider.provider_id)?;
        require("provider.model_id", &self.provider.model_id)?;
        for f in &self.frames {
            require("frames.frame", &f.frame)?;
            require("frames.reframe", &f.reframe)?;
        }
        Ok(())
    }
}

// --- Output ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SynthesisInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_bundle_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_digest_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_seed_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuorumRecord {
    pub required: usize,
    pub received: usize,
    pub reached_at: u64,
    pub timed_out: bool,
    pub selection_rule: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DivergenceMetrics {
    pub disagreement_score: f64,
    pub source_dispersion: f64,
    pub candidate_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderCount {
    pub provider_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SynthesisProvenance {
    pub candidate_ids: Vec<String>,
    pub provider_mix: Vec<ProviderCount>,
}

/// Terminal record of one epoch. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicSynthesisOutput {
    pub schema_version: String,
    pub synthesis_id: String,
    pub topic_id: String,
    pub epoch: u64,
    pub inputs: SynthesisInputs,
    pub quorum: QuorumRecord,
    pub facts_summary: String,
    pub frames: Vec<Frame>,
    pub warnings: Vec<String>,
    pub divergence_metrics: DivergenceMetrics,
    pub provenance: SynthesisProvenance,
    pub created_at: u64,
}

// --- Config ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub quorum_size: usize,
    pub candidate_timeout_ms: u64,
    pub epoch_debounce_ms: u64,
    pub daily_epoch_cap_per_topic: u32,
    pub resynthesis_comment_threshold: usize,
    pub resynthesis_unique_principal_min: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            quorum_size: 5,
            candidate_timeout_ms: 86_400_000,
            epoch_debounce_ms: 1_800_000,
            daily_epoch_cap_per_topic: 4,
            resynthesis_comment_threshold: 10,
            resynthesis_unique_principal_min: 3,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let positive = [
            ("quorum_size", self.quorum_size as u64),
            ("candidate_timeout_ms", self.candidate_timeout_ms),
            ("epoch_debounce_ms", self.epoch_debounce_ms),
            ("daily_epoch_cap_per_topic", u64::from(self.daily_epoch_cap_per_topic)),
            ("resynthesis_comment_threshold", self.resynthesis_comment_threshold as u64),
            ("resynthesis_unique_principal_min", self.resynthesis_unique_principal_min as u64),
        ];
        for (field, v) in positive {
            if v == 0 {
                return Err(ValidationError::OutOfRange {
                    field,
                    detail: "must be positive".into(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DigestConfig {
    pub max_claims: usize,
    pub max_counterclaims: usize,
    pub max_quotes: usize,
    pub max_quote_length: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_claims: 10,
            max_counterclaims: 5,
            max_quotes: 5,
            max_quote_length: 280,
        }
    }
}
