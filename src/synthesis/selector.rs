// src/synthesis/selector.rs
//! Deterministic selection over a gathered candidate set.
//!
//! The smallest `candidate_id` wins, so every observer of the same set picks
//! the same candidate regardless of arrival order.

use std::collections::{BTreeMap, BTreeSet};

use crate::synthesis::types::{
    DivergenceMetrics, ProviderCount, QuorumRecord, SynthesisCandidate, SynthesisInputs,
    SynthesisProvenance, TopicDigest, TopicSynthesisOutput, SELECTION_RULE,
    TOPIC_SYNTHESIS_SCHEMA_VERSION,
};

pub fn select_candidate(candidates: &[SynthesisCandidate]) -> Option<&SynthesisCandidate> {
    candidates.iter().min_by(|a, b| a.candidate_id.cmp(&b.candidate_id))
}

pub fn derive_synthesis_id(topic_id: &str, epoch: u64, candidate_id: &str) -> String {
    format!("synth-{topic_id}-{epoch}-{candidate_id}")
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

pub fn compute_divergence_metrics(candidates: &[SynthesisCandidate]) -> DivergenceMetrics {
    let n = candidates.len();
    if n <= 1 {
        return DivergenceMetrics {
            disagreement_score: 0.0,
            source_dispersion: 0.0,
            candidate_count: n,
        };
    }
    let providers: BTreeSet<&str> = candidates
        .iter()
        .map(|c| c.provider.provider_id.as_str())
        .collect();
    let with_hints = candidates
        .iter()
        .filter(|c| !c.divergence_hints.is_empty())
        .count();

    DivergenceMetrics {
        disagreement_score: round3(with_hints as f64 / n as f64),
        source_dispersion: round3(providers.len() as f64 / n as f64),
        candidate_count: n,
    }
}

/// Candidate count per provider, sorted by provider id.
pub fn compute_provider_mix(candidates: &[SynthesisCandidate]) -> Vec<ProviderCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for c in candidates {
        *counts.entry(c.provider.provider_id.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(provider_id, count)| ProviderCount {
            provider_id: provider_id.to_string(),
            count,
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct EpochClose<'a> {
    pub topic_id: &'a str,
    pub epoch: u64,
    pub candidates: &'a [SynthesisCandidate],
    pub digest: Option<&'a TopicDigest>,
    pub quorum_required: usize,
    pub timed_out: bool,
    pub now: u64,
}

/// Build the terminal record for a closed window; `None` when nothing was
/// gathered.
pub fn run_epoch(close: EpochClose<'_>) -> Option<TopicSynthesisOutput> {
    let selected = select_candidate(close.candidates)?;

    Some(TopicSynthesisOutput {
        schema_version: TOPIC_SYNTHESIS_SCHEMA_VERSION.to_string(),
        synthesis_id: derive_synthesis_id(close.topic_id, close.epoch, &selected.candidate_id),
        topic_id: close.topic_id.to_string(),
        epoch: close.epoch,
        inputs: SynthesisInputs {
            topic_digest_ids: close.digest.map(|d| vec![d.digest_id.clone()]),
            ..Default::default()
        },
        quorum: QuorumRecord {
            required: close.quorum_required,
            received: close.candidates.len(),
            reached_at: close.now,
            timed_out: close.timed_out,
            selection_rule: SELECTION_RULE.to_string(),
        },
        facts_summary: selected.facts_summary.clone(),
        frames: selected.frames.clone(),
        warnings: selected.warnings.clone(),
        divergence_metrics: compute_divergence_metrics(close.candidates),
        provenance: SynthesisProvenance {
            candidate_ids: close
                .candidates
                .iter()
                .map(|c| c.candidate_id.clone())
                .collect(),
            provider_mix: compute_provider_mix(close.candidates),
        },
        created_at: close.now,
    })
}
