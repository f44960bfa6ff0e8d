// src/synthesis/resynthesis.rs
//! Tracker + scheduler + digest wiring: decides when a topic opens a new
//! epoch and builds the digest for it.

use crate::synthesis::digest::{build_digest, DigestInput};
use crate::synthesis::scheduler::{evaluate_epoch_eligibility, EpochDecision, EpochSchedulerInput};
use crate::synthesis::tracker::{CommentTracker, TrackerThresholds};
use crate::synthesis::types::{
    CommentEvent, DigestConfig, SynthesisConfig, TopicDigest, TopicEpochMeta, VerifiedComment,
};

/// Host-side lookups the orchestrator needs. Both are read-only.
pub trait EpochContext: Send + Sync {
    fn topic_epoch_meta(&self, topic_id: &str) -> Option<TopicEpochMeta>;

    /// Only called once the scheduler allowed an epoch.
    fn verified_comments(&self, topic_id: &str, window_start: u64, window_end: u64) -> Vec<VerifiedComment>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResynthesisCheck {
    pub triggered: bool,
    /// `None` when the evaluation stopped before the scheduler ran.
    pub eligibility: Option<EpochDecision>,
    pub digest: Option<TopicDigest>,
    /// Epoch metadata the decision was made against.
    pub meta: Option<TopicEpochMeta>,
}

impl ResynthesisCheck {
    fn skipped() -> Self {
        Self {
            triggered: false,
            eligibility: None,
            digest: None,
            meta: None,
        }
    }
}

#[derive(Debug)]
pub struct ResynthesisOrchestrator {
    enabled: bool,
    tracker: CommentTracker,
    config: SynthesisConfig,
    digest_config: DigestConfig,
}

impl ResynthesisOrchestrator {
    pub fn new(enabled: bool, config: SynthesisConfig, digest_config: DigestConfig) -> Self {
        let thresholds = TrackerThresholds {
            comment_threshold: config.resynthesis_comment_threshold,
            unique_principal_min: config.resynthesis_unique_principal_min,
        };
        Self {
            enabled,
            tracker: CommentTracker::new(thresholds),
            config,
            digest_config,
        }
    }

    pub fn on_comment(&mut self, event: &CommentEvent) {
        if self.enabled {
            self.tracker.on_comment(event);
        }
    }

    /// Counters are reset only when an epoch is actually triggered; a blocked
    /// evaluation keeps the accumulated activity.
    pub fn evaluate(&mut self, topic_id: &str, ctx: &dyn EpochContext, now: u64) -> ResynthesisCheck {
        if !self.enabled || !self.tracker.should_trigger_resynthesis(topic_id) {
            return ResynthesisCheck::skipped();
        }
        let Some(meta) = ctx.topic_epoch_meta(topic_id) else {
            tracing::debug!(target: "synthesis", topic = %topic_id, "no epoch metadata; evaluation skipped");
            return ResynthesisCheck::skipped();
        };

        let activity = self.tracker.activity(topic_id);
        let decision = evaluate_epoch_eligibility(
            &EpochSchedulerInput {
                current_epoch: meta.current_epoch,
                comment_count_since_last: activity.comment_count,
                unique_principals_since_last: activity.unique_principals,
                last_epoch_timestamp: meta.last_epoch_timestamp,
                epochs_today: meta.epochs_today,
                now,
            },
            &self.config,
        );

        if !decision.allowed {
            tracing::debug!(
                target: "synthesis",
                topic = %topic_id,
                blocked_by = ?decision.blocked_by,
                "epoch blocked"
            );
            return ResynthesisCheck {
                triggered: false,
                eligibility: Some(decision),
                digest: None,
                meta: Some(meta),
            };
        }

        let window_start = meta.last_epoch_timestamp.unwrap_or(0);
        let comments = ctx.verified_comments(topic_id, window_start, now);
        let digest = match build_digest(
            &DigestInput {
                topic_id,
                window_start,
                window_end: now,
                comments: &comments,
                verified_comment_count: activity.comment_count,
                unique_verified_principals: activity.unique_principals,
            },
            &self.digest_config,
        ) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(target: "synthesis", topic = %topic_id, error = %e, "digest build failed; epoch not opened");
                return ResynthesisCheck {
                    triggered: false,
                    eligibility: Some(decision),
                    digest: None,
                    meta: Some(meta),
                };
            }
        };

        self.tracker.acknowledge_epoch(topic_id);

        ResynthesisCheck {
            triggered: true,
            eligibility: Some(decision),
            digest: Some(digest),
            meta: Some(meta),
        }
    }

    pub fn comment_count(&self, topic_id: &str) -> usize {
        self.tracker.comment_count(topic_id)
    }

    pub fn unique_principal_count(&self, topic_id: &str) -> usize {
        self.tracker.unique_principal_count(topic_id)
    }
}
