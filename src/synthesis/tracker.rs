// src/synthesis/tracker.rs
//! Per-topic verified comment activity since the last acknowledged epoch.

use std::collections::HashMap;

use crate::synthesis::types::{CommentActivity, CommentEvent, CommentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerThresholds {
    pub comment_threshold: usize,
    pub unique_principal_min: usize,
}

impl Default for TrackerThresholds {
    fn default() -> Self {
        Self {
            comment_threshold: 10,
            unique_principal_min: 3,
        }
    }
}

#[derive(Debug, Default)]
struct TopicActivity {
    /// comment_id -> principal_hash, live comments only
    comments: HashMap<String, String>,
    /// principal_hash -> live comment count
    principals: HashMap<String, usize>,
}

impl TopicActivity {
    fn add(&mut self, comment_id: &str, principal: &str) {
        if self.comments.contains_key(comment_id) {
            return;
        }
        self.comments.insert(comment_id.to_string(), principal.to_string());
        *self.principals.entry(principal.to_string()).or_default() += 1;
    }

    fn retract(&mut self, comment_id: &str) {
        let Some(principal) = self.comments.remove(comment_id) else {
            return;
        };
        if let Some(n) = self.principals.get_mut(&principal) {
            *n -= 1;
            if *n == 0 {
                self.principals.remove(&principal);
            }
        }
    }

    fn activity(&self) -> CommentActivity {
        CommentActivity {
            comment_count: self.comments.len(),
            unique_principals: self.principals.len(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CommentTracker {
    thresholds: TrackerThresholds,
    topics: HashMap<String, TopicActivity>,
}

impl CommentTracker {
    pub fn new(thresholds: TrackerThresholds) -> Self {
        Self {
            thresholds,
            topics: HashMap::new(),
        }
    }

    /// Apply one event. Replays are idempotent: duplicate adds and unknown
    /// retracts are ignored. Retracts apply regardless of `verified`.
    pub fn on_comment(&mut self, event: &CommentEvent) {
        match event.kind {
            CommentKind::Add => {
                if !event.verified {
                    return;
                }
                self.topics
                    .entry(event.topic_id.clone())
                    .or_default()
                    .add(&event.comment_id, &event.principal_hash);
            }
            CommentKind::Retract => {
                if let Some(t) = self.topics.get_mut(&event.topic_id) {
                    t.retract(&event.comment_id);
                }
            }
        }
    }

    pub fn activity(&self, topic_id: &str) -> CommentActivity {
        self.topics
            .get(topic_id)
            .map(TopicActivity::activity)
            .unwrap_or_default()
    }

    pub fn comment_count(&self, topic_id: &str) -> usize {
        self.activity(topic_id).comment_count
    }

    pub fn unique_principal_count(&self, topic_id: &str) -> usize {
        self.activity(topic_id).unique_principals
    }

    pub fn should_trigger_resynthesis(&self, topic_id: &str) -> bool {
        let a = self.activity(topic_id);
        a.comment_count >= self.thresholds.comment_threshold
            && a.unique_principals >= self.thresholds.unique_principal_min
    }

    /// Reset this topic's counters after an epoch was opened.
    pub fn acknowledge_epoch(&mut self, topic_id: &str) {
        self.topics.remove(topic_id);
    }
}
