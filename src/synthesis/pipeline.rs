// src/synthesis/pipeline.rs
//! The runnable synthesis producer: comment events in, at most one
//! `TopicSynthesisOutput` per completed epoch out.

use std::sync::Arc;

use metrics::counter;

use crate::error::{AdmissionRejection, ValidationError};
use crate::synthesis::ensure_metrics_described;
use crate::synthesis::gatherer::{GatherStatus, GathererRegistry, GathererState};
use crate::synthesis::resynthesis::{EpochContext, ResynthesisCheck, ResynthesisOrchestrator};
use crate::synthesis::selector::{run_epoch, EpochClose};
use crate::synthesis::types::{
    CommentEvent, DigestConfig, SynthesisCandidate, SynthesisConfig, TopicDigest, TopicSynthesisOutput,
};

/// Receives pipeline results.
pub trait SynthesisSink: Send + Sync {
    /// Called at most once per completed epoch.
    fn on_synthesis_produced(&self, output: &TopicSynthesisOutput);

    /// A gathering window opened; candidate producers can be asked now.
    fn on_epoch_opened(&self, _topic_id: &str, _epoch: u64, _digest: &TopicDigest) {}
}

pub struct TopicSynthesisPipeline {
    enabled: bool,
    config: SynthesisConfig,
    orchestrator: ResynthesisOrchestrator,
    gatherers: GathererRegistry,
    context: Arc<dyn EpochContext>,
    sink: Option<Arc<dyn SynthesisSink>>,
}

impl TopicSynthesisPipeline {
    pub fn new(
        enabled: bool,
        config: SynthesisConfig,
        digest_config: DigestConfig,
        context: Arc<dyn EpochContext>,
        sink: Option<Arc<dyn SynthesisSink>>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        ensure_metrics_described();
        Ok(Self {
            enabled,
            config,
            orchestrator: ResynthesisOrchestrator::new(enabled, config, digest_config),
            gatherers: GathererRegistry::default(),
            context,
            sink,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Feed one event and evaluate its topic.
    ///
    /// While a window is open for the topic, activity keeps accumulating but
    /// no new epoch is evaluated until that window closes.
    pub fn on_comment_event(&mut self, event: &CommentEvent, now: u64) -> Result<ResynthesisCheck, ValidationError> {
        if !self.enabled {
            return Ok(ResynthesisCheck {
                triggered: false,
                eligibility: None,
                digest: None,
                meta: None,
            });
        }
        event.validate()?;
        self.orchestrator.on_comment(event);

        if self.gatherers.is_open(&event.topic_id) {
            return Ok(ResynthesisCheck {
                triggered: false,
                eligibility: None,
                digest: None,
                meta: None,
            });
        }

        let check = self.orchestrator.evaluate(&event.topic_id, self.context.as_ref(), now);
        if let (true, Some(meta), Some(digest)) = (check.triggered, check.meta, check.digest.as_ref()) {
            self.open_window(&event.topic_id, meta.current_epoch + 1, digest.clone(), now);
        }
        Ok(check)
    }

    fn open_window(&mut self, topic_id: &str, epoch: u64, digest: TopicDigest, now: u64) {
        let mut state = GathererState::new(topic_id, epoch, now, self.config);
        if let Some(sink) = &self.sink {
            sink.on_epoch_opened(topic_id, epoch, &digest);
        }
        state.digest = Some(digest);
        self.gatherers.open(state);

        counter!("synthesis_epochs_opened_total").increment(1);
        tracing::info!(target: "synthesis", topic = %topic_id, epoch, "gathering window opened");
    }

    /// Admit a candidate into the topic's open window. Reaching quorum closes
    /// the window and returns the emitted output.
    pub fn add_candidate(
        &mut self,
        topic_id: &str,
        candidate: SynthesisCandidate,
        now: u64,
    ) -> Result<Option<TopicSynthesisOutput>, AdmissionRejection> {
        let result = self.admit(topic_id, candidate, now);
        match result {
            Ok(GatherStatus::QuorumReached) => Ok(self.complete(topic_id, now, false)),
            Ok(_) => Ok(None),
            Err(rejection) => {
                counter!("synthesis_candidates_rejected_total").increment(1);
                tracing::debug!(target: "synthesis", topic = %topic_id, reason = %rejection, "candidate rejected");
                Err(rejection)
            }
        }
    }

    fn admit(&mut self, topic_id: &str, candidate: SynthesisCandidate, now: u64) -> Result<GatherStatus, AdmissionRejection> {
        if !self.enabled {
            return Err(AdmissionRejection::Disabled);
        }
        let state = self
            .gatherers
            .get_mut(topic_id)
            .ok_or_else(|| AdmissionRejection::NoActiveGatherer {
                topic_id: topic_id.to_string(),
            })?;
        state.admit(candidate, now)
    }

    /// Close every window past its timeout. Windows with no candidates close
    /// silently.
    pub fn check_timeouts(&mut self, now: u64) -> Vec<TopicSynthesisOutput> {
        if !self.enabled {
            return Vec::new();
        }
        self.gatherers
            .timed_out(now)
            .into_iter()
            .filter_map(|topic| self.complete(&topic, now, true))
            .collect()
    }

    fn complete(&mut self, topic_id: &str, now: u64, timed_out: bool) -> Option<TopicSynthesisOutput> {
        let state = self.gatherers.close(topic_id)?;
        let output = run_epoch(EpochClose {
            topic_id: &state.topic_id,
            epoch: state.epoch,
            candidates: &state.candidates,
            digest: state.digest.as_ref(),
            quorum_required: state.config.quorum_size,
            timed_out,
            now,
        });

        match &output {
            Some(out) => {
                counter!("synthesis_outputs_total", "timed_out" => timed_out.to_string()).increment(1);
                tracing::info!(
                    target: "synthesis",
                    topic = %topic_id,
                    epoch = state.epoch,
                    received = out.quorum.received,
                    timed_out,
                    synthesis_id = %out.synthesis_id,
                    "synthesis produced"
                );
                if let Some(sink) = &self.sink {
                    sink.on_synthesis_produced(out);
                }
            }
            None => {
                tracing::info!(target: "synthesis", topic = %topic_id, epoch = state.epoch, "window closed without candidates");
            }
        }
        output
    }

    pub fn comment_count(&self, topic_id: &str) -> usize {
        self.orchestrator.comment_count(topic_id)
    }

    pub fn unique_principal_count(&self, topic_id: &str) -> usize {
        self.orchestrator.unique_principal_count(topic_id)
    }

    pub fn has_active_gatherer(&self, topic_id: &str) -> bool {
        self.gatherers.is_open(topic_id)
    }

    /// Epoch of the open window, if any.
    pub fn active_epoch(&self, topic_id: &str) -> Option<u64> {
        self.gatherers.get(topic_id).map(|s| s.epoch)
    }
}
