// tests/pipeline_end_to_end.rs
//
// Comment activity -> epoch window -> candidates -> one synthesis, wired over
// the in-memory store exactly as the binary wires it.

use std::sync::Arc;

use topic_synthesis::error::AdmissionRejection;
use topic_synthesis::runtime::now_ms;
use topic_synthesis::store::MemoryStore;
use topic_synthesis::synthesis::types::{
    CommentEvent, CommentKind, DigestConfig, ProviderKind, Stance, SynthesisCandidate, SynthesisConfig,
    SynthesisProvider, VerifiedComment,
};
use topic_synthesis::synthesis::TopicSynthesisPipeline;

const TOPIC: &str = "T";

fn pipeline(store: &Arc<MemoryStore>, enabled: bool) -> TopicSynthesisPipeline {
    let cfg = SynthesisConfig {
        quorum_size: 2,
        ..Default::default()
    };
    TopicSynthesisPipeline::new(
        enabled,
        cfg,
        DigestConfig::default(),
        store.clone(),
        Some(store.clone()),
    )
    .expect("valid config")
}

fn candidate(id: &str, epoch: u64, provider: &str) -> SynthesisCandidate {
    SynthesisCandidate {
        candidate_id: id.into(),
        topic_id: TOPIC.into(),
        epoch,
        based_on_prior_epoch: None,
        critique_notes: vec![],
        facts_summary: format!("Summary from {id}"),
        frames: vec![],
        warnings: vec![],
        divergence_hints: vec![],
        provider: SynthesisProvider {
            provider_id: provider.into(),
            model_id: "m".into(),
            kind: ProviderKind::Local,
        },
        created_at: 0,
    }
}

/// Ten verified adds spread over principals u0..u2.
fn post_comments(p: &mut TopicSynthesisPipeline, store: &MemoryStore, now: u64) -> bool {
    let mut triggered = false;
    for i in 0..10 {
        let principal = format!("u{}", i % 3);
        let id = format!("c-{i}");
        store.record_comment(
            TOPIC,
            VerifiedComment {
                comment_id: id.clone(),
                content: format!("Point number {i}"),
                stance: if i % 4 == 0 { Stance::Counter } else { Stance::Concur },
                principal_hash: principal.clone(),
                timestamp: now - 100 + i,
            },
        );
        let check = p
            .on_comment_event(
                &CommentEvent {
                    comment_id: id,
                    topic_id: TOPIC.into(),
                    principal_hash: principal,
                    verified: true,
                    kind: CommentKind::Add,
                    timestamp: now - 100 + i,
                },
                now,
            )
            .expect("valid event");
        triggered |= check.triggered;
    }
    triggered
}

#[test]
fn quorum_of_two_produces_exactly_one_output() {
    let store = Arc::new(MemoryStore::default());
    let mut p = pipeline(&store, true);
    let now = now_ms();

    assert!(post_comments(&mut p, &store, now), "tenth comment should open an epoch");
    assert_eq!(p.active_epoch(TOPIC), Some(1));

    assert_eq!(p.add_candidate(TOPIC, candidate("c1", 1, "p-a"), now).unwrap(), None);
    let out = p
        .add_candidate(TOPIC, candidate("c2", 1, "p-b"), now)
        .unwrap()
        .expect("quorum reached");

    assert_eq!(out.epoch, 1);
    assert_eq!(out.quorum.required, 2);
    assert_eq!(out.quorum.received, 2);
    assert!(!out.quorum.timed_out);
    assert_eq!(out.provenance.candidate_ids, vec!["c1", "c2"]);
    assert_eq!(out.synthesis_id, "synth-T-1-c1");
    assert_eq!(out.facts_summary, "Summary from c1");
    assert_eq!(out.inputs.topic_digest_ids.as_ref().map(Vec::len), Some(1));

    // the window is gone and the sink saw exactly one output
    assert!(!p.has_active_gatherer(TOPIC));
    assert_eq!(store.outputs().len(), 1);
    assert_eq!(store.epoch_meta_at(TOPIC, now).current_epoch, 1);

    let late = p.add_candidate(TOPIC, candidate("c3", 1, "p-c"), now);
    assert!(matches!(late, Err(AdmissionRejection::NoActiveGatherer { .. })));
}

#[test]
fn mismatched_candidates_are_rejected_without_closing() {
    let store = Arc::new(MemoryStore::default());
    let mut p = pipeline(&store, true);
    let now = now_ms();
    post_comments(&mut p, &store, now);

    let wrong_epoch = p.add_candidate(TOPIC, candidate("c1", 7, "p"), now);
    assert_eq!(
        wrong_epoch,
        Err(AdmissionRejection::EpochMismatch { expected: 1, got: 7 })
    );

    assert_eq!(p.add_candidate(TOPIC, candidate("c1", 1, "p"), now).unwrap(), None);
    let dup = p.add_candidate(TOPIC, candidate("c1", 1, "p"), now);
    assert!(matches!(dup, Err(AdmissionRejection::DuplicateCandidate { .. })));
    assert!(p.has_active_gatherer(TOPIC));
    assert!(store.outputs().is_empty());
}

#[test]
fn timeout_sweep_closes_with_partial_quorum() {
    let store = Arc::new(MemoryStore::default());
    let mut p = pipeline(&store, true);
    let now = now_ms();
    post_comments(&mut p, &store, now);
    p.add_candidate(TOPIC, candidate("only", 1, "p"), now).unwrap();

    assert!(p.check_timeouts(now + 1).is_empty(), "not yet due");

    let closed = p.check_timeouts(now + SynthesisConfig::default().candidate_timeout_ms);
    assert_eq!(closed.len(), 1);
    assert!(closed[0].quorum.timed_out);
    assert_eq!(closed[0].quorum.received, 1);
    assert!(!p.has_active_gatherer(TOPIC));
}

#[test]
fn disabled_pipeline_is_inert() {
    let store = Arc::new(MemoryStore::default());
    let mut p = pipeline(&store, false);
    let now = now_ms();

    assert!(!post_comments(&mut p, &store, now));
    assert_eq!(p.comment_count(TOPIC), 0);
    assert_eq!(
        p.add_candidate(TOPIC, candidate("c1", 1, "p"), now),
        Err(AdmissionRejection::Disabled)
    );
    assert!(p.check_timeouts(u64::MAX).is_empty());
}
