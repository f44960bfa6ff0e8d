use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::cluster::StoryBundle;
use crate::runtime::{now_ms, NewsRuntimeHandle};
use crate::store::MemoryStore;
use crate::synthesis::scheduler::EpochBlockReason;
use crate::synthesis::types::{
    CommentEvent, CommentKind, Stance, SynthesisCandidate, TopicSynthesisOutput, VerifiedComment,
};
use crate::synthesis::TopicSynthesisPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Mutex<TopicSynthesisPipeline>>,
    pub store: Arc<MemoryStore>,
    pub runtime: Option<NewsRuntimeHandle>,
}

impl AppState {
    fn pipeline(&self) -> MutexGuard<'_, TopicSynthesisPipeline> {
        self.pipeline.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/comments", post(post_comment))
        .route("/candidates", post(post_candidate))
        .route("/topics/{topic_id}", get(topic_status))
        .route("/stories", get(list_stories))
        .route("/runtime", get(runtime_status))
        .route("/admin/sweep-timeouts", post(sweep_timeouts))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Comment event plus the content a digest may quote. Content is only kept
/// for verified adds.
#[derive(Debug, Deserialize)]
pub struct CommentReq {
    pub comment_id: String,
    pub topic_id: String,
    pub principal_hash: String,
    #[serde(default)]
    pub verified: bool,
    pub kind: CommentKind,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub stance: Option<Stance>,
}

#[derive(Debug, Serialize)]
pub struct CommentResp {
    pub triggered: bool,
    pub blocked_by: Vec<EpochBlockReason>,
    pub digest_id: Option<String>,
    pub comment_count: usize,
    pub unique_principals: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResp {
    pub error: String,
}

fn err(status: StatusCode, msg: impl ToString) -> (StatusCode, Json<ErrorResp>) {
    (status, Json(ErrorResp { error: msg.to_string() }))
}

async fn post_comment(
    State(state): State<AppState>,
    Json(body): Json<CommentReq>,
) -> Result<Json<CommentResp>, (StatusCode, Json<ErrorResp>)> {
    let now = now_ms();
    let event = CommentEvent {
        comment_id: body.comment_id,
        topic_id: body.topic_id,
        principal_hash: body.principal_hash,
        verified: body.verified,
        kind: body.kind,
        timestamp: body.timestamp.unwrap_or(now),
    };
    event
        .validate()
        .map_err(|e| err(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    match event.kind {
        CommentKind::Add if event.verified => {
            if let Some(content) = body.content {
                state.store.record_comment(
                    &event.topic_id,
                    VerifiedComment {
                        comment_id: event.comment_id.clone(),
                        content,
                        stance: body.stance.unwrap_or(Stance::Discuss),
                        principal_hash: event.principal_hash.clone(),
                        timestamp: event.timestamp,
                    },
                );
            }
        }
        CommentKind::Retract => state.store.remove_comment(&event.topic_id, &event.comment_id),
        CommentKind::Add => {}
    }

    let mut pipeline = state.pipeline();
    let check = pipeline
        .on_comment_event(&event, now)
        .map_err(|e| err(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    Ok(Json(CommentResp {
        triggered: check.triggered,
        blocked_by: check.eligibility.map(|d| d.blocked_by).unwrap_or_default(),
        digest_id: check.digest.map(|d| d.digest_id),
        comment_count: pipeline.comment_count(&event.topic_id),
        unique_principals: pipeline.unique_principal_count(&event.topic_id),
    }))
}

#[derive(Debug, Serialize)]
pub struct CandidateResp {
    pub accepted: bool,
    pub synthesis: Option<TopicSynthesisOutput>,
}

async fn post_candidate(
    State(state): State<AppState>,
    Json(candidate): Json<SynthesisCandidate>,
) -> Result<Json<CandidateResp>, (StatusCode, Json<ErrorResp>)> {
    let topic_id = candidate.topic_id.clone();
    let synthesis = state
        .pipeline()
        .add_candidate(&topic_id, candidate, now_ms())
        .map_err(|rejection| err(StatusCode::CONFLICT, rejection))?;
    Ok(Json(CandidateResp {
        accepted: true,
        synthesis,
    }))
}

#[derive(Debug, Serialize)]
pub struct TopicStatusResp {
    pub topic_id: String,
    pub comment_count: usize,
    pub unique_principals: usize,
    pub active_epoch: Option<u64>,
    pub latest: Option<TopicSynthesisOutput>,
}

async fn topic_status(State(state): State<AppState>, Path(topic_id): Path<String>) -> Json<TopicStatusResp> {
    let (comment_count, unique_principals, active_epoch) = {
        let p = state.pipeline();
        (
            p.comment_count(&topic_id),
            p.unique_principal_count(&topic_id),
            p.active_epoch(&topic_id),
        )
    };
    Json(TopicStatusResp {
        latest: state.store.latest_output(&topic_id),
        topic_id,
        comment_count,
        unique_principals,
        active_epoch,
    })
}

async fn list_stories(State(state): State<AppState>) -> Json<Vec<StoryBundle>> {
    Json(state.store.bundles())
}

#[derive(Debug, Serialize)]
pub struct RuntimeResp {
    pub running: bool,
    pub last_run: Option<String>,
}

async fn runtime_status(State(state): State<AppState>) -> Json<RuntimeResp> {
    let (running, last_run) = match &state.runtime {
        Some(h) => (h.is_running(), h.last_run().map(|t| t.to_rfc3339())),
        None => (false, None),
    };
    Json(RuntimeResp { running, last_run })
}

#[derive(Debug, Serialize)]
pub struct SweepResp {
    pub closed: Vec<String>,
}

async fn sweep_timeouts(State(state): State<AppState>) -> Json<SweepResp> {
    let outputs = state.pipeline().check_timeouts(now_ms());
    Json(SweepResp {
        closed: outputs.into_iter().map(|o| o.synthesis_id).collect(),
    })
}
