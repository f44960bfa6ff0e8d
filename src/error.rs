use thiserror::Error;

/// A record failed boundary validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field `{field}` must be non-empty")]
    Empty { field: &'static str },

    #[error("field `{field}` is not an absolute http(s) url: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("field `{field}` is out of range: {detail}")]
    OutOfRange { field: &'static str, detail: String },
}

/// Why the gatherer refused a candidate. Ordinary outcome, not a fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionRejection {
    #[error("pipeline disabled")]
    Disabled,

    #[error("no active gatherer for topic {topic_id}")]
    NoActiveGatherer { topic_id: String },

    #[error("candidate topic {got} does not match open window {expected}")]
    TopicMismatch { expected: String, got: String },

    #[error("candidate epoch {got} does not match open window epoch {expected}")]
    EpochMismatch { expected: u64, got: u64 },

    #[error("candidate {candidate_id} already gathered")]
    DuplicateCandidate { candidate_id: String },

    #[error("invalid candidate: {0}")]
    Invalid(#[from] ValidationError),
}

/// Fatal construction-time problems for the ingestion runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeConfigError {
    #[error("poll interval must be a positive number of milliseconds, got {0}")]
    NonPositivePollInterval(i64),
}

/// Recoverable per-tick failure reported through the runtime's error callback.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("write_story_bundle adapter is required")]
    MissingWriteAdapter,

    #[error("writing story bundle {story_id} failed: {reason:#}")]
    Write {
        story_id: String,
        reason: anyhow::Error,
    },
}
