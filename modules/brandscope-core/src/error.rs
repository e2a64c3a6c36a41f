//! Typed errors for provider calls, evaluation and the pipeline surface.

use thiserror::Error;

/// Failure of a single external call (search or LLM provider).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The call exceeded its deadline and was abandoned
    #[error("provider call timed out")]
    Timeout,

    /// Provider answered HTTP 429
    #[error("provider quota exceeded")]
    QuotaExceeded,

    /// Body did not parse or did not match the requested schema
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Any other transport or API failure
    #[error("provider request failed: {0}")]
    Request(String),

    /// The caller's cancellation token fired
    #[error("cancelled")]
    Cancelled,
}

/// A structured evaluation parsed but broke the score contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{dimension} score {value} is outside 0..=100")]
    ScoreOutOfRange { dimension: &'static str, value: i64 },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Failure of one LLM-backed evaluation (scoring or identity grouping).
///
/// `Clone` so a single in-flight failure can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("memo key could not be derived: {0}")]
    Key(String),
}

impl EvaluationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EvaluationError::Provider(ProviderError::Cancelled))
    }
}

impl From<serde_json::Error> for EvaluationError {
    fn from(err: serde_json::Error) -> Self {
        EvaluationError::Key(err.to_string())
    }
}

/// Errors that reach callers of the pipeline. Provider trouble never does:
/// it degrades to partial, placeholder or fallback results instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("analysis cancelled")]
    Cancelled,

    #[error("entity name must not be empty")]
    InvalidEntityName,

    #[error("unknown identity candidate: {0}")]
    UnknownCandidate(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
