//! Runtime error types for the FURROW orchestration pipeline.
//!
//! All fallible operations return `FurrowResult<T>`. The first eight variants
//! are the caller-facing taxonomy; the rest are runtime plumbing failures that
//! the controller folds into `InternalFailure` before anything reaches a caller.

use thiserror::Error;

/// The unified error type for the FURROW runtime.
#[derive(Debug, Error)]
pub enum FurrowError {
    /// The input gate denied the query.
    #[error("query blocked by guardrail ({category}): {reason}")]
    InputBlocked { category: String, reason: String },

    /// The output gate denied the draft answer and it cannot be revised.
    #[error("answer blocked by guardrail ({category}): {reason}")]
    OutputBlocked { category: String, reason: String },

    /// A capability exceeded its latency bound.
    #[error("capability '{capability}' timed out after {elapsed_ms} ms")]
    AgentTimeout { capability: String, elapsed_ms: u64 },

    /// A capability reported a hard failure.
    #[error("capability '{capability}' failed: {reason}")]
    AgentError { capability: String, reason: String },

    /// No capability matches the query's needs, or task input could not be built.
    #[error("planning error: {reason}")]
    PlanningError { reason: String },

    /// The draft kept failing verification past the revision ceiling.
    #[error("revision limit of {ceiling} reached without a verifiable answer")]
    RevisionLimitExceeded { ceiling: u32 },

    /// The job pool and its queue are saturated. Retry later.
    #[error("job submission rejected: {reason}")]
    JobSubmissionRejected { reason: String },

    /// Unclassified failure. Logged in full, surfaced generically.
    #[error("internal failure: {reason}")]
    InternalFailure { reason: String },

    /// Another controller holds the session lease.
    #[error("session '{session_id}' is busy")]
    SessionBusy { session_id: String },

    /// The lease expired or was released before the holder finished.
    #[error("lease on session '{session_id}' is no longer held")]
    LeaseLost { session_id: String },

    /// A referenced request, job, or session does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    /// An illegal state transition was attempted.
    #[error("state machine error: {reason}")]
    StateMachineError { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The backing store failed to read or write.
    #[error("store error: {reason}")]
    StoreError { reason: String },

    /// A payload did not conform to its declared JSON Schema.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },
}

impl FurrowError {
    /// True for conditions the caller should retry later rather than treat
    /// as a permanent rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FurrowError::JobSubmissionRejected { .. } | FurrowError::SessionBusy { .. }
        )
    }

    /// The message shown to the end user.
    ///
    /// Rejections carry their human-readable reason. Plumbing failures collapse
    /// to a generic message so no internal detail leaks out.
    pub fn public_message(&self) -> String {
        match self {
            FurrowError::InputBlocked { reason, .. } | FurrowError::OutputBlocked { reason, .. } => {
                reason.clone()
            }
            FurrowError::RevisionLimitExceeded { .. }
            | FurrowError::PlanningError { .. }
            | FurrowError::AgentTimeout { .. }
            | FurrowError::AgentError { .. } => self.to_string(),
            FurrowError::JobSubmissionRejected { .. } | FurrowError::SessionBusy { .. } => {
                "the service is busy, please retry later".to_string()
            }
            FurrowError::NotFound { kind, .. } => format!("{kind} not found"),
            FurrowError::InternalFailure { .. }
            | FurrowError::LeaseLost { .. }
            | FurrowError::StateMachineError { .. }
            | FurrowError::ConfigError { .. }
            | FurrowError::StoreError { .. }
            | FurrowError::SchemaValidation { .. } => {
                "the request could not be completed".to_string()
            }
        }
    }
}

/// Convenience alias used throughout the FURROW crates.
pub type FurrowResult<T> = Result<T, FurrowError>;
