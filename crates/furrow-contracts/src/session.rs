//! Session, lease, and transition-history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    guardrail::GuardrailVerdict,
    request::{RequestId, RequestState, SessionId},
};

/// Proof of exclusive ownership of a session's mutable state.
///
/// Held by exactly one controller at a time. The holder renews it before
/// `expires_at`; a lapsed lease may be taken over by another controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLease {
    pub session_id: SessionId,
    pub lease_id: uuid::Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One state-machine step, written to the session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub from: RequestState,
    pub to: RequestState,
    pub revision: u32,
    pub pass: u32,
    pub reason: String,
    /// The verdict that drove this transition, if a gate was involved.
    pub verdict: Option<GuardrailVerdict>,
    pub timestamp: DateTime<Utc>,
}

/// A conversation: its requests and the ceiling their revisions obey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub request_ids: Vec<RequestId>,
    pub revision_ceiling: u32,
    pub created_at: DateTime<Utc>,
    /// The request currently being driven under the lease, if any.
    pub active_request: Option<RequestId>,
    /// Number of history records appended so far.
    pub history_len: u64,
}

impl Session {
    pub fn new(id: SessionId, revision_ceiling: u32) -> Self {
        Self {
            id,
            request_ids: Vec::new(),
            revision_ceiling,
            created_at: Utc::now(),
            active_request: None,
            history_len: 0,
        }
    }
}
