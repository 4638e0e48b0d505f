//! Request identity, lifecycle state machine, and caller-facing results.
//!
//! A `Request` is mutated only by the controller holding its session lease.
//! Every legal edge of the lifecycle is encoded in
//! [`RequestState::can_transition_to`]; `Request::transition` refuses anything
//! else with `FurrowError::StateMachineError`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    answer::{DraftAnswer, VerificationResult},
    capability::{CapabilityKind, Plan},
    error::{FurrowError, FurrowResult},
    guardrail::GuardrailVerdict,
    task::{AgentTask, EvidenceSource},
};

/// Stable identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a single submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub uuid::Uuid);

impl RequestId {
    /// Create a new, unique request ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a request inside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Received,
    GatedIn,
    Planning,
    Dispatched,
    Aggregating,
    Verifying,
    Revising,
    Complete,
    Rejected,
    Failed,
}

impl RequestState {
    /// True for `Complete`, `Rejected`, and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Complete | RequestState::Rejected | RequestState::Failed
        )
    }

    /// Return true if `self -> next` is an edge of the lifecycle.
    ///
    /// Any non-terminal state may move to `Failed`. Terminal states never move.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Received, GatedIn)
                | (Received, Rejected)
                | (GatedIn, Planning)
                | (Planning, Dispatched)
                | (Planning, Verifying)
                | (Dispatched, Aggregating)
                | (Aggregating, Verifying)
                | (Verifying, Complete)
                | (Verifying, Revising)
                | (Verifying, Rejected)
                | (Revising, Planning)
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestState::Received => "RECEIVED",
            RequestState::GatedIn => "GATED_IN",
            RequestState::Planning => "PLANNING",
            RequestState::Dispatched => "DISPATCHED",
            RequestState::Aggregating => "AGGREGATING",
            RequestState::Verifying => "VERIFYING",
            RequestState::Revising => "REVISING",
            RequestState::Complete => "COMPLETE",
            RequestState::Rejected => "REJECTED",
            RequestState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A reference from a delivered answer back to the evidence that supports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub task_id: crate::task::TaskId,
    pub capability: CapabilityKind,
    pub evidence_id: String,
    pub source: EvidenceSource,
    /// Human-readable reference, e.g. a label registration number.
    pub reference: String,
}

/// What a terminal request hands back to its caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub answer: Option<String>,
    pub citations: Vec<Citation>,
    pub rejection_reason: Option<String>,
    /// Set when the request failed for capacity reasons and may succeed later.
    #[serde(default)]
    pub retry_later: bool,
}

/// The view returned by `getResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub request_id: RequestId,
    pub status: RequestState,
    pub answer: Option<String>,
    pub citations: Vec<Citation>,
    pub rejection_reason: Option<String>,
    pub retry_later: bool,
}

/// A single user query and everything the controller has learned about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub session_id: SessionId,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RequestState,
    pub revision_count: u32,
    /// Planning pass counter, starting at 0.
    pub pass: u32,
    /// Added context accumulated from failed verifications, newest last.
    #[serde(default)]
    pub revision_context: Vec<String>,
    pub plan: Option<Plan>,
    /// Tasks of the current planning pass.
    #[serde(default)]
    pub tasks: Vec<AgentTask>,
    /// Tasks of earlier passes, kept so evidence stays traceable.
    #[serde(default)]
    pub archived_tasks: Vec<AgentTask>,
    pub draft: Option<DraftAnswer>,
    pub verification: Option<VerificationResult>,
    /// Every verdict issued for this request, in order.
    #[serde(default)]
    pub verdicts: Vec<GuardrailVerdict>,
    pub outcome: Option<RequestOutcome>,
}

impl Request {
    /// Create a request in the initial `Received` state.
    pub fn new(session_id: SessionId, query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RequestId::new(),
            session_id,
            query: query.into(),
            created_at: now,
            updated_at: now,
            state: RequestState::Received,
            revision_count: 0,
            pass: 0,
            revision_context: Vec::new(),
            plan: None,
            tasks: Vec::new(),
            archived_tasks: Vec::new(),
            draft: None,
            verification: None,
            verdicts: Vec::new(),
            outcome: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&mut self, next: RequestState) -> FurrowResult<RequestState> {
        if !self.state.can_transition_to(next) {
            return Err(FurrowError::StateMachineError {
                reason: format!(
                    "illegal transition {} -> {} for request {}",
                    self.state, next, self.id
                ),
            });
        }
        let previous = self.state;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// Move the current pass's tasks into the archive.
    pub fn archive_tasks(&mut self) {
        self.archived_tasks.append(&mut self.tasks);
    }

    /// Every task result recorded for this request across all passes.
    pub fn recorded_tasks(&self) -> impl Iterator<Item = &AgentTask> {
        self.archived_tasks.iter().chain(self.tasks.iter())
    }

    /// The most recent verdict, if any.
    pub fn last_verdict(&self) -> Option<&GuardrailVerdict> {
        self.verdicts.last()
    }

    /// Build the caller-facing view of this request.
    pub fn result(&self) -> QueryResult {
        let outcome = self.outcome.clone().unwrap_or_default();
        QueryResult {
            request_id: self.id,
            status: self.state,
            answer: outcome.answer,
            citations: outcome.citations,
            rejection_reason: outcome.rejection_reason,
            retry_later: outcome.retry_later,
        }
    }
}
