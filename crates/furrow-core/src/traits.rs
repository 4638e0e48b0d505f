//! Boundary trait definitions for the FURROW orchestration pipeline.
//!
//! These traits are the complete set of seams the controller talks through:
//!
//! - `GuardrailGate`: trusted gate (input and output policy)
//! - `CapabilityAgent`: untrusted external work (weather, registry, simulation)
//! - `JobQueue`: shared asynchronous job execution
//! - `SessionStore`: leased, durable request state and history
//! - `Planner`: which capabilities a request needs
//! - `Synthesizer`: draft answer from task results (may be model-backed)
//! - `EvidenceVerifier`: traces every claim of a draft back to evidence
//!
//! The controller wires them together. Capability agents are never called
//! unless the input gate returned `allow`.

use std::time::Duration;

use async_trait::async_trait;

use furrow_contracts::{
    answer::{DraftAnswer, VerificationResult},
    capability::{CapabilityKind, Plan},
    error::FurrowResult,
    guardrail::{GateContext, GuardrailVerdict},
    job::{JobId, JobRecord, JobSpec},
    request::{Request, RequestId, SessionId},
    session::{Session, SessionLease, TransitionRecord},
    task::{AgentTask, TaskHandle, TaskOutcome},
};

/// The policy gate evaluated at intake and before delivery.
///
/// Implementations must be pure functions of their inputs plus policy
/// configuration. An `Err` is never treated as `allow`: the controller turns
/// it into `block` (input) or `needs-revision` (output).
pub trait GuardrailGate: Send + Sync {
    fn evaluate(&self, content: &str, ctx: &GateContext) -> FurrowResult<GuardrailVerdict>;
}

/// Uniform contract over heterogeneous capability backends.
#[async_trait]
pub trait CapabilityAgent: Send + Sync {
    /// The capability this agent serves.
    fn kind(&self) -> CapabilityKind;

    /// Begin work on `task`.
    ///
    /// Bounded-latency agents may finish here and return a resolved handle.
    /// Job-backed agents return a handle bound to a job identity. Backend
    /// failures and timeouts belong in the resolved outcome; `Err` is for
    /// conditions the caller must see, such as `JobSubmissionRejected`.
    async fn submit(&self, task: &AgentTask) -> FurrowResult<TaskHandle>;

    /// Non-blocking status check.
    async fn poll(&self, handle: &TaskHandle) -> FurrowResult<TaskOutcome>;

    /// Best-effort cancellation. Work already executing may only be abandoned.
    async fn cancel(&self, handle: &TaskHandle) -> FurrowResult<()>;
}

/// Shared, bounded asynchronous job execution.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue `spec`. Identical pending or running specs return the existing ID.
    ///
    /// Fails fast with `JobSubmissionRejected` when the pool is saturated.
    async fn submit(&self, spec: JobSpec) -> FurrowResult<JobId>;

    async fn status(&self, job_id: &JobId) -> FurrowResult<JobRecord>;

    async fn cancel(&self, job_id: &JobId) -> FurrowResult<()>;
}

/// Leased, single-writer storage for requests and session history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Take the session lease.
    ///
    /// With `wait = None` a held lease fails immediately with `SessionBusy`.
    /// With `Some(d)` the call waits up to `d` for the holder to release.
    async fn acquire_lease(&self, session_id: &SessionId, wait: Option<Duration>) -> FurrowResult<SessionLease>;

    /// Push the lease expiry forward. `LeaseLost` if it lapsed or was released.
    async fn renew_lease(&self, lease: &SessionLease) -> FurrowResult<SessionLease>;

    async fn release_lease(&self, lease: SessionLease) -> FurrowResult<()>;

    /// Record a freshly received request. No lease needed: nothing else can
    /// hold a reference to it yet.
    async fn insert(&self, request: &Request) -> FurrowResult<()>;

    async fn load(&self, request_id: &RequestId) -> FurrowResult<Option<Request>>;

    /// Persist `request`. The lease must cover the request's session.
    async fn save(&self, lease: &SessionLease, request: &Request) -> FurrowResult<()>;

    /// Append one transition to the session history.
    async fn append_history(&self, lease: &SessionLease, record: TransitionRecord) -> FurrowResult<()>;

    async fn session(&self, session_id: &SessionId) -> FurrowResult<Option<Session>>;

    /// All stored requests that have not reached a terminal state.
    async fn pending(&self) -> FurrowResult<Vec<Request>>;
}

/// Decides which capabilities a planning pass needs.
pub trait Planner: Send + Sync {
    /// Build the plan for `request.pass`, using `request.revision_context`
    /// when re-planning. An empty plan is valid.
    fn plan(&self, request: &Request) -> FurrowResult<Plan>;
}

/// Turns terminal task results into a draft answer.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: &Request, tasks: &[AgentTask]) -> FurrowResult<DraftAnswer>;
}

/// Checks that a draft is backed by recorded evidence.
pub trait EvidenceVerifier: Send + Sync {
    /// Verify `draft` against every task recorded for the request.
    fn verify(&self, draft: &DraftAnswer, tasks: &[&AgentTask]) -> FurrowResult<VerificationResult>;

    /// Structural check of a single task result before aggregation.
    ///
    /// Returns a human-readable reason when the result must be discarded.
    fn check_result(&self, _task: &AgentTask) -> Result<(), String> {
        Ok(())
    }
}
