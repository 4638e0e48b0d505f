//! Shared test doubles for the controller, dispatch, and service tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use furrow_contracts::{
    answer::{DraftAnswer, VerificationResult},
    capability::{CapabilityInput, CapabilityKind, ScenarioParams},
    error::{FurrowError, FurrowResult},
    guardrail::{GateContext, GateMode, GuardrailVerdict, VerdictKind},
    job::JobId,
    request::{Request, RequestId, SessionId},
    session::{Session, SessionLease, TransitionRecord},
    task::{AgentTask, Evidence, EvidenceSource, TaskHandle, TaskOutcome, TaskResult},
};

use crate::{
    roster::AgentRoster,
    traits::{CapabilityAgent, EvidenceVerifier, GuardrailGate, SessionStore},
};

// ── Agents ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Behaviour {
    /// Finish inside `submit` after `latency`.
    Sync { latency: Duration, result: TaskResult },
    /// Queue a job that reports done on the n-th poll.
    Job { polls_to_finish: u32, result: TaskResult },
    /// Refuse every submission with backpressure.
    Reject,
    /// Resolve every submission as a backend failure.
    Fail,
}

pub struct MockAgent {
    pub kind: CapabilityKind,
    pub behaviour: Behaviour,
    pub submits: Arc<Mutex<u32>>,
    pub polls: Arc<Mutex<u32>>,
    pub cancels: Arc<Mutex<u32>>,
}

impl MockAgent {
    pub fn new(kind: CapabilityKind, behaviour: Behaviour) -> Self {
        Self {
            kind,
            behaviour,
            submits: Arc::new(Mutex::new(0)),
            polls: Arc::new(Mutex::new(0)),
            cancels: Arc::new(Mutex::new(0)),
        }
    }

    pub fn sync_geo(latency: Duration) -> Self {
        Self::new(CapabilityKind::Geospatial, Behaviour::Sync { latency, result: rainfall_result() })
    }

    pub fn sync_reg(latency: Duration) -> Self {
        Self::new(CapabilityKind::Regulatory, Behaviour::Sync { latency, result: label_result() })
    }

    pub fn job_sim(polls_to_finish: u32) -> Self {
        Self::new(CapabilityKind::Simulation, Behaviour::Job { polls_to_finish, result: yield_result() })
    }

    pub fn rejecting_sim() -> Self {
        Self::new(CapabilityKind::Simulation, Behaviour::Reject)
    }

    pub fn failing(kind: CapabilityKind) -> Self {
        Self::new(kind, Behaviour::Fail)
    }
}

#[async_trait]
impl CapabilityAgent for MockAgent {
    fn kind(&self) -> CapabilityKind {
        self.kind
    }

    async fn submit(&self, task: &AgentTask) -> FurrowResult<TaskHandle> {
        *self.submits.lock().unwrap() += 1;
        match &self.behaviour {
            Behaviour::Sync { latency, result } => {
                tokio::time::sleep(*latency).await;
                Ok(TaskHandle::resolved(task.id, self.kind, TaskOutcome::done(result.clone())))
            }
            Behaviour::Job { .. } => Ok(TaskHandle::job(task.id, self.kind, JobId::new())),
            Behaviour::Reject => Err(FurrowError::JobSubmissionRejected {
                reason: "queue full".to_string(),
            }),
            Behaviour::Fail => Ok(TaskHandle::resolved(
                task.id,
                self.kind,
                TaskOutcome::failed(furrow_contracts::task::TaskErrorKind::Failure, "backend unavailable"),
            )),
        }
    }

    async fn poll(&self, handle: &TaskHandle) -> FurrowResult<TaskOutcome> {
        use furrow_contracts::task::HandleBinding;

        match (&handle.binding, &self.behaviour) {
            (HandleBinding::Resolved(outcome), _) => Ok(outcome.clone()),
            (HandleBinding::Job(_), Behaviour::Job { polls_to_finish, result }) => {
                let mut polls = self.polls.lock().unwrap();
                *polls += 1;
                if *polls >= *polls_to_finish {
                    Ok(TaskOutcome::done(result.clone()))
                } else {
                    Ok(TaskOutcome::running())
                }
            }
            (HandleBinding::Job(_), _) => Ok(TaskOutcome::running()),
        }
    }

    async fn cancel(&self, _handle: &TaskHandle) -> FurrowResult<()> {
        *self.cancels.lock().unwrap() += 1;
        Ok(())
    }
}

pub fn roster(geo: MockAgent, reg: MockAgent, sim: MockAgent) -> AgentRoster {
    AgentRoster::new(Arc::new(geo), Arc::new(reg), Arc::new(sim)).unwrap()
}

pub fn evidence(id: &str, source: EvidenceSource, text: &str) -> Evidence {
    Evidence {
        id: id.to_string(),
        source,
        title: id.to_string(),
        text: text.to_string(),
        reference: format!("ref:{id}"),
        score: 1.0,
        entities: vec![],
    }
}

pub fn rainfall_result() -> TaskResult {
    TaskResult {
        summary: "7-day rainfall".to_string(),
        evidence: vec![evidence(
            "rain-7d",
            EvidenceSource::Observation,
            "Rainfall over the last 7 days was 12 mm.",
        )],
        payload: serde_json::json!({ "rain_mm": 12.0 }),
    }
}

pub fn label_result() -> TaskResult {
    let mut e = evidence(
        "label-1",
        EvidenceSource::Structured,
        "Apply at 1.2 L/ha for annual ryegrass control in wheat.",
    );
    e.entities = vec!["ryegrass".to_string(), "wheat".to_string()];
    TaskResult {
        summary: "1 registered label".to_string(),
        evidence: vec![e],
        payload: serde_json::Value::Null,
    }
}

pub fn yield_result() -> TaskResult {
    TaskResult {
        summary: "simulated yield".to_string(),
        evidence: vec![evidence("sim-yield", EvidenceSource::Simulation, "Simulated yield of 3.4 t/ha.")],
        payload: serde_json::json!({ "yield_t_ha": 3.4 }),
    }
}

// ── Tasks ────────────────────────────────────────────────────────────────────

fn task(input: CapabilityInput) -> AgentTask {
    AgentTask::new(RequestId::new(), SessionId::new("s-test"), 0, input)
}

pub fn geo_task() -> AgentTask {
    task(CapabilityInput::Geospatial { latitude: -34.1, longitude: 142.2, lookback_days: 7 })
}

pub fn reg_task() -> AgentTask {
    task(CapabilityInput::Regulatory {
        query: "ryegrass herbicide".to_string(),
        target_entities: vec!["ryegrass".to_string()],
    })
}

pub fn sim_task() -> AgentTask {
    task(CapabilityInput::Simulation {
        scenario: ScenarioParams {
            model: "wheat-yield".to_string(),
            crop: "wheat".to_string(),
            latitude: -34.1,
            longitude: 142.2,
            parameters: Default::default(),
        },
    })
}

// ── Gate ─────────────────────────────────────────────────────────────────────

/// Scripted gate: a fixed input verdict and a queue of output verdicts.
pub struct ScriptedGate {
    pub input: VerdictKind,
    pub outputs: Mutex<Vec<VerdictKind>>,
    pub fail: bool,
}

impl ScriptedGate {
    pub fn allow_all() -> Self {
        Self { input: VerdictKind::Allow, outputs: Mutex::new(vec![]), fail: false }
    }

    pub fn block_input() -> Self {
        Self { input: VerdictKind::Block, outputs: Mutex::new(vec![]), fail: false }
    }

    /// Output verdicts are consumed front to back; `Allow` once exhausted.
    pub fn with_outputs(outputs: Vec<VerdictKind>) -> Self {
        Self { input: VerdictKind::Allow, outputs: Mutex::new(outputs), fail: false }
    }

    pub fn broken() -> Self {
        Self { input: VerdictKind::Allow, outputs: Mutex::new(vec![]), fail: true }
    }
}

impl GuardrailGate for ScriptedGate {
    fn evaluate(&self, _content: &str, ctx: &GateContext) -> FurrowResult<GuardrailVerdict> {
        if self.fail {
            return Err(FurrowError::InternalFailure { reason: "classifier offline".to_string() });
        }
        let kind = match ctx.mode {
            GateMode::Input => self.input,
            GateMode::Output => {
                let mut outputs = self.outputs.lock().unwrap();
                if outputs.is_empty() {
                    VerdictKind::Allow
                } else {
                    outputs.remove(0)
                }
            }
        };
        Ok(GuardrailVerdict::new(kind, ctx.mode, "scripted", 0.9, "scripted verdict"))
    }
}

/// Verifier that passes everything it is shown.
pub struct PassingVerifier;

impl EvidenceVerifier for PassingVerifier {
    fn verify(&self, _draft: &DraftAnswer, _tasks: &[&AgentTask]) -> FurrowResult<VerificationResult> {
        Ok(VerificationResult::new(vec![], vec![]))
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    requests: HashMap<RequestId, Request>,
    leases: HashMap<SessionId, SessionLease>,
    history: Vec<TransitionRecord>,
    sessions: HashMap<SessionId, Session>,
}

/// Minimal in-memory store with real lease semantics.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.inner.lock().unwrap().history.clone()
    }

    pub fn saves_for(&self, request_id: &RequestId) -> Option<Request> {
        self.inner.lock().unwrap().requests.get(request_id).cloned()
    }

    fn check(state: &MemoryState, lease: &SessionLease) -> FurrowResult<()> {
        match state.leases.get(&lease.session_id) {
            Some(held) if held.lease_id == lease.lease_id => Ok(()),
            _ => Err(FurrowError::LeaseLost { session_id: lease.session_id.to_string() }),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn acquire_lease(&self, session_id: &SessionId, wait: Option<Duration>) -> FurrowResult<SessionLease> {
        let deadline = tokio::time::Instant::now() + wait.unwrap_or(Duration::ZERO);
        loop {
            {
                let mut state = self.inner.lock().unwrap();
                if !state.leases.contains_key(session_id) {
                    let now = Utc::now();
                    let lease = SessionLease {
                        session_id: session_id.clone(),
                        lease_id: uuid::Uuid::new_v4(),
                        acquired_at: now,
                        expires_at: now + chrono::Duration::seconds(30),
                    };
                    state.leases.insert(session_id.clone(), lease.clone());
                    return Ok(lease);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FurrowError::SessionBusy { session_id: session_id.to_string() });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn renew_lease(&self, lease: &SessionLease) -> FurrowResult<SessionLease> {
        let state = self.inner.lock().unwrap();
        Self::check(&state, lease)?;
        Ok(lease.clone())
    }

    async fn release_lease(&self, lease: SessionLease) -> FurrowResult<()> {
        let mut state = self.inner.lock().unwrap();
        Self::check(&state, &lease)?;
        state.leases.remove(&lease.session_id);
        Ok(())
    }

    async fn insert(&self, request: &Request) -> FurrowResult<()> {
        let mut state = self.inner.lock().unwrap();
        state
            .sessions
            .entry(request.session_id.clone())
            .or_insert_with(|| Session::new(request.session_id.clone(), 2))
            .request_ids
            .push(request.id);
        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn load(&self, request_id: &RequestId) -> FurrowResult<Option<Request>> {
        Ok(self.inner.lock().unwrap().requests.get(request_id).cloned())
    }

    async fn save(&self, lease: &SessionLease, request: &Request) -> FurrowResult<()> {
        let mut state = self.inner.lock().unwrap();
        Self::check(&state, lease)?;
        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn append_history(&self, lease: &SessionLease, record: TransitionRecord) -> FurrowResult<()> {
        let mut state = self.inner.lock().unwrap();
        Self::check(&state, lease)?;
        state.history.push(record);
        Ok(())
    }

    async fn session(&self, session_id: &SessionId) -> FurrowResult<Option<Session>> {
        Ok(self.inner.lock().unwrap().sessions.get(session_id).cloned())
    }

    async fn pending(&self) -> FurrowResult<Vec<Request>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .requests
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect())
    }
}

// ── Planner and config ───────────────────────────────────────────────────────

/// Plans a fixed set of capabilities on every pass, or fails.
pub struct FixedPlanner {
    pub kinds: Vec<CapabilityKind>,
    pub fail: bool,
}

impl FixedPlanner {
    pub fn new(kinds: Vec<CapabilityKind>) -> Self {
        Self { kinds, fail: false }
    }
}

impl crate::traits::Planner for FixedPlanner {
    fn plan(&self, request: &Request) -> FurrowResult<furrow_contracts::capability::Plan> {
        use furrow_contracts::capability::{Plan, PlannedTask};

        if self.fail {
            return Err(FurrowError::PlanningError { reason: "no location given".to_string() });
        }
        let steps = self
            .kinds
            .iter()
            .map(|kind| {
                let input = match kind {
                    CapabilityKind::Geospatial => geo_task().input,
                    CapabilityKind::Regulatory => reg_task().input,
                    CapabilityKind::Simulation => sim_task().input,
                };
                PlannedTask { capability: *kind, input }
            })
            .collect();
        Ok(Plan { pass: request.pass, steps, context: request.revision_context.clone() })
    }
}

pub fn config() -> furrow_contracts::config::FurrowConfig {
    use furrow_contracts::config::{FurrowConfig, GuardrailPolicy, JobConfig, SessionConfig, TimeoutConfig};

    FurrowConfig {
        revision_ceiling: 2,
        guardrail: GuardrailPolicy {
            fail_closed_category: "gate-unavailable".to_string(),
            ..GuardrailPolicy::default()
        },
        timeouts: TimeoutConfig {
            geospatial_ms: 1_000,
            regulatory_ms: 2_000,
            simulation_ms: 10_000,
            plan_deadline_ms: 20_000,
            request_deadline_ms: 60_000,
            poll_interval_ms: 100,
        },
        jobs: JobConfig::default(),
        sessions: SessionConfig::default(),
    }
}
