//! The FURROW controller: the per-request state machine.
//!
//! The controller enforces the FURROW request lifecycle:
//!
//!   Received → Input gate → Plan → Dispatch ⇉ Aggregate → Verify → Output gate
//!                                   ↑                                   │
//!                                   └──────────── Revise ◀──────────────┘
//!
//! The safety invariant is absolute: no capability agent is called unless the
//! input gate returned `allow`, and no answer is delivered unless the most
//! recent output gate verdict is `allow`. Both are enforced structurally: the
//! only path to `Dispatched` runs through `GatedIn`, and the only path to
//! `Complete` runs through an output-gate `allow`.
//!
//! Every transition is renewed against the session lease, appended to the
//! session history, and persisted before the next step begins, so a request
//! can be resumed from its stored state after a restart.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use furrow_contracts::{
    answer::DraftAnswer,
    capability::CapabilityKind,
    config::FurrowConfig,
    error::{FurrowError, FurrowResult},
    guardrail::{GateContext, GuardrailVerdict, VerdictKind},
    request::{Citation, Request, RequestOutcome, RequestState},
    session::{SessionLease, TransitionRecord},
    task::{AgentTask, TaskErrorKind, TaskOutcome, TaskStatus},
};

use crate::{
    dispatch::run_plan,
    roster::AgentRoster,
    synth::fallback_draft,
    traits::{EvidenceVerifier, GuardrailGate, Planner, SessionStore, Synthesizer},
};

/// Why a run stopped before reaching a terminal state on its own.
const CANCELLED: &str = "cancelled";
const DEADLINE: &str = "request deadline exceeded";

/// Drives requests through their lifecycle.
///
/// One controller is shared by every in-flight request. It holds no
/// per-request state; each `drive` call owns its `Request` exclusively under
/// the caller's session lease.
#[derive(Clone)]
pub struct Controller {
    config: Arc<FurrowConfig>,
    gate: Arc<dyn GuardrailGate>,
    planner: Arc<dyn Planner>,
    synthesizer: Arc<dyn Synthesizer>,
    verifier: Arc<dyn EvidenceVerifier>,
    agents: AgentRoster,
    store: Arc<dyn SessionStore>,
}

impl Controller {
    pub fn new(
        config: Arc<FurrowConfig>,
        gate: Arc<dyn GuardrailGate>,
        planner: Arc<dyn Planner>,
        synthesizer: Arc<dyn Synthesizer>,
        verifier: Arc<dyn EvidenceVerifier>,
        agents: AgentRoster,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self { config, gate, planner, synthesizer, verifier, agents, store }
    }

    pub fn config(&self) -> &FurrowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run `request` until it reaches `Complete`, `Rejected`, or `Failed`.
    ///
    /// The caller must hold `lease` for the request's session for the whole
    /// call. Tripping `cancel`, or exceeding the request deadline measured from
    /// `created_at`, ends the request `Failed` and cancels in-flight tasks.
    ///
    /// # Errors
    ///
    /// Only `LeaseLost` (and store failures while recording the final
    /// transition) escape. Everything else is recorded on the request as a
    /// `Failed` outcome with a public message.
    pub async fn drive(
        &self,
        mut request: Request,
        lease: &SessionLease,
        cancel: &CancellationToken,
    ) -> FurrowResult<Request> {
        let run = cancel.child_token();
        let timed_out = Arc::new(AtomicBool::new(false));

        let elapsed = (Utc::now() - request.created_at).to_std().unwrap_or_default();
        let remaining = self.config.timeouts.request_deadline().saturating_sub(elapsed);
        let timer = {
            let run = run.clone();
            let timed_out = Arc::clone(&timed_out);
            tokio::spawn(async move {
                tokio::time::sleep(remaining).await;
                timed_out.store(true, Ordering::SeqCst);
                run.cancel();
            })
        };

        debug!(
            request_id = %request.id,
            session_id = %request.session_id,
            state = %request.state,
            remaining_ms = remaining.as_millis() as u64,
            "controller driving request"
        );

        let result = self.run(&mut request, lease, &run, &timed_out).await;
        timer.abort();
        result.map(|()| request)
    }

    async fn run(
        &self,
        request: &mut Request,
        lease: &SessionLease,
        run: &CancellationToken,
        timed_out: &AtomicBool,
    ) -> FurrowResult<()> {
        while !request.is_terminal() {
            if run.is_cancelled() {
                let reason = if timed_out.load(Ordering::SeqCst) { DEADLINE } else { CANCELLED };
                return self.abort(request, lease, reason).await;
            }

            match self.step(request, lease, run).await {
                Ok(()) => {}
                Err(e @ FurrowError::LeaseLost { .. }) => {
                    error!(request_id = %request.id, session_id = %request.session_id, "session lease lost mid-request");
                    return Err(e);
                }
                Err(e) => return self.fail(request, lease, e).await,
            }
        }
        Ok(())
    }

    /// Execute the work of the current state and move to the next one.
    async fn step(&self, request: &mut Request, lease: &SessionLease, run: &CancellationToken) -> FurrowResult<()> {
        match request.state {
            // ── Received: input gate ─────────────────────────────────────────
            //
            // This is the primary trust gate. No capability runs until allow.
            RequestState::Received => {
                let ctx = GateContext::input(request.id.to_string(), request.session_id.to_string());
                let verdict = self.evaluate_gate(&request.query, &ctx);
                request.verdicts.push(verdict.clone());

                if verdict.kind == VerdictKind::Allow {
                    self.advance(request, lease, RequestState::GatedIn, "input allowed", Some(verdict)).await
                } else {
                    warn!(
                        request_id = %request.id,
                        category = %verdict.category,
                        rationale = %verdict.rationale,
                        "input gate rejected query"
                    );
                    let err = FurrowError::InputBlocked {
                        category: verdict.category.clone(),
                        reason: verdict.rationale.clone(),
                    };
                    request.outcome = Some(rejection(&err));
                    self.advance(request, lease, RequestState::Rejected, "input blocked", Some(verdict)).await
                }
            }

            RequestState::GatedIn => self.advance(request, lease, RequestState::Planning, "planning", None).await,

            // ── Planning ─────────────────────────────────────────────────────
            RequestState::Planning => {
                let plan = self.planner.plan(request)?;

                if plan.is_empty() {
                    info!(request_id = %request.id, pass = request.pass, "no capability applies, using fallback draft");
                    request.draft = Some(fallback_draft(request.pass));
                    request.plan = Some(plan);
                    return self
                        .advance(request, lease, RequestState::Verifying, "empty plan, fallback draft", None)
                        .await;
                }

                request.tasks = plan
                    .steps
                    .iter()
                    .map(|s| AgentTask::new(request.id, request.session_id.clone(), request.pass, s.input.clone()))
                    .collect();
                let reason = format!("plan {:?}", plan.capabilities());
                request.plan = Some(plan);
                self.advance(request, lease, RequestState::Dispatched, &reason, None).await
            }

            // ── Dispatched: fan-out / fan-in ─────────────────────────────────
            RequestState::Dispatched => {
                let finished = self.dispatch(request, lease, run).await?;
                request.tasks = finished;

                if run.is_cancelled() {
                    // The loop head records why; keep what the tasks reached.
                    self.store.save(lease, request).await?;
                    return Ok(());
                }

                if !request.recorded_tasks().any(AgentTask::is_usable) {
                    let backpressure = request.tasks.iter().all(|t| {
                        t.error.as_ref().is_some_and(|e| e.kind == TaskErrorKind::Backpressure)
                    });
                    return Err(if backpressure {
                        FurrowError::JobSubmissionRejected {
                            reason: "every capability was refused by the job queue".to_string(),
                        }
                    } else {
                        FurrowError::InternalFailure {
                            reason: format!("all {} required tasks failed with no usable result", request.tasks.len()),
                        }
                    });
                }

                self.advance(request, lease, RequestState::Aggregating, "all tasks terminal", None).await
            }

            // ── Aggregating ──────────────────────────────────────────────────
            //
            // Only reachable once every task of the pass is terminal.
            RequestState::Aggregating => {
                if let Some(open) = request.tasks.iter().find(|t| !t.status.is_terminal()) {
                    return Err(FurrowError::StateMachineError {
                        reason: format!("task {} is {} at aggregation", open.id, open.status),
                    });
                }

                for task in request.tasks.iter_mut().filter(|t| t.is_usable()) {
                    if let Err(reason) = self.verifier.check_result(task) {
                        warn!(task_id = %task.id, capability = %task.capability, reason = %reason, "discarding malformed result");
                        task.apply(TaskOutcome::failed(TaskErrorKind::InvalidResult, reason));
                    }
                }

                let inputs = latest_per_capability(request);
                let draft = self.synthesizer.synthesize(request, &inputs).await?;
                debug!(request_id = %request.id, claims = draft.claims.len(), "draft synthesized");
                request.draft = Some(draft);
                self.advance(request, lease, RequestState::Verifying, "draft synthesized", None).await
            }

            // ── Verifying: evidence trace + output gate ──────────────────────
            RequestState::Verifying => {
                let draft = request.draft.clone().ok_or_else(|| FurrowError::StateMachineError {
                    reason: format!("request {} reached verification without a draft", request.id),
                })?;

                let recorded: Vec<&AgentTask> = request.recorded_tasks().collect();
                let verification = match self.verifier.verify(&draft, &recorded) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(request_id = %request.id, error = %e, "verifier failed, output gate will fail closed");
                        None
                    }
                };
                request.verification = verification.clone();

                let ctx = GateContext::output(
                    request.id.to_string(),
                    request.session_id.to_string(),
                    request.revision_count,
                    draft.clone(),
                    verification,
                );
                let verdict = self.evaluate_gate(&draft.text, &ctx);
                request.verdicts.push(verdict.clone());

                match verdict.kind {
                    VerdictKind::Allow => {
                        request.outcome = Some(RequestOutcome {
                            answer: Some(draft.text.clone()),
                            citations: citations(request, &draft),
                            rejection_reason: None,
                            retry_later: false,
                        });
                        self.advance(request, lease, RequestState::Complete, "output allowed", Some(verdict)).await
                    }
                    VerdictKind::NeedsRevision if request.revision_count < self.config.revision_ceiling => {
                        self.advance(request, lease, RequestState::Revising, "output needs revision", Some(verdict))
                            .await
                    }
                    VerdictKind::NeedsRevision => {
                        warn!(
                            request_id = %request.id,
                            revision = request.revision_count,
                            ceiling = self.config.revision_ceiling,
                            "revision ceiling reached"
                        );
                        let err = FurrowError::RevisionLimitExceeded { ceiling: self.config.revision_ceiling };
                        request.outcome = Some(rejection(&err));
                        self.advance(request, lease, RequestState::Rejected, "revision limit", Some(verdict)).await
                    }
                    VerdictKind::Block => {
                        let err = FurrowError::OutputBlocked {
                            category: verdict.category.clone(),
                            reason: verdict.rationale.clone(),
                        };
                        request.outcome = Some(rejection(&err));
                        self.advance(request, lease, RequestState::Rejected, "output blocked", Some(verdict)).await
                    }
                }
            }

            // ── Revising ─────────────────────────────────────────────────────
            RequestState::Revising => {
                request.revision_count += 1;
                let hints = revision_hints(request);
                request.revision_context.extend(hints);
                request.archive_tasks();
                request.pass += 1;
                request.draft = None;
                request.verification = None;

                let reason = format!("revision {}", request.revision_count);
                self.advance(request, lease, RequestState::Planning, &reason, None).await
            }

            RequestState::Complete | RequestState::Rejected | RequestState::Failed => Ok(()),
        }
    }

    /// Run the pass's tasks while keeping the stored request and the lease
    /// fresh. Job bindings are persisted as soon as they are known so a
    /// resumed request re-attaches instead of resubmitting.
    async fn dispatch(
        &self,
        request: &mut Request,
        lease: &SessionLease,
        run: &CancellationToken,
    ) -> FurrowResult<Vec<AgentTask>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<AgentTask>();
        let dispatch = run_plan(&self.agents, request.tasks.clone(), &self.config.timeouts, run.clone(), Some(tx));
        tokio::pin!(dispatch);

        let heartbeat = (self.config.sessions.lease_timeout() / 3).max(Duration::from_millis(10));
        let mut renew = tokio::time::interval(heartbeat);
        renew.tick().await;

        loop {
            tokio::select! {
                finished = &mut dispatch => return Ok(finished),
                Some(update) = rx.recv() => {
                    if let Some(slot) = request.tasks.iter_mut().find(|t| t.id == update.id) {
                        *slot = update;
                    }
                    self.store.save(lease, request).await?;
                }
                _ = renew.tick() => {
                    self.store.renew_lease(lease).await?;
                }
            }
        }
    }

    /// Evaluate the gate, turning an evaluation error into a fail-closed verdict.
    fn evaluate_gate(&self, content: &str, ctx: &GateContext) -> GuardrailVerdict {
        match self.gate.evaluate(content, ctx) {
            Ok(verdict) => {
                debug!(
                    request_id = %ctx.request_id,
                    mode = ?ctx.mode,
                    kind = ?verdict.kind,
                    category = %verdict.category,
                    confidence = verdict.confidence,
                    "gate verdict"
                );
                verdict
            }
            Err(e) => {
                warn!(request_id = %ctx.request_id, mode = ?ctx.mode, error = %e, "gate evaluation failed, failing closed");
                GuardrailVerdict::fail_closed(
                    ctx.mode,
                    self.config.guardrail.fail_closed_category.clone(),
                    "the safety check could not be completed",
                )
            }
        }
    }

    /// Move `request` to `to`, then renew, persist, and record the transition.
    async fn advance(
        &self,
        request: &mut Request,
        lease: &SessionLease,
        to: RequestState,
        reason: &str,
        verdict: Option<GuardrailVerdict>,
    ) -> FurrowResult<()> {
        let from = request.transition(to)?;

        info!(
            request_id = %request.id,
            session_id = %request.session_id,
            from = %from,
            to = %to,
            revision = request.revision_count,
            pass = request.pass,
            reason,
            "request transition"
        );

        self.store.renew_lease(lease).await?;
        self.store.save(lease, request).await?;
        self.store
            .append_history(
                lease,
                TransitionRecord {
                    request_id: request.id,
                    session_id: request.session_id.clone(),
                    from,
                    to,
                    revision: request.revision_count,
                    pass: request.pass,
                    reason: reason.to_string(),
                    verdict,
                    timestamp: Utc::now(),
                },
            )
            .await
    }

    /// End the request `Failed`, logging full detail and exposing only the
    /// public message.
    async fn fail(&self, request: &mut Request, lease: &SessionLease, err: FurrowError) -> FurrowResult<()> {
        if err.is_retryable() {
            warn!(request_id = %request.id, state = %request.state, error = %err, "request failed, retry later");
        } else {
            error!(
                request_id = %request.id,
                session_id = %request.session_id,
                state = %request.state,
                revision = request.revision_count,
                error = %err,
                "request failed"
            );
        }
        request.outcome = Some(rejection(&err));
        self.advance(request, lease, RequestState::Failed, &err.to_string(), None).await
    }

    async fn abort(&self, request: &mut Request, lease: &SessionLease, reason: &str) -> FurrowResult<()> {
        warn!(request_id = %request.id, state = %request.state, reason, "request aborted");
        for task in request.tasks.iter_mut().filter(|t| !t.status.is_terminal()) {
            task.apply(TaskOutcome::failed(TaskErrorKind::Cancelled, reason));
        }
        request.outcome = Some(RequestOutcome {
            rejection_reason: Some(reason.to_string()),
            ..RequestOutcome::default()
        });
        self.advance(request, lease, RequestState::Failed, reason, None).await
    }
}

fn rejection(err: &FurrowError) -> RequestOutcome {
    RequestOutcome {
        answer: None,
        citations: Vec::new(),
        rejection_reason: Some(err.public_message()),
        retry_later: err.is_retryable(),
    }
}

/// For each capability, the most useful attempt across passes: the latest
/// usable one, otherwise the latest attempt at all.
fn latest_per_capability(request: &Request) -> Vec<AgentTask> {
    CapabilityKind::ALL
        .iter()
        .filter_map(|kind| {
            let attempts: Vec<&AgentTask> = request.recorded_tasks().filter(|t| t.capability == *kind).collect();
            attempts
                .iter()
                .rev()
                .find(|t| t.is_usable())
                .or_else(|| attempts.last())
                .map(|t| (*t).clone())
        })
        .collect()
}

/// Context for the next planning pass, built from what verification flagged.
fn revision_hints(request: &Request) -> Vec<String> {
    let Some(verification) = &request.verification else {
        return vec!["verification unavailable on the previous pass".to_string()];
    };
    let mut hints: Vec<String> = verification
        .flagged
        .iter()
        .map(|f| format!("unsupported claim '{}' about [{}]", f.claim_text, f.entities.join(", ")))
        .collect();
    hints.extend(
        verification
            .gaps
            .iter()
            .filter(|g| g.affects_cited_claim)
            .map(|g| format!("missing {} result ({})", g.capability, g.status)),
    );
    hints
}

/// Resolve the draft's evidence references into caller-facing citations.
fn citations(request: &Request, draft: &DraftAnswer) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for r in draft.claims.iter().flat_map(|c| c.evidence.iter()) {
        if !seen.insert((r.task_id, r.evidence_id.clone())) {
            continue;
        }
        let Some(task) = request.recorded_tasks().find(|t| t.id == r.task_id) else {
            continue;
        };
        if task.status != TaskStatus::Done {
            continue;
        }
        if let Some(evidence) = task.evidence(&r.evidence_id) {
            out.push(Citation {
                task_id: task.id,
                capability: task.capability,
                evidence_id: evidence.id.clone(),
                source: evidence.source,
                reference: evidence.reference.clone(),
            });
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use furrow_contracts::{
        capability::CapabilityKind,
        guardrail::VerdictKind,
        request::{Request, RequestState, SessionId},
    };

    use super::Controller;
    use crate::synth::{EvidenceSynthesizer, FALLBACK_TEXT};
    use crate::testing::{config, roster, FixedPlanner, MemoryStore, MockAgent, PassingVerifier, ScriptedGate};
    use crate::traits::SessionStore;

    struct Harness {
        controller: Controller,
        store: MemoryStore,
        geo_submits: Arc<std::sync::Mutex<u32>>,
        reg_submits: Arc<std::sync::Mutex<u32>>,
    }

    fn harness(gate: ScriptedGate, planner: FixedPlanner, sim: MockAgent) -> Harness {
        let geo = MockAgent::sync_geo(Duration::from_millis(200));
        let reg = MockAgent::sync_reg(Duration::from_millis(800));
        let geo_submits = geo.submits.clone();
        let reg_submits = reg.submits.clone();
        let store = MemoryStore::default();
        let controller = Controller::new(
            Arc::new(config()),
            Arc::new(gate),
            Arc::new(planner),
            Arc::new(EvidenceSynthesizer::default()),
            Arc::new(PassingVerifier),
            roster(geo, reg, sim),
            Arc::new(store.clone()),
        );
        Harness { controller, store, geo_submits, reg_submits }
    }

    fn geo_and_reg() -> FixedPlanner {
        FixedPlanner::new(vec![CapabilityKind::Geospatial, CapabilityKind::Regulatory])
    }

    async fn drive(h: &Harness, query: &str) -> Request {
        let request = Request::new(SessionId::new("s1"), query);
        h.store.insert(&request).await.unwrap();
        let lease = h.store.acquire_lease(&request.session_id, None).await.unwrap();
        let done = h.controller.drive(request, &lease, &CancellationToken::new()).await.unwrap();
        h.store.release_lease(lease).await.unwrap();
        done
    }

    fn states(h: &Harness) -> Vec<RequestState> {
        h.store.history().iter().map(|r| r.to).collect()
    }

    // ── Happy path ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn allowed_query_completes_with_citations() {
        let h = harness(ScriptedGate::allow_all(), geo_and_reg(), MockAgent::job_sim(1));
        let done = drive(&h, "ryegrass in wheat after rain").await;

        assert_eq!(done.state, RequestState::Complete);
        let result = done.result();
        assert!(result.answer.unwrap().contains("1.2 L/ha"));
        assert_eq!(result.citations.len(), 2);
        assert_eq!(done.last_verdict().unwrap().kind, VerdictKind::Allow);

        use RequestState::*;
        assert_eq!(states(&h), vec![GatedIn, Planning, Dispatched, Aggregating, Verifying, Complete]);
        assert_eq!(h.store.saves_for(&done.id).unwrap().state, Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_plan_goes_straight_to_verification() {
        let h = harness(ScriptedGate::allow_all(), FixedPlanner::new(vec![]), MockAgent::job_sim(1));
        let done = drive(&h, "what is a leaf").await;

        assert_eq!(done.state, RequestState::Complete);
        assert_eq!(done.result().answer.as_deref(), Some(FALLBACK_TEXT));
        assert!(!states(&h).contains(&RequestState::Dispatched));
        assert_eq!(*h.geo_submits.lock().unwrap(), 0);
    }

    // ── Input gate ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn blocked_input_never_reaches_agents() {
        let h = harness(ScriptedGate::block_input(), geo_and_reg(), MockAgent::job_sim(1));
        let done = drive(&h, "what painkiller for a headache").await;

        assert_eq!(done.state, RequestState::Rejected);
        assert!(done.result().rejection_reason.is_some());
        assert_eq!(*h.geo_submits.lock().unwrap(), 0);
        assert_eq!(*h.reg_submits.lock().unwrap(), 0);
        assert_eq!(states(&h), vec![RequestState::Rejected]);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_error_fails_closed_at_input() {
        let h = harness(ScriptedGate::broken(), geo_and_reg(), MockAgent::job_sim(1));
        let done = drive(&h, "ryegrass").await;

        assert_eq!(done.state, RequestState::Rejected);
        assert_eq!(done.last_verdict().unwrap().category, "gate-unavailable");
        assert_eq!(*h.reg_submits.lock().unwrap(), 0);
    }

    // ── Revision loop ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn one_revision_then_complete() {
        let gate = ScriptedGate::with_outputs(vec![VerdictKind::NeedsRevision]);
        let h = harness(gate, geo_and_reg(), MockAgent::job_sim(1));
        let done = drive(&h, "ryegrass").await;

        assert_eq!(done.state, RequestState::Complete);
        assert_eq!(done.revision_count, 1);
        assert_eq!(done.pass, 1);
        assert_eq!(done.archived_tasks.len(), 2);
        assert_eq!(*h.reg_submits.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn revision_ceiling_rejects() {
        let gate = ScriptedGate::with_outputs(vec![VerdictKind::NeedsRevision; 10]);
        let h = harness(gate, geo_and_reg(), MockAgent::job_sim(1));
        let done = drive(&h, "ryegrass").await;

        assert_eq!(done.state, RequestState::Rejected);
        assert_eq!(done.revision_count, 2);
        assert!(done.result().rejection_reason.unwrap().contains("revision"));

        let history = h.store.history();
        let replans = history
            .iter()
            .filter(|r| r.from == RequestState::Revising && r.to == RequestState::Planning)
            .count();
        assert_eq!(replans, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn output_block_is_not_revised() {
        let gate = ScriptedGate::with_outputs(vec![VerdictKind::Block]);
        let h = harness(gate, geo_and_reg(), MockAgent::job_sim(1));
        let done = drive(&h, "ryegrass").await;

        assert_eq!(done.state, RequestState::Rejected);
        assert_eq!(done.revision_count, 0);
        assert!(done.result().answer.is_none());
    }

    // ── Failures ─────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn all_backpressure_surfaces_retry_later() {
        let planner = FixedPlanner::new(vec![CapabilityKind::Simulation]);
        let h = harness(ScriptedGate::allow_all(), planner, MockAgent::rejecting_sim());
        let done = drive(&h, "simulate wheat").await;

        assert_eq!(done.state, RequestState::Failed);
        let result = done.result();
        assert!(result.retry_later);
        assert_eq!(result.rejection_reason.as_deref(), Some("the service is busy, please retry later"));
    }

    #[tokio::test(start_paused = true)]
    async fn planning_error_fails_with_public_message() {
        let planner = FixedPlanner { kinds: vec![], fail: true };
        let h = harness(ScriptedGate::allow_all(), planner, MockAgent::job_sim(1));
        let done = drive(&h, "simulate").await;

        assert_eq!(done.state, RequestState::Failed);
        assert!(!done.result().retry_later);
        assert!(done.result().rejection_reason.unwrap().contains("no location given"));
    }

    #[tokio::test(start_paused = true)]
    async fn single_capability_failure_still_completes() {
        let store = MemoryStore::default();
        let controller = Controller::new(
            Arc::new(config()),
            Arc::new(ScriptedGate::allow_all()),
            Arc::new(geo_and_reg()),
            Arc::new(EvidenceSynthesizer::default()),
            Arc::new(PassingVerifier),
            roster(
                MockAgent::failing(CapabilityKind::Geospatial),
                MockAgent::sync_reg(Duration::from_millis(10)),
                MockAgent::job_sim(1),
            ),
            Arc::new(store.clone()),
        );
        let request = Request::new(SessionId::new("s1"), "ryegrass");
        store.insert(&request).await.unwrap();
        let lease = store.acquire_lease(&request.session_id, None).await.unwrap();
        let done = controller.drive(request, &lease, &CancellationToken::new()).await.unwrap();

        assert_eq!(done.state, RequestState::Complete);
        assert!(done.result().answer.unwrap().contains("geospatial data was unavailable"));
    }

    // ── Cancellation and deadlines ───────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_dispatch_fails_request_and_cancels_job() {
        let sim = MockAgent::job_sim(u32::MAX);
        let cancels = sim.cancels.clone();
        let h = harness(ScriptedGate::allow_all(), FixedPlanner::new(vec![CapabilityKind::Simulation]), sim);

        let request = Request::new(SessionId::new("s1"), "simulate");
        h.store.insert(&request).await.unwrap();
        let lease = h.store.acquire_lease(&request.session_id, None).await.unwrap();

        let token = CancellationToken::new();
        let trip = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trip.cancel();
        });

        let done = h.controller.drive(request, &lease, &token).await.unwrap();

        assert_eq!(done.state, RequestState::Failed);
        assert_eq!(done.result().rejection_reason.as_deref(), Some("cancelled"));
        assert_eq!(*cancels.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_deadline_fails_request() {
        let mut cfg = config();
        cfg.timeouts.request_deadline_ms = 1_000;
        let store = MemoryStore::default();
        let controller = Controller::new(
            Arc::new(cfg),
            Arc::new(ScriptedGate::allow_all()),
            Arc::new(FixedPlanner::new(vec![CapabilityKind::Simulation])),
            Arc::new(EvidenceSynthesizer::default()),
            Arc::new(PassingVerifier),
            roster(
                MockAgent::sync_geo(Duration::ZERO),
                MockAgent::sync_reg(Duration::ZERO),
                MockAgent::job_sim(u32::MAX),
            ),
            Arc::new(store.clone()),
        );
        let request = Request::new(SessionId::new("s1"), "simulate");
        store.insert(&request).await.unwrap();
        let lease = store.acquire_lease(&request.session_id, None).await.unwrap();

        let done = controller.drive(request, &lease, &CancellationToken::new()).await.unwrap();

        assert_eq!(done.state, RequestState::Failed);
        assert_eq!(done.result().rejection_reason.as_deref(), Some("request deadline exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_lease_escapes_as_error() {
        let h = harness(ScriptedGate::allow_all(), geo_and_reg(), MockAgent::job_sim(1));
        let request = Request::new(SessionId::new("s1"), "ryegrass");
        h.store.insert(&request).await.unwrap();
        let lease = h.store.acquire_lease(&request.session_id, None).await.unwrap();
        h.store.release_lease(lease.clone()).await.unwrap();

        let err = h.controller.drive(request, &lease, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, furrow_contracts::error::FurrowError::LeaseLost { .. }));
    }
}
