//! Agronomy reference scenarios.
//!
//! Each scenario wires the real FURROW components from [`crate::runtime`]
//! with mock backends and walks one request (or two) through the controller:
//!
//! - [`weed_control`]: Scenario A, parallel fan-out to completion.
//! - [`rate_revision`]: Scenario B, an unsupported rate forces one revision.
//! - [`off_topic`]: Scenario C, the input gate blocks before any dispatch.
//! - [`yield_forecast`]: Scenario D, a parked simulation job while another
//!   request completes.

pub mod off_topic;
pub mod rate_revision;
pub mod weed_control;
pub mod yield_forecast;

use std::time::Duration;

use furrow_contracts::{
    error::FurrowResult,
    request::{QueryResult, RequestId, RequestState, SessionId},
    session::TransitionRecord,
};

use crate::runtime::Runtime;

/// What one scenario request produced.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub result: QueryResult,
    /// The request's transitions, in order.
    pub transitions: Vec<TransitionRecord>,
    pub chain_verified: bool,
    /// Virtual or wall time from submission to terminal state.
    pub elapsed: Duration,
}

impl ScenarioReport {
    /// The state path, starting at `Received`.
    pub fn path(&self) -> Vec<RequestState> {
        let mut path: Vec<RequestState> = self.transitions.first().map(|t| t.from).into_iter().collect();
        path.extend(self.transitions.iter().map(|t| t.to));
        path
    }
}

pub(crate) fn report(
    runtime: &Runtime,
    session_id: &SessionId,
    request_id: RequestId,
    result: QueryResult,
    elapsed: Duration,
) -> FurrowResult<ScenarioReport> {
    let transitions = runtime
        .sessions
        .history(session_id)?
        .into_iter()
        .map(|event| event.record)
        .filter(|record| record.request_id == request_id)
        .collect();
    Ok(ScenarioReport {
        result,
        transitions,
        chain_verified: runtime.sessions.verify_integrity(session_id)?,
        elapsed,
    })
}

pub(crate) fn print_report(report: &ScenarioReport) {
    let path: Vec<String> = report.path().iter().map(|s| s.to_string()).collect();
    println!("  State path:             {}", path.join(" -> "));
    println!("  Status:                 {}", report.result.status);
    println!("  Time to terminal:       {} ms", report.elapsed.as_millis());
    if let Some(answer) = &report.result.answer {
        println!("  Answer:                 {}", answer);
    }
    for citation in &report.result.citations {
        println!(
            "  Citation:               [{}] {} ({})",
            citation.capability, citation.evidence_id, citation.reference
        );
    }
    if let Some(reason) = &report.result.rejection_reason {
        println!("  Rejection reason:       {}", reason);
    }
    println!(
        "  History chain:          {} ({} transition(s))",
        if report.chain_verified { "VERIFIED" } else { "FAILED" },
        report.transitions.len()
    );
}
