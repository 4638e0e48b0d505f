//! Scenario B: an unsupported rate claim is revised away.
//!
//! Same question as Scenario A, but the draft comes from a synthesizer that
//! states the rate it remembers for Boxer Gold (4 L/ha) while citing a label
//! that says 2.5 L/ha. The verifier flags the contradiction, the output gate
//! returns needs-revision, and the planner re-runs only the regulatory lookup,
//! narrowed to the flagged product. The second draft is grounded and passes.

use std::sync::Arc;

use furrow_contracts::{error::FurrowResult, request::SessionId};

use crate::mock_data::RECALLED_RATES;
use crate::recall::RecallSynthesizer;
use crate::runtime::{load_config, Backends, Runtime};
use crate::scenarios::{print_report, report, weed_control, ScenarioReport};

/// Reference runtime whose synthesizer drafts rates from memory.
pub fn recall_runtime() -> FurrowResult<Runtime> {
    Runtime::build(load_config()?, Backends::mock(), Arc::new(RecallSynthesizer::new(RECALLED_RATES)))
}

pub async fn run(runtime: &Runtime, session: &str) -> FurrowResult<ScenarioReport> {
    let session_id = SessionId::new(session);
    let start = tokio::time::Instant::now();
    let request_id = runtime.orchestrator.submit_query(session_id.clone(), weed_control::QUERY).await?;
    let result = runtime.orchestrator.wait_for(&request_id).await?;
    report(runtime, &session_id, request_id, result, start.elapsed())
}

pub async fn run_scenario() -> FurrowResult<()> {
    println!("=== Scenario B: Unsupported rate claim and revision ===");
    println!();
    println!("  Query: {}", weed_control::QUERY);
    println!("  First draft recalls Boxer Gold at 4 L/ha; the label says 2.5 L/ha");
    println!();

    let runtime = recall_runtime()?;
    let report = run(&runtime, "farm-b").await?;

    for record in report.transitions.iter().filter(|t| t.verdict.is_some()) {
        if let Some(verdict) = &record.verdict {
            println!(
                "  Gate ({:?} -> {}):  {:?} [{}] {}",
                verdict.mode, record.to, verdict.kind, verdict.category, verdict.rationale
            );
        }
    }
    print_report(&report);

    println!();
    println!("  Scenario B complete.");
    println!();
    Ok(())
}
