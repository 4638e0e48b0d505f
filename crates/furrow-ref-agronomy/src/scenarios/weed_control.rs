//! Scenario A: herbicide recommendation with parallel fan-out.
//!
//! The query needs recent weather and label registrations. Both agents are
//! dispatched at once; weather answers in about 0.2 s and labels in about
//! 0.8 s, so aggregation starts near 0.8 s rather than 1.0 s. The evidence
//! synthesizer cites every rate to a label and the output gate allows it.

use furrow_contracts::{error::FurrowResult, request::SessionId};

use crate::runtime::Runtime;
use crate::scenarios::{print_report, report, ScenarioReport};

pub const QUERY: &str = "What herbicide controls ryegrass in wheat near -31.95, 116.86 given recent rainfall?";

/// Submit [`QUERY`] on `session` and wait for the terminal result.
pub async fn run(runtime: &Runtime, session: &str) -> FurrowResult<ScenarioReport> {
    let session_id = SessionId::new(session);
    let start = tokio::time::Instant::now();
    let request_id = runtime.orchestrator.submit_query(session_id.clone(), QUERY).await?;
    let result = runtime.orchestrator.wait_for(&request_id).await?;
    report(runtime, &session_id, request_id, result, start.elapsed())
}

pub async fn run_scenario() -> FurrowResult<()> {
    println!("=== Scenario A: Weed control with parallel dispatch ===");
    println!();
    println!("  Query: {}", QUERY);
    println!("  Expected plan: geospatial (~200 ms) + regulatory (~800 ms), concurrently");
    println!();

    let runtime = Runtime::reference()?;
    let report = run(&runtime, "farm-a").await?;
    print_report(&report);

    println!();
    println!("  Scenario A complete.");
    println!();
    Ok(())
}
