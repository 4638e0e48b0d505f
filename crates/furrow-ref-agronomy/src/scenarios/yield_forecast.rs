//! Scenario D: a long simulation job does not hold up other requests.
//!
//! A yield forecast is planned as a simulation job. The controller submits
//! it to the worker pool and parks on polling. While the job runs, an
//! unrelated weed-control request on another session is accepted, dispatched,
//! and completed. The job then succeeds and the forecast request resumes
//! aggregation and finishes.

use std::time::Duration;

use furrow_contracts::{
    error::FurrowResult,
    job::JobState,
    request::{QueryResult, RequestId, RequestState, SessionId},
};

use crate::runtime::Runtime;
use crate::scenarios::{print_report, report, weed_control, ScenarioReport};

pub const QUERY: &str = "Simulate the wheat yield for this season at -31.95, 116.86.";

/// What the interleaved run observed.
#[derive(Debug, Clone)]
pub struct InterleavedReport {
    pub forecast: ScenarioReport,
    pub concurrent: ScenarioReport,
    /// The forecast request's status when the concurrent request finished.
    pub forecast_status_meanwhile: RequestState,
    /// The simulation job's state when the concurrent request finished.
    pub job_state_meanwhile: Option<JobState>,
}

pub async fn run(runtime: &Runtime) -> FurrowResult<InterleavedReport> {
    let forecast_session = SessionId::new("farm-d-forecast");
    let start = tokio::time::Instant::now();
    let forecast_id = runtime.orchestrator.submit_query(forecast_session.clone(), QUERY).await?;

    // Let the forecast reach the worker pool before the second request lands.
    wait_until_dispatched(runtime, &forecast_id).await?;

    let concurrent = weed_control::run(runtime, "farm-d-weeds").await?;
    let meanwhile: QueryResult = runtime.orchestrator.get_result(&forecast_id).await?;
    let job_state_meanwhile = runtime.jobs.store().all()?.last().map(|job| job.state);

    let result = runtime.orchestrator.wait_for(&forecast_id).await?;
    let forecast = report(runtime, &forecast_session, forecast_id, result, start.elapsed())?;

    Ok(InterleavedReport {
        forecast,
        concurrent,
        forecast_status_meanwhile: meanwhile.status,
        job_state_meanwhile,
    })
}

async fn wait_until_dispatched(runtime: &Runtime, id: &RequestId) -> FurrowResult<()> {
    loop {
        let result = runtime.orchestrator.get_result(id).await?;
        if result.status == RequestState::Dispatched || result.status.is_terminal() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn run_scenario() -> FurrowResult<()> {
    println!("=== Scenario D: Simulation job with a concurrent request ===");
    println!();
    println!("  Query 1 (farm-d-forecast): {}", QUERY);
    println!("  Query 2 (farm-d-weeds):    {}", weed_control::QUERY);
    println!();

    let runtime = Runtime::reference()?;
    let report = run(&runtime).await?;

    println!("  -- While the simulation job was running --");
    println!("  Forecast status:        {}", report.forecast_status_meanwhile);
    println!(
        "  Job state:              {}",
        report.job_state_meanwhile.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string())
    );
    println!();
    println!("  -- Concurrent weed-control request --");
    print_report(&report.concurrent);
    println!();
    println!("  -- Forecast request --");
    print_report(&report.forecast);

    println!();
    println!("  Scenario D complete.");
    println!();
    Ok(())
}
