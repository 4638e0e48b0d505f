//! FURROW Agronomy Reference Runtime, demo CLI.
//!
//! Runs one or all of the four agronomy scenarios. Each scenario uses the
//! real FURROW components (guardrail gate, planner, agents, worker pool,
//! verifier, session store) wired together with mock farm data.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- scenario-a
//!   cargo run -p demo -- scenario-b
//!   cargo run -p demo -- scenario-c
//!   cargo run -p demo -- scenario-d

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use furrow_contracts::error::FurrowResult;
use furrow_ref_agronomy::scenarios::{off_topic, rate_revision, weed_control, yield_forecast};

// ── CLI definition ────────────────────────────────────────────────────────────

/// FURROW: agent orchestration controller agronomy demo.
///
/// Each subcommand runs one or all of the four advisory scenarios, showing
/// gating, parallel dispatch, evidence verification, revision, and
/// background simulation jobs.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "FURROW agronomy reference runtime demo",
    long_about = "Runs FURROW agronomy scenarios showing guardrail gating, parallel agent\n\
                  dispatch, evidence verification, targeted revision, and job offloading."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four scenarios in sequence.
    RunAll,
    /// Scenario A: weed control near a location (parallel fan-out).
    ScenarioA,
    /// Scenario B: an unsupported label rate forces one revision.
    ScenarioB,
    /// Scenario C: medical and jailbreak queries rejected at the gate.
    ScenarioC,
    /// Scenario D: a yield simulation job alongside another request.
    ScenarioD,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for every transition and job event.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::ScenarioA => weed_control::run_scenario().await,
        Command::ScenarioB => rate_revision::run_scenario().await,
        Command::ScenarioC => off_topic::run_scenario().await,
        Command::ScenarioD => yield_forecast::run_scenario().await,
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e.public_message());
            tracing::error!(error = %e, "demo failed");
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

async fn run_all() -> FurrowResult<()> {
    weed_control::run_scenario().await?;
    rate_revision::run_scenario().await?;
    off_topic::run_scenario().await?;
    yield_forecast::run_scenario().await?;
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("FURROW: Agent Orchestration Controller");
    println!("Agronomy Reference Demo");
    println!("======================================");
    println!();
    println!("Per request:");
    println!("  [1] Input gate classifies the query: allow or block");
    println!("  [2] Planner picks capabilities; agents run in parallel under timeouts");
    println!("  [3] Long simulations go to the worker pool and are polled, not awaited");
    println!("  [4] Draft claims are traced to evidence; output gate allows, revises, or blocks");
    println!("  [5] Every transition is appended to a SHA-256 chained session history");
    println!();
}
