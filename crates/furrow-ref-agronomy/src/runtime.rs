//! Wiring for the reference runtime.
//!
//! Builds every FURROW component from the packaged configuration: the policy
//! gate, the keyword planner, the trace verifier with result schemas, the
//! three agents over mock backends, the worker pool, and the leased session
//! store, then hands them to an `Orchestrator`.

use std::sync::Arc;
use std::time::Duration;

use furrow_agents::{geospatial, regulatory, simulation, ConditionsSource, GeospatialAgent, KnowledgeLayer, RegulatoryAgent, SimulationAgent};
use furrow_contracts::{
    answer::Claim,
    capability::CapabilityKind,
    config::FurrowConfig,
    error::FurrowResult,
    task::Evidence,
};
use furrow_core::{
    config,
    traits::{JobQueue, Synthesizer},
    AgentRoster, Controller, EvidenceSynthesizer, KeywordPlanner, Orchestrator,
};
use furrow_guardrail::PolicyGate;
use furrow_jobs::{JobRunner, WorkerPool};
use furrow_session::LeasedSessionStore;
use furrow_verify::TraceVerifier;

use crate::{
    backends::{MockConditions, MockKnowledge, MockYieldModel},
    mock_data::{vocabulary, LABELS},
};

/// Packaged runtime configuration.
pub const RUNTIME_CONFIG: &str = include_str!("../policies/furrow.toml");

pub fn load_config() -> FurrowResult<FurrowConfig> {
    config::from_toml_str(RUNTIME_CONFIG)
}

/// External systems the agents talk to.
pub struct Backends {
    pub conditions: Arc<dyn ConditionsSource>,
    pub knowledge: Arc<dyn KnowledgeLayer>,
    pub model: Arc<dyn JobRunner>,
}

impl Backends {
    /// Mock backends: weather in 0.2 s, labels in 0.8 s, a model run in 3 s.
    pub fn mock() -> Self {
        Self {
            conditions: Arc::new(MockConditions { latency: Duration::from_millis(200) }),
            knowledge: Arc::new(MockKnowledge { latency: Duration::from_millis(800) }),
            model: Arc::new(MockYieldModel { run_time: Duration::from_secs(3), season_days: 180 }),
        }
    }
}

/// Trace verifier with a schema per capability and a product-name rule.
pub fn verifier() -> FurrowResult<TraceVerifier> {
    let mut verifier = TraceVerifier::new();
    verifier.register_schema(CapabilityKind::Geospatial, &geospatial::result_schema())?;
    verifier.register_schema(CapabilityKind::Regulatory, &regulatory::result_schema())?;
    verifier.register_schema(CapabilityKind::Simulation, &simulation::result_schema())?;

    let products: Vec<String> = LABELS.iter().map(|l| l.product.to_lowercase()).collect();
    verifier.register_rule(
        "product-in-evidence",
        Box::new(move |claim: &Claim, evidence: &[&Evidence]| {
            let text = claim.text.to_lowercase();
            let named = products.iter().find(|p| text.contains(p.as_str()))?;
            let backed = evidence.iter().any(|e| e.text.to_lowercase().contains(named.as_str()));
            (!backed).then(|| format!("no cited label mentions '{named}'"))
        }),
    );
    Ok(verifier)
}

/// A fully wired reference runtime.
pub struct Runtime {
    pub orchestrator: Orchestrator,
    pub sessions: Arc<LeasedSessionStore>,
    pub jobs: WorkerPool,
    pub config: Arc<FurrowConfig>,
}

impl Runtime {
    /// Wire the runtime. Must be called from within a tokio runtime.
    pub fn build(config: FurrowConfig, backends: Backends, synthesizer: Arc<dyn Synthesizer>) -> FurrowResult<Self> {
        let config = Arc::new(config);

        let gate = PolicyGate::new(config.guardrail.clone())?;
        let planner = KeywordPlanner::new(vocabulary());
        let sessions = Arc::new(LeasedSessionStore::from_config(&config)?);
        let jobs = WorkerPool::from_config(&config.jobs, backends.model)?;

        let agents = AgentRoster::new(
            Arc::new(GeospatialAgent::new(
                backends.conditions,
                config.timeouts.for_capability(CapabilityKind::Geospatial),
            )),
            Arc::new(RegulatoryAgent::new(
                backends.knowledge,
                config.timeouts.for_capability(CapabilityKind::Regulatory),
            )),
            Arc::new(SimulationAgent::new(Arc::new(jobs.clone()) as Arc<dyn JobQueue>)),
        )?;

        let controller = Controller::new(
            config.clone(),
            Arc::new(gate),
            Arc::new(planner),
            synthesizer,
            Arc::new(verifier()?),
            agents,
            sessions.clone(),
        );

        Ok(Self { orchestrator: Orchestrator::new(controller), sessions, jobs, config })
    }

    /// Packaged configuration, mock backends, evidence-only synthesis.
    pub fn reference() -> FurrowResult<Self> {
        Self::build(load_config()?, Backends::mock(), Arc::new(EvidenceSynthesizer::default()))
    }
}
