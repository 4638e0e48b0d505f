//! # furrow-agents
//!
//! The three capability agents. Each implements `CapabilityAgent` over a
//! backend trait, so real services and test doubles plug in the same way.
//!
//! | Agent | Backend | Completion |
//! |---|---|---|
//! | [`GeospatialAgent`] | [`ConditionsSource`] | resolved in `submit`, bounded by its timeout |
//! | [`RegulatoryAgent`] | [`KnowledgeLayer`] | resolved in `submit`, bounded by its timeout |
//! | [`SimulationAgent`] | `JobQueue` | bound to a job, resolved by `poll` |

pub mod geospatial;
pub mod regulatory;
pub mod simulation;

pub use geospatial::{ConditionsSource, GeospatialAgent, SoilProfile, WeatherObservation};
pub use regulatory::{KnowledgeLayer, RegulatoryAgent};
pub use simulation::SimulationAgent;

use furrow_contracts::{
    capability::{CapabilityInput, CapabilityKind},
    error::{FurrowError, FurrowResult},
    task::{HandleBinding, TaskErrorKind, TaskHandle, TaskOutcome},
};

/// Poll for agents whose handles are always resolved at submit time.
pub(crate) fn resolved_poll(handle: &TaskHandle) -> FurrowResult<TaskOutcome> {
    match &handle.binding {
        HandleBinding::Resolved(outcome) => Ok(outcome.clone()),
        HandleBinding::Job(job_id) => Err(FurrowError::InternalFailure {
            reason: format!("{} agent handed a job handle ({job_id})", handle.capability),
        }),
    }
}

pub(crate) fn wrong_input(kind: CapabilityKind, input: &CapabilityInput) -> TaskOutcome {
    TaskOutcome::failed(
        TaskErrorKind::Failure,
        format!("{kind} agent cannot take {} input", input.kind()),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use furrow_contracts::{
        capability::{CapabilityInput, ScenarioParams},
        error::{FurrowError, FurrowResult},
        job::{JobId, JobRecord, JobSpec, JobState},
        request::{RequestId, SessionId},
        task::{AgentTask, Evidence, EvidenceSource, TaskResult, TaskStatus},
    };
    use furrow_core::traits::{CapabilityAgent, JobQueue};

    use super::*;

    fn task(input: CapabilityInput) -> AgentTask {
        AgentTask::new(RequestId::new(), SessionId::new("s1"), 0, input)
    }

    fn geo_input() -> CapabilityInput {
        CapabilityInput::Geospatial { latitude: -31.9, longitude: 116.0, lookback_days: 7 }
    }

    fn reg_input() -> CapabilityInput {
        CapabilityInput::Regulatory {
            query: "herbicide for ryegrass in wheat".into(),
            target_entities: vec!["ryegrass".into(), "wheat".into()],
        }
    }

    fn sim_input() -> CapabilityInput {
        CapabilityInput::Simulation {
            scenario: ScenarioParams {
                model: "crop-yield".into(),
                crop: "wheat".into(),
                latitude: -31.9,
                longitude: 116.0,
                parameters: BTreeMap::new(),
            },
        }
    }

    fn passage(id: &str, score: f32) -> Evidence {
        Evidence {
            id: id.into(),
            source: EvidenceSource::Semantic,
            title: id.into(),
            text: format!("{id} label text"),
            reference: format!("APVMA {id}"),
            score,
            entities: vec![],
        }
    }

    // ── Geospatial ───────────────────────────────────────────────────────────

    struct Conditions {
        latency: Duration,
        fail: bool,
    }

    #[async_trait]
    impl ConditionsSource for Conditions {
        async fn weather(&self, _lat: f64, _lon: f64, lookback_days: u32) -> FurrowResult<WeatherObservation> {
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(FurrowError::AgentError { capability: "geospatial".into(), reason: "station offline".into() });
            }
            Ok(WeatherObservation { rainfall_mm: 12.0, mean_temp_c: 18.5, lookback_days, station: "BoM 009021".into() })
        }

        async fn soil(&self, _lat: f64, _lon: f64) -> FurrowResult<SoilProfile> {
            Ok(SoilProfile { texture: "sandy loam".into(), ph: 5.8, organic_carbon_pct: 1.1, source: "ASRIS".into() })
        }
    }

    fn geo_agent(latency_ms: u64, fail: bool) -> GeospatialAgent {
        GeospatialAgent::new(
            Arc::new(Conditions { latency: Duration::from_millis(latency_ms), fail }),
            Duration::from_millis(2_000),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn geospatial_resolves_with_observations() {
        let agent = geo_agent(200, false);
        let handle = agent.submit(&task(geo_input())).await.unwrap();
        let outcome = agent.poll(&handle).await.unwrap();

        assert_eq!(outcome.status, TaskStatus::Done);
        let result = outcome.result.unwrap();
        let rain = result.evidence.iter().find(|e| e.id == "rain-7d").unwrap();
        assert_eq!(rain.text, "Rainfall over the last 7 days was 12 mm.");
        assert_eq!(rain.source, EvidenceSource::Observation);
        assert_eq!(result.payload["soil"]["texture"], "sandy loam");
    }

    #[tokio::test(start_paused = true)]
    async fn geospatial_timeout_is_a_task_status_not_an_error() {
        let agent = geo_agent(5_000, false);
        let handle = agent.submit(&task(geo_input())).await.unwrap();
        let outcome = agent.poll(&handle).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::TimedOut);
        assert!(outcome.error.unwrap().message.contains("2000 ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn geospatial_backend_failure_fails_task() {
        let agent = geo_agent(10, true);
        let outcome = agent.poll(&agent.submit(&task(geo_input())).await.unwrap()).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(outcome.error.unwrap().message.contains("station offline"));
    }

    #[tokio::test]
    async fn agent_refuses_foreign_input() {
        let agent = geo_agent(10, false);
        let outcome = agent.poll(&agent.submit(&task(reg_input())).await.unwrap()).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Failed);
    }

    // ── Regulatory ───────────────────────────────────────────────────────────

    struct Labels {
        semantic: FurrowResult<Vec<Evidence>>,
        structured: FurrowResult<Vec<Evidence>>,
        latency: Duration,
    }

    fn clone_result(r: &FurrowResult<Vec<Evidence>>) -> FurrowResult<Vec<Evidence>> {
        match r {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(FurrowError::AgentError { capability: "regulatory".into(), reason: e.to_string() }),
        }
    }

    #[async_trait]
    impl KnowledgeLayer for Labels {
        async fn semantic_search(&self, _query: &str, _limit: usize) -> FurrowResult<Vec<Evidence>> {
            tokio::time::sleep(self.latency).await;
            clone_result(&self.semantic)
        }

        async fn structured_query(&self, _entities: &[String]) -> FurrowResult<Vec<Evidence>> {
            tokio::time::sleep(self.latency).await;
            clone_result(&self.structured)
        }
    }

    fn reg_agent(labels: Labels) -> RegulatoryAgent {
        RegulatoryAgent::new(Arc::new(labels), Duration::from_millis(3_000))
    }

    fn down() -> FurrowResult<Vec<Evidence>> {
        Err(FurrowError::AgentError { capability: "regulatory".into(), reason: "index down".into() })
    }

    #[test]
    fn merge_tags_dedupes_and_ranks() {
        let semantic = vec![passage("a", 0.9), passage("b", 0.5)];
        let structured = vec![passage("b", 0.7), passage("c", 0.9)];
        let merged = regulatory::merge(semantic, structured, 10);

        let ids: Vec<&str> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"], "ties rank structured first");
        assert_eq!(merged[0].source, EvidenceSource::Structured);
        assert_eq!(merged[1].source, EvidenceSource::Semantic);
        assert_eq!(merged[2].source, EvidenceSource::Structured, "found by both lookups");
        assert_eq!(merged[2].score, 0.7);
    }

    #[test]
    fn merge_respects_limit() {
        let semantic = (0..10).map(|i| passage(&format!("p{i}"), i as f32 / 10.0)).collect();
        assert_eq!(regulatory::merge(semantic, vec![], 3).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn regulatory_queries_both_lookups_concurrently() {
        let agent = reg_agent(Labels {
            semantic: Ok(vec![passage("a", 0.6)]),
            structured: Ok(vec![passage("b", 0.8)]),
            latency: Duration::from_millis(800),
        });
        let start = tokio::time::Instant::now();
        let outcome = agent.poll(&agent.submit(&task(reg_input())).await.unwrap()).await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(1_000), "lookups ran in parallel");
        assert_eq!(outcome.status, TaskStatus::Done);
        let result = outcome.result.unwrap();
        assert_eq!(result.evidence.len(), 2);
        assert_eq!(result.payload["structured_hits"], 1);
        assert_eq!(result.payload["items"][0]["source"], "structured");
    }

    #[tokio::test(start_paused = true)]
    async fn regulatory_survives_one_failed_lookup() {
        let agent = reg_agent(Labels { semantic: down(), structured: Ok(vec![passage("b", 0.8)]), latency: Duration::ZERO });
        let outcome = agent.poll(&agent.submit(&task(reg_input())).await.unwrap()).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn regulatory_fails_when_nothing_is_found() {
        let agent = reg_agent(Labels { semantic: down(), structured: down(), latency: Duration::ZERO });
        let outcome = agent.poll(&agent.submit(&task(reg_input())).await.unwrap()).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Failed);

        let agent = reg_agent(Labels { semantic: Ok(vec![]), structured: Ok(vec![]), latency: Duration::ZERO });
        let outcome = agent.poll(&agent.submit(&task(reg_input())).await.unwrap()).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn regulatory_times_out() {
        let agent = reg_agent(Labels { semantic: Ok(vec![]), structured: Ok(vec![]), latency: Duration::from_secs(10) });
        let outcome = agent.poll(&agent.submit(&task(reg_input())).await.unwrap()).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::TimedOut);
    }

    // ── Simulation ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeQueue {
        jobs: Mutex<HashMap<JobId, JobRecord>>,
        reject: bool,
        cancels: Mutex<u32>,
    }

    impl FakeQueue {
        fn set(&self, id: &JobId, state: JobState, result: Option<TaskResult>) {
            let mut jobs = self.jobs.lock().unwrap();
            let record = jobs.get_mut(id).unwrap();
            record.state = state;
            record.result = result;
        }
    }

    #[async_trait]
    impl JobQueue for FakeQueue {
        async fn submit(&self, spec: JobSpec) -> FurrowResult<JobId> {
            if self.reject {
                return Err(FurrowError::JobSubmissionRejected { reason: "full".into() });
            }
            let record = JobRecord::new(JobId::new(), "fp".into(), spec);
            let id = record.id;
            self.jobs.lock().unwrap().insert(id, record);
            Ok(id)
        }

        async fn status(&self, job_id: &JobId) -> FurrowResult<JobRecord> {
            self.jobs
                .lock()
                .unwrap()
                .get(job_id)
                .cloned()
                .ok_or_else(|| FurrowError::NotFound { kind: "job".into(), id: job_id.to_string() })
        }

        async fn cancel(&self, _job_id: &JobId) -> FurrowResult<()> {
            *self.cancels.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn simulation_binds_a_job_and_polls_it() {
        let queue = Arc::new(FakeQueue::default());
        let agent = SimulationAgent::new(queue.clone());
        let t = task(sim_input());

        let handle = agent.submit(&t).await.unwrap();
        let job_id = handle.job_id().unwrap();
        let stored = queue.status(&job_id).await.unwrap();
        assert_eq!(stored.spec.task_id, t.id);
        assert_eq!(stored.spec.session_id, t.session_id);

        assert_eq!(agent.poll(&handle).await.unwrap().status, TaskStatus::Pending);
        queue.set(&job_id, JobState::Running, None);
        assert_eq!(agent.poll(&handle).await.unwrap().status, TaskStatus::Running);

        let result = TaskResult { summary: "3.4 t/ha".into(), evidence: vec![], payload: serde_json::json!({}) };
        queue.set(&job_id, JobState::Succeeded, Some(result.clone()));
        let outcome = agent.poll(&handle).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Done);
        assert_eq!(outcome.result, Some(result));

        agent.cancel(&handle).await.unwrap();
        assert_eq!(*queue.cancels.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn simulation_rejection_reaches_the_caller() {
        let queue = Arc::new(FakeQueue { reject: true, ..Default::default() });
        let agent = SimulationAgent::new(queue);
        let err = agent.submit(&task(sim_input())).await.unwrap_err();
        assert!(matches!(err, FurrowError::JobSubmissionRejected { .. }));
    }

    #[test]
    fn abandoned_job_reads_as_cancelled() {
        let spec = JobSpec {
            session_id: SessionId::new("s1"),
            capability: furrow_contracts::capability::CapabilityKind::Simulation,
            task_id: furrow_contracts::task::TaskId::new(),
            scenario: match sim_input() {
                CapabilityInput::Simulation { scenario } => scenario,
                _ => unreachable!(),
            },
        };
        let mut record = JobRecord::new(JobId::new(), "fp".into(), spec);
        record.state = JobState::Succeeded;
        record.abandoned = true;
        assert_eq!(simulation::outcome_for(&record).status, TaskStatus::Cancelled);

        record.abandoned = false;
        record.state = JobState::Failed;
        record.error = Some("model diverged".into());
        let outcome = simulation::outcome_for(&record);
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.error.unwrap().message, "model diverged");
    }
}
