//! Simulation agent: turns a scenario into a job and tracks it.
//!
//! The agent never runs the model itself. `submit` hands a `JobSpec` to the
//! shared `JobQueue` and returns a handle bound to the job id; `poll` maps the
//! job record back to a task outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use furrow_contracts::{
    capability::{CapabilityInput, CapabilityKind},
    error::FurrowResult,
    job::{JobRecord, JobSpec, JobState},
    task::{AgentTask, HandleBinding, TaskErrorKind, TaskHandle, TaskOutcome},
};
use furrow_core::traits::{CapabilityAgent, JobQueue};

use crate::wrong_input;

pub struct SimulationAgent {
    queue: Arc<dyn JobQueue>,
}

impl SimulationAgent {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }
}

/// Task outcome for the current state of a job.
pub fn outcome_for(record: &JobRecord) -> TaskOutcome {
    if record.abandoned {
        return TaskOutcome::failed(TaskErrorKind::Cancelled, "job was abandoned after cancellation");
    }
    match record.state {
        JobState::Queued => TaskOutcome::pending(),
        JobState::Running => TaskOutcome::running(),
        JobState::Succeeded => match &record.result {
            Some(result) => TaskOutcome::done(result.clone()),
            None => TaskOutcome::failed(TaskErrorKind::Failure, "job succeeded without a result"),
        },
        JobState::Failed => TaskOutcome::failed(
            TaskErrorKind::Failure,
            record.error.clone().unwrap_or_else(|| "job failed".to_string()),
        ),
        JobState::Cancelled => TaskOutcome::failed(TaskErrorKind::Cancelled, "job cancelled"),
    }
}

/// JSON Schema for the result payload.
pub fn result_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["model", "yield_t_ha"],
        "properties": {
            "model": { "type": "string" },
            "crop": { "type": "string" },
            "yield_t_ha": { "type": "number", "minimum": 0 }
        }
    })
}

#[async_trait]
impl CapabilityAgent for SimulationAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Simulation
    }

    async fn submit(&self, task: &AgentTask) -> FurrowResult<TaskHandle> {
        let scenario = match &task.input {
            CapabilityInput::Simulation { scenario } => scenario.clone(),
            other => return Ok(TaskHandle::resolved(task.id, self.kind(), wrong_input(self.kind(), other))),
        };

        let spec = JobSpec {
            session_id: task.session_id.clone(),
            capability: self.kind(),
            task_id: task.id,
            scenario,
        };
        let job_id = self.queue.submit(spec).await?;
        info!(task_id = %task.id, job_id = %job_id, "simulation job bound");
        Ok(TaskHandle::job(task.id, self.kind(), job_id))
    }

    async fn poll(&self, handle: &TaskHandle) -> FurrowResult<TaskOutcome> {
        match &handle.binding {
            HandleBinding::Resolved(outcome) => Ok(outcome.clone()),
            HandleBinding::Job(job_id) => {
                let record = self.queue.status(job_id).await?;
                debug!(job_id = %job_id, state = %record.state, "simulation job polled");
                Ok(outcome_for(&record))
            }
        }
    }

    async fn cancel(&self, handle: &TaskHandle) -> FurrowResult<()> {
        match handle.job_id() {
            Some(job_id) => self.queue.cancel(&job_id).await,
            None => Ok(()),
        }
    }
}
