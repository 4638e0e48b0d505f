//! Agent tasks, their handles, and the evidence they return.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    capability::{CapabilityInput, CapabilityKind},
    job::JobId,
    request::{RequestId, SessionId},
};

/// Unique identifier for one task within one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub uuid::Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed-out",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceSource {
    /// Semantic similarity lookup.
    Semantic,
    /// Structured relationship query.
    Structured,
    /// Weather or soil observation.
    Observation,
    /// Simulation output.
    Simulation,
}

/// A single retrieved item a claim can cite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Unique within the task result.
    pub id: String,
    pub source: EvidenceSource,
    pub title: String,
    pub text: String,
    /// Human-readable citation, e.g. a registration number.
    pub reference: String,
    /// Ranking score, higher is better.
    pub score: f32,
    /// Entities this item is about (product, weed, crop names).
    #[serde(default)]
    pub entities: Vec<String>,
}

/// The payload of a successful task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub summary: String,
    pub evidence: Vec<Evidence>,
    /// Capability-specific structured payload, validated against its schema.
    pub payload: serde_json::Value,
}

/// Why a task did not produce a usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskErrorKind {
    Timeout,
    Failure,
    /// The job queue refused the submission.
    Backpressure,
    Cancelled,
    /// The result did not match the capability's result schema.
    InvalidResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Status plus result or error, as returned by `poll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
}

impl TaskOutcome {
    pub fn pending() -> Self {
        Self { status: TaskStatus::Pending, result: None, error: None }
    }

    pub fn running() -> Self {
        Self { status: TaskStatus::Running, result: None, error: None }
    }

    pub fn done(result: TaskResult) -> Self {
        Self { status: TaskStatus::Done, result: Some(result), error: None }
    }

    pub fn failed(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        let status = match kind {
            TaskErrorKind::Timeout => TaskStatus::TimedOut,
            TaskErrorKind::Cancelled => TaskStatus::Cancelled,
            _ => TaskStatus::Failed,
        };
        Self { status, result: None, error: Some(TaskError::new(kind, message)) }
    }
}

/// What `submit` hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HandleBinding {
    /// The capability finished during `submit`.
    Resolved(TaskOutcome),
    /// The work continues as a queued job.
    Job(JobId),
}

/// A handle to submitted capability work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: TaskId,
    pub capability: CapabilityKind,
    pub binding: HandleBinding,
}

impl TaskHandle {
    pub fn resolved(task_id: TaskId, capability: CapabilityKind, outcome: TaskOutcome) -> Self {
        Self { task_id, capability, binding: HandleBinding::Resolved(outcome) }
    }

    pub fn job(task_id: TaskId, capability: CapabilityKind, job_id: JobId) -> Self {
        Self { task_id, capability, binding: HandleBinding::Job(job_id) }
    }

    pub fn job_id(&self) -> Option<JobId> {
        match &self.binding {
            HandleBinding::Job(id) => Some(*id),
            HandleBinding::Resolved(_) => None,
        }
    }
}

/// One unit of capability work for one planning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: TaskId,
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub pass: u32,
    pub capability: CapabilityKind,
    pub input: CapabilityInput,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
    /// Bound once a job has been queued for this task.
    pub job_id: Option<JobId>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub fn new(request_id: RequestId, session_id: SessionId, pass: u32, input: CapabilityInput) -> Self {
        Self {
            id: TaskId::new(),
            request_id,
            session_id,
            pass,
            capability: input.kind(),
            input,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            job_id: None,
            submitted_at: None,
            finished_at: None,
        }
    }

    /// Copy a terminal or in-flight outcome onto the task.
    pub fn apply(&mut self, outcome: TaskOutcome) {
        self.status = outcome.status;
        self.result = outcome.result;
        self.error = outcome.error;
        if self.status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn is_usable(&self) -> bool {
        self.status == TaskStatus::Done && self.result.is_some()
    }

    /// Look up one of this task's evidence items by ID.
    pub fn evidence(&self, evidence_id: &str) -> Option<&Evidence> {
        self.result
            .as_ref()
            .and_then(|r| r.evidence.iter().find(|e| e.id == evidence_id))
    }
}
