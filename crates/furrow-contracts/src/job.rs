//! Durable job records for asynchronous capability work.
//!
//! A job outlives the controller that submitted it: its record is written to
//! the job store on every state change, so a restarted controller can still
//! read a terminal outcome.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    capability::{CapabilityKind, ScenarioParams},
    request::SessionId,
    task::{TaskId, TaskResult},
};

/// Unique job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What the simulation worker is asked to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub session_id: SessionId,
    pub capability: CapabilityKind,
    /// The task that first asked for this job.
    pub task_id: TaskId,
    pub scenario: ScenarioParams,
}

impl JobSpec {
    /// Canonical text of the fields that define job identity.
    ///
    /// The owning task is deliberately excluded: two tasks asking for the same
    /// scenario in the same session share one job.
    pub fn canonical_key(&self) -> String {
        let params = serde_json::to_string(&self.scenario).unwrap_or_default();
        format!("{}|{}|{}", self.session_id, self.capability, params)
    }
}

/// The stored state of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Hex digest of `JobSpec::canonical_key`.
    pub fingerprint: String,
    pub spec: JobSpec,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    /// Cancel arrived while the worker was already executing; the result,
    /// when it lands, is recorded and ignored.
    #[serde(default)]
    pub abandoned: bool,
}

impl JobRecord {
    pub fn new(id: JobId, fingerprint: String, spec: JobSpec) -> Self {
        Self {
            id,
            fingerprint,
            spec,
            state: JobState::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_polled_at: None,
            result: None,
            error: None,
            abandoned: false,
        }
    }
}
