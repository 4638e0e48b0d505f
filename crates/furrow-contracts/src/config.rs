//! The configuration surface.
//!
//! One `FurrowConfig` is built at startup and shared read-only with every
//! collaborator. Loading and validation live in `furrow-core::config`; this
//! module only defines the shape so every crate can read it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityKind;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FurrowConfig {
    /// Maximum number of revision passes per request.
    #[serde(default = "default_revision_ceiling")]
    pub revision_ceiling: u32,
    pub guardrail: GuardrailPolicy,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub jobs: JobConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

fn default_revision_ceiling() -> u32 {
    2
}

/// A topic the input gate recognises by keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRule {
    pub id: String,
    /// Category reported on the verdict, e.g. "agronomy" or "medical".
    pub category: String,
    /// Lower-case keywords; any whole-word hit matches the topic.
    pub keywords: Vec<String>,
}

/// Guardrail policy: which topics are in scope and which attacks to refuse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailPolicy {
    #[serde(default)]
    pub allowed_topics: Vec<TopicRule>,
    #[serde(default)]
    pub denied_topics: Vec<TopicRule>,
    /// Regular expressions, matched case-insensitively.
    #[serde(default)]
    pub jailbreak_patterns: Vec<String>,
    /// Category attached to fail-closed verdicts.
    #[serde(default = "default_fail_closed_category")]
    pub fail_closed_category: String,
    /// Allowed-topic matches below this confidence are blocked as off-topic.
    #[serde(default)]
    pub min_confidence: f32,
}

fn default_fail_closed_category() -> String {
    "gate-unavailable".to_string()
}

/// Latency bounds, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub geospatial_ms: u64,
    pub regulatory_ms: u64,
    pub simulation_ms: u64,
    pub plan_deadline_ms: u64,
    pub request_deadline_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            geospatial_ms: 2_000,
            regulatory_ms: 3_000,
            simulation_ms: 600_000,
            plan_deadline_ms: 660_000,
            request_deadline_ms: 1_800_000,
            poll_interval_ms: 250,
        }
    }
}

impl TimeoutConfig {
    /// The per-task bound for a capability.
    pub fn for_capability(&self, capability: CapabilityKind) -> Duration {
        let ms = match capability {
            CapabilityKind::Geospatial => self.geospatial_ms,
            CapabilityKind::Regulatory => self.regulatory_ms,
            CapabilityKind::Simulation => self.simulation_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn plan_deadline(&self) -> Duration {
        Duration::from_millis(self.plan_deadline_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Worker pool sizing and job persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub workers: usize,
    /// Jobs that may wait for a worker before submissions are rejected.
    pub queue_depth: usize,
    /// Directory for the durable job store. Temporary storage when absent.
    pub store_path: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { workers: 2, queue_depth: 8, store_path: None }
    }
}

/// What a second request on a busy session does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentionPolicy {
    /// Wait for the lease.
    #[default]
    Queue,
    /// Refuse immediately with `SessionBusy`.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub lease_timeout_ms: u64,
    #[serde(default)]
    pub contention: ContentionPolicy,
    /// Directory for durable requests and history. In-memory when absent.
    pub store_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lease_timeout_ms: 30_000,
            contention: ContentionPolicy::Queue,
            store_path: None,
        }
    }
}

impl SessionConfig {
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }
}
