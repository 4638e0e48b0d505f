//! The closed capability set and the plan built from it.
//!
//! Capabilities are a fixed tagged set. Adding one means adding a variant
//! here and an agent for it; there is no open registration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A category of external work the controller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    /// Weather and soil observations for a coordinate.
    Geospatial,
    /// Hybrid retrieval over the product registration knowledge layer.
    Regulatory,
    /// Long-running legacy crop simulation, executed as a job.
    Simulation,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [
        CapabilityKind::Geospatial,
        CapabilityKind::Regulatory,
        CapabilityKind::Simulation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::Geospatial => "geospatial",
            CapabilityKind::Regulatory => "regulatory",
            CapabilityKind::Simulation => "simulation",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured parameters for a simulation run.
///
/// `parameters` is a `BTreeMap` so serialisation order is stable, which the
/// job queue relies on when fingerprinting identical submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    /// Simulation model name, e.g. "wheat-yield".
    pub model: String,
    pub crop: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// The fixed input schema for each capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "kebab-case")]
pub enum CapabilityInput {
    Geospatial {
        latitude: f64,
        longitude: f64,
        /// How many days of observations to summarise.
        lookback_days: u32,
    },
    Regulatory {
        query: String,
        /// Entities the structured lookup is anchored on (weed, crop, product).
        target_entities: Vec<String>,
    },
    Simulation {
        scenario: ScenarioParams,
    },
}

impl CapabilityInput {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            CapabilityInput::Geospatial { .. } => CapabilityKind::Geospatial,
            CapabilityInput::Regulatory { .. } => CapabilityKind::Regulatory,
            CapabilityInput::Simulation { .. } => CapabilityKind::Simulation,
        }
    }
}

/// One capability the plan requires, with its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub capability: CapabilityKind,
    pub input: CapabilityInput,
}

/// The ordered set of capabilities required for one planning pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    pub pass: u32,
    pub steps: Vec<PlannedTask>,
    /// Revision context the planner took into account.
    #[serde(default)]
    pub context: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The capabilities in plan order.
    pub fn capabilities(&self) -> Vec<CapabilityKind> {
        self.steps.iter().map(|s| s.capability).collect()
    }
}
