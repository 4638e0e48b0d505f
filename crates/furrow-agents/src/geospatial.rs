//! Geospatial agent: recent weather and soil conditions at a coordinate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use furrow_contracts::{
    capability::{CapabilityInput, CapabilityKind},
    error::FurrowResult,
    task::{AgentTask, Evidence, EvidenceSource, TaskErrorKind, TaskHandle, TaskOutcome, TaskResult},
};
use furrow_core::traits::CapabilityAgent;

use crate::{resolved_poll, wrong_input};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub rainfall_mm: f64,
    pub mean_temp_c: f64,
    pub lookback_days: u32,
    /// Station or grid cell the figures came from.
    pub station: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilProfile {
    pub texture: String,
    pub ph: f64,
    pub organic_carbon_pct: f64,
    pub source: String,
}

/// External weather and soil data.
#[async_trait]
pub trait ConditionsSource: Send + Sync {
    async fn weather(&self, latitude: f64, longitude: f64, lookback_days: u32) -> FurrowResult<WeatherObservation>;

    async fn soil(&self, latitude: f64, longitude: f64) -> FurrowResult<SoilProfile>;
}

/// Bounded-latency agent; always resolves within `timeout`.
pub struct GeospatialAgent {
    source: Arc<dyn ConditionsSource>,
    timeout: Duration,
}

impl GeospatialAgent {
    pub fn new(source: Arc<dyn ConditionsSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    async fn lookup(&self, latitude: f64, longitude: f64, lookback_days: u32) -> TaskOutcome {
        let both = async {
            tokio::try_join!(
                self.source.weather(latitude, longitude, lookback_days),
                self.source.soil(latitude, longitude),
            )
        };

        match tokio::time::timeout(self.timeout, both).await {
            Ok(Ok((weather, soil))) => TaskOutcome::done(conditions_result(&weather, &soil)),
            Ok(Err(e)) => {
                warn!(error = %e, "conditions lookup failed");
                TaskOutcome::failed(TaskErrorKind::Failure, e.to_string())
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "conditions lookup timed out");
                TaskOutcome::failed(
                    TaskErrorKind::Timeout,
                    format!(
                        "weather and soil lookup at ({latitude}, {longitude}) did not answer within {} ms",
                        self.timeout.as_millis()
                    ),
                )
            }
        }
    }
}

fn conditions_result(weather: &WeatherObservation, soil: &SoilProfile) -> TaskResult {
    let days = weather.lookback_days;
    let evidence = vec![
        Evidence {
            id: format!("rain-{days}d"),
            source: EvidenceSource::Observation,
            title: format!("Rainfall, last {days} days"),
            text: format!("Rainfall over the last {days} days was {} mm.", weather.rainfall_mm),
            reference: weather.station.clone(),
            score: 1.0,
            entities: vec![],
        },
        Evidence {
            id: "soil".to_string(),
            source: EvidenceSource::Observation,
            title: "Soil profile".to_string(),
            text: format!("Soil is {} with pH {}.", soil.texture, soil.ph),
            reference: soil.source.clone(),
            score: 0.8,
            entities: vec![],
        },
    ];

    TaskResult {
        summary: format!("{} mm rain over {days} days, {} soil", weather.rainfall_mm, soil.texture),
        evidence,
        payload: json!({
            "rainfall_mm": weather.rainfall_mm,
            "mean_temp_c": weather.mean_temp_c,
            "lookback_days": days,
            "soil": {
                "texture": soil.texture,
                "ph": soil.ph,
                "organic_carbon_pct": soil.organic_carbon_pct,
            },
        }),
    }
}

/// JSON Schema for the result payload.
pub fn result_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["rainfall_mm", "lookback_days", "soil"],
        "properties": {
            "rainfall_mm": { "type": "number", "minimum": 0 },
            "mean_temp_c": { "type": "number" },
            "lookback_days": { "type": "integer", "minimum": 1 },
            "soil": {
                "type": "object",
                "required": ["texture", "ph"],
                "properties": {
                    "texture": { "type": "string" },
                    "ph": { "type": "number", "minimum": 0, "maximum": 14 }
                }
            }
        }
    })
}

#[async_trait]
impl CapabilityAgent for GeospatialAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Geospatial
    }

    async fn submit(&self, task: &AgentTask) -> FurrowResult<TaskHandle> {
        let outcome = match &task.input {
            CapabilityInput::Geospatial { latitude, longitude, lookback_days } => {
                debug!(task_id = %task.id, latitude, longitude, "geospatial lookup");
                self.lookup(*latitude, *longitude, *lookback_days).await
            }
            other => wrong_input(self.kind(), other),
        };
        Ok(TaskHandle::resolved(task.id, self.kind(), outcome))
    }

    async fn poll(&self, handle: &TaskHandle) -> FurrowResult<TaskOutcome> {
        resolved_poll(handle)
    }

    async fn cancel(&self, _handle: &TaskHandle) -> FurrowResult<()> {
        Ok(())
    }
}
