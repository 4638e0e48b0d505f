//! Mock backends behind the agents' boundary traits.
//!
//! Each backend sleeps for a configurable latency before answering, so the
//! scenarios exercise real concurrency and timeouts.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use furrow_agents::{ConditionsSource, KnowledgeLayer, SoilProfile, WeatherObservation};
use furrow_contracts::{
    error::{FurrowError, FurrowResult},
    job::JobSpec,
    task::{Evidence, EvidenceSource, TaskResult},
};
use furrow_jobs::JobRunner;

use crate::mock_data::{nearest_site, water_limited_yield, Label, LABELS};

// ── Conditions ───────────────────────────────────────────────────────────────

/// Weather and soil from the nearest mock site.
pub struct MockConditions {
    pub latency: Duration,
}

#[async_trait]
impl ConditionsSource for MockConditions {
    async fn weather(&self, latitude: f64, longitude: f64, lookback_days: u32) -> FurrowResult<WeatherObservation> {
        tokio::time::sleep(self.latency).await;
        let site = nearest_site(latitude, longitude);
        let rainfall = (site.rainfall_mm_per_day * lookback_days as f64 * 10.0).round() / 10.0;
        Ok(WeatherObservation {
            rainfall_mm: rainfall,
            mean_temp_c: site.mean_temp_c,
            lookback_days,
            station: format!("{} automatic weather station (mock)", site.name),
        })
    }

    async fn soil(&self, latitude: f64, longitude: f64) -> FurrowResult<SoilProfile> {
        let site = nearest_site(latitude, longitude);
        Ok(SoilProfile {
            texture: site.soil_texture.to_string(),
            ph: site.soil_ph,
            organic_carbon_pct: site.organic_carbon_pct,
            source: format!("{} soil survey (mock)", site.name),
        })
    }
}

// ── Knowledge layer ──────────────────────────────────────────────────────────

/// Label search over [`LABELS`].
///
/// The semantic side scores a label by the share of query words found in its
/// directions. The structured side returns labels linked to every entity.
pub struct MockKnowledge {
    pub latency: Duration,
}

fn label_evidence(label: &Label, score: f32) -> Evidence {
    Evidence {
        id: label.id.to_string(),
        source: EvidenceSource::Semantic,
        title: format!("{} label", label.product),
        text: label.directions.to_string(),
        reference: label.registration.to_string(),
        score,
        entities: label.entities(),
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl KnowledgeLayer for MockKnowledge {
    async fn semantic_search(&self, query: &str, limit: usize) -> FurrowResult<Vec<Evidence>> {
        tokio::time::sleep(self.latency).await;
        let wanted = words(query);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Evidence> = LABELS
            .iter()
            .filter_map(|label| {
                let found = words(label.directions);
                let overlap = wanted.intersection(&found).count();
                (overlap > 0).then(|| label_evidence(label, overlap as f32 / wanted.len() as f32))
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        debug!(hits = hits.len(), "semantic label search");
        Ok(hits)
    }

    async fn structured_query(&self, entities: &[String]) -> FurrowResult<Vec<Evidence>> {
        tokio::time::sleep(self.latency).await;
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let hits: Vec<Evidence> = LABELS
            .iter()
            .filter(|label| entities.iter().all(|e| label.mentions(e)))
            .map(|label| label_evidence(label, 0.9))
            .collect();
        debug!(hits = hits.len(), entities = ?entities, "structured label query");
        Ok(hits)
    }
}

// ── Yield model ──────────────────────────────────────────────────────────────

/// Stand-in for the legacy crop model: takes `run_time` per job.
pub struct MockYieldModel {
    pub run_time: Duration,
    /// Length of the growing season the model assumes.
    pub season_days: u32,
}

#[async_trait]
impl JobRunner for MockYieldModel {
    async fn run(&self, spec: &JobSpec) -> FurrowResult<TaskResult> {
        let scenario = &spec.scenario;
        if scenario.crop.is_empty() {
            return Err(FurrowError::AgentError {
                capability: spec.capability.to_string(),
                reason: "scenario names no crop".to_string(),
            });
        }
        tokio::time::sleep(self.run_time).await;

        let site = nearest_site(scenario.latitude, scenario.longitude);
        let season_rain = scenario
            .parameters
            .get("season_rain_mm")
            .and_then(|v| v.as_f64())
            .unwrap_or(site.rainfall_mm_per_day * self.season_days as f64);
        let yield_t_ha = water_limited_yield(&scenario.crop, season_rain);

        let evidence = Evidence {
            id: "sim-yield".to_string(),
            source: EvidenceSource::Simulation,
            title: format!("{} run for {}", scenario.model, scenario.crop),
            text: format!(
                "Simulated {} yield near {} is {} t/ha on {} mm growing-season rain.",
                scenario.crop, site.name, yield_t_ha, season_rain.round()
            ),
            reference: format!("{} (mock)", scenario.model),
            score: 1.0,
            entities: vec![scenario.crop.clone()],
        };

        Ok(TaskResult {
            summary: format!("{} t/ha {}", yield_t_ha, scenario.crop),
            evidence: vec![evidence],
            payload: json!({
                "model": scenario.model,
                "crop": scenario.crop,
                "yield_t_ha": yield_t_ha,
                "season_rain_mm": season_rain,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use furrow_contracts::{
        capability::{CapabilityKind, ScenarioParams},
        request::SessionId,
        task::TaskId,
    };

    use super::*;

    fn spec(crop: &str) -> JobSpec {
        JobSpec {
            session_id: SessionId::new("farm"),
            capability: CapabilityKind::Simulation,
            task_id: TaskId::new(),
            scenario: ScenarioParams {
                model: "wheat-yield".to_string(),
                crop: crop.to_string(),
                latitude: -31.95,
                longitude: 116.86,
                parameters: BTreeMap::new(),
            },
        }
    }

    // ── Conditions ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn rainfall_scales_with_lookback() {
        let conditions = MockConditions { latency: Duration::from_millis(200) };
        let obs = conditions.weather(-31.95, 116.86, 7).await.unwrap();
        assert_eq!(obs.rainfall_mm, 11.2);
        assert!(obs.station.starts_with("Northam"));
    }

    // ── Knowledge layer ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn structured_query_requires_every_entity() {
        let knowledge = MockKnowledge { latency: Duration::from_millis(10) };
        let hits = knowledge
            .structured_query(&["ryegrass".to_string(), "barley".to_string()])
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["label-trifluralin-wheat-barley"]);
    }

    #[tokio::test(start_paused = true)]
    async fn semantic_search_ranks_by_overlap() {
        let knowledge = MockKnowledge { latency: Duration::from_millis(10) };
        let hits = knowledge.semantic_search("wild radish herbicide", 3).await.unwrap();
        assert!(hits.len() <= 3);
        assert_eq!(hits[0].id, "label-velocity-cereals");
    }

    // ── Yield model ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn yield_model_reports_tonnes_per_hectare() {
        let model = MockYieldModel { run_time: Duration::from_secs(3), season_days: 180 };
        let result = model.run(&spec("wheat")).await.unwrap();
        assert_eq!(result.payload["yield_t_ha"], 3.6);
        assert!(result.evidence[0].text.contains("3.6 t/ha"));
    }

    #[tokio::test(start_paused = true)]
    async fn yield_model_rejects_missing_crop() {
        let model = MockYieldModel { run_time: Duration::from_secs(3), season_days: 180 };
        let err = model.run(&spec("")).await.unwrap_err();
        assert!(matches!(err, FurrowError::AgentError { .. }));
    }
}
