//! Keyword planner: maps a query onto the capabilities it needs.
//!
//! Matching is deliberately shallow. A query mentioning rain or soil needs the
//! geospatial agent, one mentioning herbicides, labels or a known weed needs
//! the regulatory agent, and one asking for a forecast or yield needs the
//! simulation agent. Coordinates are lifted from "lat, lon" pairs.
//!
//! On a revision pass the planner re-runs the regulatory lookup narrowed to
//! the entities named in the flagged claims, plus any capability that has not
//! yet produced a usable result.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use furrow_contracts::{
    capability::{CapabilityInput, CapabilityKind, Plan, PlannedTask, ScenarioParams},
    error::{FurrowError, FurrowResult},
    request::Request,
};

use crate::traits::Planner;

const GEO_TERMS: &[&str] = &[
    "rain", "rainfall", "weather", "soil", "moisture", "temperature", "frost", "spray window", "wind",
];
const REG_TERMS: &[&str] = &[
    "herbicide", "registered", "registration", "label", "control", "rate", "apply", "permit", "withholding",
];
const SIM_TERMS: &[&str] = &["simulate", "simulation", "yield", "forecast", "model", "scenario"];

/// Named entities the planner recognises.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub crops: Vec<String>,
    #[serde(default)]
    pub weeds: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
}

impl Vocabulary {
    fn find<'a>(terms: &'a [String], text: &str) -> Vec<&'a String> {
        terms.iter().filter(|t| text.contains(&t.to_lowercase())).collect()
    }
}

/// Simulation defaults applied to every scenario the planner builds.
#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub lookback_days: u32,
    pub simulation_model: String,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self { lookback_days: 7, simulation_model: "crop-yield".to_string() }
    }
}

pub struct KeywordPlanner {
    vocabulary: Vocabulary,
    settings: PlannerSettings,
}

fn coordinates() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(-?\d{1,2}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)").expect("coordinate pattern is a valid regex")
    })
}

fn mentions(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

impl KeywordPlanner {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary, settings: PlannerSettings::default() }
    }

    pub fn with_settings(mut self, settings: PlannerSettings) -> Self {
        self.settings = settings;
        self
    }

    fn location(query: &str) -> Option<(f64, f64)> {
        let caps = coordinates().captures(query)?;
        let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let lon = caps.get(2)?.as_str().parse::<f64>().ok()?;
        ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
    }

    /// Entities named in revision hints, in first-seen order.
    fn revision_entities(&self, request: &Request) -> Vec<String> {
        let hints = request.revision_context.join(" ").to_lowercase();
        let mut out: Vec<String> = Vec::new();
        for term in self
            .vocabulary
            .products
            .iter()
            .chain(&self.vocabulary.weeds)
            .chain(&self.vocabulary.crops)
        {
            if hints.contains(&term.to_lowercase()) && !out.contains(term) {
                out.push(term.clone());
            }
        }
        out
    }

    /// Capabilities with no usable result in any earlier pass.
    fn unresolved(request: &Request) -> Vec<CapabilityKind> {
        let planned: Vec<CapabilityKind> = request
            .plan
            .as_ref()
            .map(|p| p.capabilities())
            .unwrap_or_default();
        planned
            .into_iter()
            .filter(|kind| !request.recorded_tasks().any(|t| t.capability == *kind && t.is_usable()))
            .collect()
    }
}

impl Planner for KeywordPlanner {
    fn plan(&self, request: &Request) -> FurrowResult<Plan> {
        let text = request.query.to_lowercase();
        let location = Self::location(&request.query);
        let crops = Vocabulary::find(&self.vocabulary.crops, &text);
        let weeds = Vocabulary::find(&self.vocabulary.weeds, &text);
        let products = Vocabulary::find(&self.vocabulary.products, &text);

        let mut wanted: Vec<CapabilityKind> = Vec::new();
        if mentions(&text, GEO_TERMS) {
            wanted.push(CapabilityKind::Geospatial);
        }
        if mentions(&text, REG_TERMS) || !weeds.is_empty() || !products.is_empty() {
            wanted.push(CapabilityKind::Regulatory);
        }
        if mentions(&text, SIM_TERMS) {
            wanted.push(CapabilityKind::Simulation);
        }

        let mut narrowed: Vec<String> = Vec::new();
        if request.pass > 0 {
            narrowed = self.revision_entities(request);
            let mut targeted = Self::unresolved(request);
            if !request.revision_context.is_empty() && !targeted.contains(&CapabilityKind::Regulatory) {
                targeted.push(CapabilityKind::Regulatory);
            }
            if !targeted.is_empty() {
                wanted.retain(|k| targeted.contains(k));
                if !wanted.contains(&CapabilityKind::Regulatory) && targeted.contains(&CapabilityKind::Regulatory) {
                    wanted.push(CapabilityKind::Regulatory);
                }
            }
        }

        let mut steps = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        for kind in &wanted {
            let input = match kind {
                CapabilityKind::Geospatial => match location {
                    Some((latitude, longitude)) => CapabilityInput::Geospatial {
                        latitude,
                        longitude,
                        lookback_days: self.settings.lookback_days,
                    },
                    None => {
                        missing.push("weather and soil questions need a 'lat, lon' location".to_string());
                        continue;
                    }
                },
                CapabilityKind::Regulatory => {
                    let mut target_entities: Vec<String> =
                        weeds.iter().chain(&products).chain(&crops).map(|s| s.to_string()).collect();
                    let mut query = request.query.clone();
                    for entity in &narrowed {
                        if !target_entities.contains(entity) {
                            target_entities.push(entity.clone());
                        }
                    }
                    if !narrowed.is_empty() {
                        query = format!("{} label rate", narrowed.join(" "));
                    }
                    CapabilityInput::Regulatory { query, target_entities }
                }
                CapabilityKind::Simulation => match (location, crops.first()) {
                    (Some((latitude, longitude)), Some(crop)) => CapabilityInput::Simulation {
                        scenario: ScenarioParams {
                            model: self.settings.simulation_model.clone(),
                            crop: crop.to_string(),
                            latitude,
                            longitude,
                            parameters: BTreeMap::new(),
                        },
                    },
                    _ => {
                        missing.push("simulation needs a crop and a 'lat, lon' location".to_string());
                        continue;
                    }
                },
            };
            steps.push(PlannedTask { capability: *kind, input });
        }

        if steps.is_empty() && !missing.is_empty() {
            return Err(FurrowError::PlanningError { reason: missing.join("; ") });
        }

        debug!(
            request_id = %request.id,
            pass = request.pass,
            capabilities = ?steps.iter().map(|s: &PlannedTask| s.capability).collect::<Vec<_>>(),
            skipped = missing.len(),
            "plan built"
        );

        Ok(Plan { pass: request.pass, steps, context: request.revision_context.clone() })
    }
}
