//! A synthesizer that writes rates from memory.
//!
//! Stands in for a language model drafting an answer: on the first pass it
//! states the application rate it "remembers" for the best-ranked product and
//! cites that product's label, whether or not the label agrees. Once a pass
//! has been revised it grounds every sentence in evidence instead.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use furrow_contracts::{
    answer::{Claim, ClaimKind, DraftAnswer, EvidenceRef},
    capability::CapabilityKind,
    error::FurrowResult,
    request::Request,
    task::{AgentTask, Evidence},
};
use furrow_core::{
    synth::{claims_for, gap_note},
    traits::Synthesizer,
    EvidenceSynthesizer,
};

pub struct RecallSynthesizer {
    recalled: HashMap<String, (f64, String)>,
    grounded: EvidenceSynthesizer,
}

impl RecallSynthesizer {
    pub fn new(recalled: &[(&str, f64, &str)]) -> Self {
        Self {
            recalled: recalled
                .iter()
                .map(|(product, value, unit)| (product.to_lowercase(), (*value, unit.to_string())))
                .collect(),
            grounded: EvidenceSynthesizer::default(),
        }
    }

    /// Best-scored label evidence whose product has a remembered rate.
    fn recall<'s, 't>(&'s self, task: &'t AgentTask) -> Option<(&'t Evidence, &'t str, f64, &'s str)> {
        let mut evidence: Vec<&Evidence> = task.result.iter().flat_map(|r| r.evidence.iter()).collect();
        evidence.sort_by(|a, b| b.score.total_cmp(&a.score));
        evidence.into_iter().find_map(|e| {
            let product = e.entities.first()?;
            let (value, unit) = self.recalled.get(&product.to_lowercase())?;
            Some((e, product.as_str(), *value, unit.as_str()))
        })
    }
}

#[async_trait]
impl Synthesizer for RecallSynthesizer {
    async fn synthesize(&self, request: &Request, tasks: &[AgentTask]) -> FurrowResult<DraftAnswer> {
        if request.revision_count > 0 {
            return self.grounded.synthesize(request, tasks).await;
        }

        let mut claims = Vec::new();
        let mut lines = Vec::new();
        let mut next_id = 0usize;

        for task in tasks {
            if !task.is_usable() {
                lines.push(gap_note(task));
                continue;
            }
            if task.capability != CapabilityKind::Regulatory {
                let top: Vec<&Evidence> = task.result.iter().flat_map(|r| r.evidence.iter()).take(1).collect();
                let task_claims = claims_for(task, &top, &mut next_id);
                lines.extend(task_claims.iter().map(|c| c.text.clone()));
                claims.extend(task_claims);
                continue;
            }
            let Some((evidence, product, value, unit)) = self.recall(task) else {
                continue;
            };

            let targets = evidence.entities[1..].join(" in ");
            let text = format!("Apply {product} at {value} {unit} for {targets}.");
            next_id += 1;
            debug!(product, value, unit, "rate drafted from recall");
            claims.push(Claim {
                id: format!("c{next_id}"),
                text: text.clone(),
                kind: ClaimKind::Quantity { value, unit: unit.to_string() },
                evidence: vec![EvidenceRef {
                    task_id: task.id,
                    capability: task.capability,
                    evidence_id: evidence.id.clone(),
                }],
                entities: evidence.entities.clone(),
            });
            lines.push(text);
        }

        Ok(DraftAnswer { text: lines.join(" "), claims, pass: request.pass })
    }
}
