//! Evidence-only synthesis.
//!
//! Every sentence of the draft is lifted from a task result and cited to the
//! evidence item it came from, so a draft built here is traceable by
//! construction. Model-backed synthesizers plug in behind the same trait and
//! are held to the same standard by the verifier.

use async_trait::async_trait;

use furrow_contracts::{
    answer::{Claim, ClaimKind, DraftAnswer, EvidenceRef},
    error::FurrowResult,
    request::Request,
    task::{AgentTask, Evidence},
};

use crate::{quantity, traits::Synthesizer};

/// Text delivered when no capability applied to the query.
pub const FALLBACK_TEXT: &str =
    "I could not match this question to weather, label registration, or crop simulation data, \
     so I have no evidence-backed answer to give.";

/// A draft with no claims, used when the plan was empty.
pub fn fallback_draft(pass: u32) -> DraftAnswer {
    DraftAnswer { text: FALLBACK_TEXT.to_string(), claims: Vec::new(), pass }
}

/// Builds drafts from the highest-scoring evidence of each usable task.
pub struct EvidenceSynthesizer {
    per_task: usize,
}

impl EvidenceSynthesizer {
    pub fn new(per_task: usize) -> Self {
        Self { per_task: per_task.max(1) }
    }

    fn top_evidence(task: &AgentTask, n: usize) -> Vec<&Evidence> {
        let mut items: Vec<&Evidence> = task.result.iter().flat_map(|r| r.evidence.iter()).collect();
        items.sort_by(|a, b| b.score.total_cmp(&a.score));
        items.truncate(n);
        items
    }
}

impl Default for EvidenceSynthesizer {
    fn default() -> Self {
        Self::new(2)
    }
}

fn cite(task: &AgentTask, evidence: &Evidence) -> EvidenceRef {
    EvidenceRef {
        task_id: task.id,
        capability: task.capability,
        evidence_id: evidence.id.clone(),
    }
}

/// Statement and rate claims for one task's top evidence.
pub fn claims_for(task: &AgentTask, evidence: &[&Evidence], next_id: &mut usize) -> Vec<Claim> {
    let mut claims = Vec::new();
    for item in evidence {
        *next_id += 1;
        claims.push(Claim {
            id: format!("c{next_id}"),
            text: item.text.clone(),
            kind: ClaimKind::Statement,
            evidence: vec![cite(task, item)],
            entities: item.entities.clone(),
        });
        for q in quantity::extract(&item.text).into_iter().filter(|q| quantity::is_rate_unit(&q.unit)) {
            *next_id += 1;
            claims.push(Claim {
                id: format!("c{next_id}"),
                text: format!("{} {} ({})", q.value, q.unit, item.title),
                kind: ClaimKind::Quantity { value: q.value, unit: q.unit },
                evidence: vec![cite(task, item)],
                entities: item.entities.clone(),
            });
        }
    }
    claims
}

/// One sentence noting a capability that did not contribute.
pub fn gap_note(task: &AgentTask) -> String {
    format!("Note: {} data was unavailable ({}).", task.capability, task.status)
}

#[async_trait]
impl Synthesizer for EvidenceSynthesizer {
    async fn synthesize(&self, request: &Request, tasks: &[AgentTask]) -> FurrowResult<DraftAnswer> {
        let mut claims = Vec::new();
        let mut lines = Vec::new();
        let mut next_id = 0usize;

        for task in tasks {
            if task.is_usable() {
                let evidence = Self::top_evidence(task, self.per_task);
                let task_claims = claims_for(task, &evidence, &mut next_id);
                lines.extend(
                    task_claims
                        .iter()
                        .filter(|c| matches!(c.kind, ClaimKind::Statement))
                        .map(|c| c.text.clone()),
                );
                claims.extend(task_claims);
            } else {
                lines.push(gap_note(task));
            }
        }

        if claims.is_empty() && lines.is_empty() {
            return Ok(fallback_draft(request.pass));
        }

        Ok(DraftAnswer { text: lines.join(" "), claims, pass: request.pass })
    }
}
