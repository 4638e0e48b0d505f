//! Regulatory agent: hybrid retrieval over registered product labels.
//!
//! Every query fans out to a semantic similarity search and a structured
//! relationship query at once. The two result sets are merged into one ranked
//! list. Each item keeps a source tag so the output gate can tell retrieved
//! prose from a confirmed registration relationship.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use furrow_contracts::{
    capability::{CapabilityInput, CapabilityKind},
    error::FurrowResult,
    task::{AgentTask, Evidence, EvidenceSource, TaskErrorKind, TaskHandle, TaskOutcome, TaskResult},
};
use furrow_core::traits::CapabilityAgent;

use crate::{resolved_poll, wrong_input};

/// External label knowledge: a vector index and a relationship graph.
#[async_trait]
pub trait KnowledgeLayer: Send + Sync {
    /// Passages most similar to `query`, best first.
    async fn semantic_search(&self, query: &str, limit: usize) -> FurrowResult<Vec<Evidence>>;

    /// Registrations linking every entity in `entities`, e.g. a product that
    /// controls a weed and is registered for a crop.
    async fn structured_query(&self, entities: &[String]) -> FurrowResult<Vec<Evidence>>;
}

pub struct RegulatoryAgent {
    layer: Arc<dyn KnowledgeLayer>,
    timeout: Duration,
    limit: usize,
}

impl RegulatoryAgent {
    pub fn new(layer: Arc<dyn KnowledgeLayer>, timeout: Duration) -> Self {
        Self { layer, timeout, limit: 6 }
    }

    /// Cap on merged evidence items (default 6).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    async fn retrieve(&self, query: &str, entities: &[String]) -> TaskOutcome {
        let both = async {
            tokio::join!(
                self.layer.semantic_search(query, self.limit),
                self.layer.structured_query(entities),
            )
        };

        let (semantic, structured) = match tokio::time::timeout(self.timeout, both).await {
            Ok(pair) => pair,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "label retrieval timed out");
                return TaskOutcome::failed(
                    TaskErrorKind::Timeout,
                    format!("label retrieval did not answer within {} ms", self.timeout.as_millis()),
                );
            }
        };

        let (semantic, structured) = match (semantic, structured) {
            (Err(a), Err(b)) => {
                return TaskOutcome::failed(
                    TaskErrorKind::Failure,
                    format!("semantic search failed: {a}; structured query failed: {b}"),
                );
            }
            (Ok(s), Err(e)) => {
                warn!(error = %e, "structured query failed, using semantic results only");
                (s, Vec::new())
            }
            (Err(e), Ok(s)) => {
                warn!(error = %e, "semantic search failed, using structured results only");
                (Vec::new(), s)
            }
            (Ok(a), Ok(b)) => (a, b),
        };

        let semantic_hits = semantic.len();
        let structured_hits = structured.len();
        let merged = merge(semantic, structured, self.limit);
        debug!(semantic_hits, structured_hits, merged = merged.len(), "label evidence merged");

        if merged.is_empty() {
            return TaskOutcome::failed(
                TaskErrorKind::Failure,
                format!("no registered label evidence found for '{query}'"),
            );
        }

        let items: Vec<serde_json::Value> = merged
            .iter()
            .map(|e| json!({ "id": e.id, "source": e.source, "score": e.score, "reference": e.reference }))
            .collect();

        TaskOutcome::done(TaskResult {
            summary: format!("{} label passages for '{query}'", merged.len()),
            payload: json!({
                "query": query,
                "semantic_hits": semantic_hits,
                "structured_hits": structured_hits,
                "items": items,
            }),
            evidence: merged,
        })
    }
}

/// Tag, dedupe by id, and rank by score.
///
/// An item found by both lookups is kept once, tagged structured, with the
/// higher of its two scores. Ties rank structured items first.
pub fn merge(semantic: Vec<Evidence>, structured: Vec<Evidence>, limit: usize) -> Vec<Evidence> {
    let tagged = semantic
        .into_iter()
        .map(|e| Evidence { source: EvidenceSource::Semantic, ..e })
        .chain(structured.into_iter().map(|e| Evidence { source: EvidenceSource::Structured, ..e }));

    let mut by_id: HashMap<String, Evidence> = HashMap::new();
    for item in tagged {
        match by_id.get_mut(&item.id) {
            Some(existing) => {
                existing.score = existing.score.max(item.score);
                if item.source == EvidenceSource::Structured {
                    existing.source = EvidenceSource::Structured;
                }
                for entity in item.entities {
                    if !existing.entities.contains(&entity) {
                        existing.entities.push(entity);
                    }
                }
            }
            None => {
                by_id.insert(item.id.clone(), item);
            }
        }
    }

    let mut merged: Vec<Evidence> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| rank(a.source).cmp(&rank(b.source)))
            .then_with(|| a.id.cmp(&b.id))
    });
    merged.truncate(limit);
    merged
}

fn rank(source: EvidenceSource) -> u8 {
    match source {
        EvidenceSource::Structured => 0,
        _ => 1,
    }
}

/// JSON Schema for the result payload.
pub fn result_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["query", "items"],
        "properties": {
            "query": { "type": "string" },
            "semantic_hits": { "type": "integer", "minimum": 0 },
            "structured_hits": { "type": "integer", "minimum": 0 },
            "items": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["id", "source", "score"],
                    "properties": {
                        "id": { "type": "string" },
                        "source": { "enum": ["semantic", "structured"] },
                        "score": { "type": "number" }
                    }
                }
            }
        }
    })
}

#[async_trait]
impl CapabilityAgent for RegulatoryAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Regulatory
    }

    async fn submit(&self, task: &AgentTask) -> FurrowResult<TaskHandle> {
        let outcome = match &task.input {
            CapabilityInput::Regulatory { query, target_entities } => {
                debug!(task_id = %task.id, query = %query, entities = ?target_entities, "label retrieval");
                self.retrieve(query, target_entities).await
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
