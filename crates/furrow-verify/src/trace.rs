//! Evidence-trace verifier for the FURROW runtime.
//!
//! `TraceVerifier` implements the `EvidenceVerifier` trait from `furrow-core`.
//! Verification runs in three phases:
//!
//! 1. **Trace**: every claim must cite at least one evidence item that
//!    resolves to a usable task recorded for the request.
//! 2. **Quantities**: a numeric claim's value and unit must appear in the
//!    text of the evidence it cites. The same unit with a different value is
//!    a contradiction, not merely unsupported.
//! 3. **Custom rules**: named checks registered by the hosting application.
//! 4. **Free text**: every application rate written in the draft text must be
//!    carried by a quantity claim, so a rate cannot reach the user untraced.
//!
//! Capabilities that produced no usable result are reported as gaps, marked
//! when a claim cites them. All findings are collected before returning so the
//! output gate sees the full set in one pass.
//!
//! Result payloads are also checked against per-capability JSON Schemas
//! before aggregation (`check_result`).

use std::collections::HashMap;

use tracing::{debug, warn};

use furrow_contracts::{
    answer::{CapabilityGap, Claim, ClaimKind, DraftAnswer, FlagReason, FlaggedClaim, VerificationResult},
    capability::CapabilityKind,
    error::{FurrowError, FurrowResult},
    task::{AgentTask, Evidence},
};
use furrow_core::{quantity, traits::EvidenceVerifier};

/// A caller-supplied claim check.
///
/// Receives the claim and the evidence it resolved to. Returns `Some(message)`
/// when the claim must be flagged, or `None` when it passes.
pub type ClaimRuleFn = Box<dyn Fn(&Claim, &[&Evidence]) -> Option<String> + Send + Sync>;

/// The FURROW draft verifier.
///
/// Domain knowledge stays out of the verifier: hosting applications register
/// result schemas and extra claim rules at startup.
pub struct TraceVerifier {
    schemas: HashMap<CapabilityKind, jsonschema::Validator>,
    rules: Vec<(String, ClaimRuleFn)>,
}

impl TraceVerifier {
    /// Create a verifier with no schemas or custom rules.
    pub fn new() -> Self {
        Self { schemas: HashMap::new(), rules: Vec::new() }
    }

    /// Require `capability` results to conform to `schema`.
    ///
    /// Returns `FurrowError::ConfigError` when the schema document itself is
    /// invalid. Registering a capability twice replaces its schema.
    pub fn register_schema(&mut self, capability: CapabilityKind, schema: &serde_json::Value) -> FurrowResult<()> {
        let validator = jsonschema::validator_for(schema).map_err(|e| FurrowError::ConfigError {
            reason: format!("invalid result schema for '{}': {}", capability, e),
        })?;
        self.schemas.insert(capability, validator);
        Ok(())
    }

    /// Register a custom claim rule under `name`. Rules run in registration order.
    pub fn register_rule(&mut self, name: impl Into<String>, f: ClaimRuleFn) {
        self.rules.push((name.into(), f));
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    /// Resolve the claim's references to evidence on usable tasks.
    fn resolve<'t>(claim: &Claim, tasks: &[&'t AgentTask]) -> Vec<&'t Evidence> {
        claim
            .evidence
            .iter()
            .filter_map(|r| {
                let task: &'t AgentTask = tasks
                    .iter()
                    .copied()
                    .find(|t| t.id == r.task_id && t.capability == r.capability && t.is_usable())?;
                task.evidence(&r.evidence_id)
            })
            .collect()
    }

    fn check_quantity(value: f64, unit: &str, evidence: &[&Evidence]) -> Result<(), (FlagReason, String)> {
        let claimed = quantity::Quantity { value, unit: unit.to_string() };
        let stated: Vec<quantity::Quantity> = evidence.iter().flat_map(|e| quantity::extract(&e.text)).collect();

        if stated.iter().any(|q| q.matches(&claimed)) {
            return Ok(());
        }
        match stated.iter().find(|q| quantity::same_unit(&q.unit, unit)) {
            Some(other) => Err((
                FlagReason::Contradicted,
                format!("cited evidence states {} {}", other.value, other.unit),
            )),
            None => Err((FlagReason::Unsupported, format!("{} {} does not appear in cited evidence", value, unit))),
        }
    }

    /// Rates in the draft text that no quantity claim carries.
    fn untraced_rates(draft: &DraftAnswer) -> Vec<FlaggedClaim> {
        let carried: Vec<quantity::Quantity> = draft
            .claims
            .iter()
            .filter_map(|c| match &c.kind {
                ClaimKind::Quantity { value, unit } => Some(quantity::Quantity { value: *value, unit: unit.clone() }),
                _ => None,
            })
            .collect();

        let mut found = Vec::new();
        for sentence in draft.text.split(". ") {
            for q in quantity::extract(sentence).into_iter().filter(|q| quantity::is_rate_unit(&q.unit)) {
                if carried.iter().any(|c| c.matches(&q)) {
                    continue;
                }
                found.push(FlaggedClaim {
                    claim_id: format!("text-{}", found.len() + 1),
                    claim_text: sentence.trim().to_string(),
                    reason: FlagReason::Unsupported,
                    numeric: true,
                    detail: format!("{} {} in the answer text is not backed by a cited claim", q.value, q.unit),
                    entities: Vec::new(),
                });
            }
        }
        found
    }

    fn flag(claim: &Claim, reason: FlagReason, detail: String) -> FlaggedClaim {
        FlaggedClaim {
            claim_id: claim.id.clone(),
            claim_text: claim.text.clone(),
            reason,
            numeric: matches!(claim.kind, ClaimKind::Quantity { .. }),
            detail,
            entities: claim.entities.clone(),
        }
    }
}

impl Default for TraceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceVerifier for TraceVerifier {
    fn verify(&self, draft: &DraftAnswer, tasks: &[&AgentTask]) -> FurrowResult<VerificationResult> {
        let mut flagged: Vec<FlaggedClaim> = Vec::new();

        for claim in &draft.claims {
            // ── Phase 1: trace ────────────────────────────────────────────────
            if claim.evidence.is_empty() {
                flagged.push(Self::flag(claim, FlagReason::Unsupported, "claim cites no evidence".to_string()));
                continue;
            }
            let evidence = Self::resolve(claim, tasks);
            if evidence.is_empty() {
                flagged.push(Self::flag(
                    claim,
                    FlagReason::Unsupported,
                    "cited evidence is not among the recorded task results".to_string(),
                ));
                continue;
            }

            // ── Phase 2: quantities ───────────────────────────────────────────
            if let ClaimKind::Quantity { value, unit } = &claim.kind {
                if let Err((reason, detail)) = Self::check_quantity(*value, unit, &evidence) {
                    flagged.push(Self::flag(claim, reason, detail));
                    continue;
                }
            }

            // ── Phase 3: custom rules ─────────────────────────────────────────
            for (name, rule) in &self.rules {
                if let Some(message) = rule(claim, &evidence) {
                    debug!(rule = %name, claim_id = %claim.id, "custom claim rule failed");
                    flagged.push(Self::flag(claim, FlagReason::Unsupported, format!("[{}] {}", name, message)));
                    break;
                }
            }
        }

        // ── Phase 4: rates in free text ───────────────────────────────────────
        flagged.extend(Self::untraced_rates(draft));

        // ── Gaps ──────────────────────────────────────────────────────────────
        //
        // A failed attempt only counts while no attempt at the same capability
        // succeeded.
        let gaps: Vec<CapabilityGap> = tasks
            .iter()
            .filter(|t| !t.is_usable())
            .filter(|t| !tasks.iter().any(|o| o.capability == t.capability && o.is_usable()))
            .map(|t| CapabilityGap {
                capability: t.capability,
                task_id: t.id,
                status: t.status,
                reason: t
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "no result".to_string()),
                affects_cited_claim: draft.claims.iter().flat_map(|c| c.evidence.iter()).any(|r| r.task_id == t.id),
            })
            .collect();

        for f in &flagged {
            warn!(claim_id = %f.claim_id, reason = ?f.reason, numeric = f.numeric, detail = %f.detail, "claim flagged");
        }
        let result = VerificationResult::new(flagged, gaps);
        debug!(
            passed = result.passed,
            flagged = result.flagged.len(),
            gaps = result.gaps.len(),
            "verification complete"
        );
        Ok(result)
    }

    fn check_result(&self, task: &AgentTask) -> Result<(), String> {
        let (Some(validator), Some(result)) = (self.schemas.get(&task.capability), task.result.as_ref()) else {
            return Ok(());
        };
        let violations: Vec<String> = validator
            .iter_errors(&result.payload)
            .map(|e| format!("{} at '{}'", e, e.instance_path))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(format!("{} result does not match its schema: {}", task.capability, violations.join("; ")))
        }
    }
}
