//! Draft answers and the verification report run against them.
//!
//! Before a draft reaches the output gate, the verifier checks every claim
//! against the evidence recorded for the request. The output gate reads the
//! resulting `VerificationResult` to decide allow / needs-revision / block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    capability::CapabilityKind,
    task::{TaskId, TaskStatus},
};

/// Points a claim at one evidence item of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub task_id: TaskId,
    pub capability: CapabilityKind,
    pub evidence_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClaimKind {
    /// A plain factual statement.
    Statement,
    /// A numeric claim such as an application rate. The value must appear in
    /// cited evidence.
    Quantity { value: f64, unit: String },
}

/// One assertion inside a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub text: String,
    pub kind: ClaimKind,
    /// Empty means the claim is unsupported.
    pub evidence: Vec<EvidenceRef>,
    /// Entities the claim is about, used to narrow re-planning.
    #[serde(default)]
    pub entities: Vec<String>,
}

/// A synthesized answer plus the claims it is made of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftAnswer {
    pub text: String,
    pub claims: Vec<Claim>,
    pub pass: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagReason {
    /// No recorded evidence backs the claim.
    Unsupported,
    /// Cited evidence states something different.
    Contradicted,
}

/// A claim the verifier could not trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedClaim {
    pub claim_id: String,
    pub claim_text: String,
    pub reason: FlagReason,
    pub numeric: bool,
    pub detail: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// A required capability that produced no usable result this pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityGap {
    pub capability: CapabilityKind,
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub reason: String,
    /// True when a claim in the draft cites this task.
    pub affects_cited_claim: bool,
}

/// The verifier's report on one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// True only if nothing is flagged and no gap touches a cited claim.
    pub passed: bool,
    pub flagged: Vec<FlaggedClaim>,
    pub gaps: Vec<CapabilityGap>,
    pub checked_at: DateTime<Utc>,
}

impl VerificationResult {
    pub fn new(flagged: Vec<FlaggedClaim>, gaps: Vec<CapabilityGap>) -> Self {
        let passed = flagged.is_empty() && gaps.iter().all(|g| !g.affects_cited_claim);
        Self { passed, flagged, gaps, checked_at: Utc::now() }
    }

    pub fn has_numeric_flags(&self) -> bool {
        self.flagged.iter().any(|f| f.numeric)
    }
}
