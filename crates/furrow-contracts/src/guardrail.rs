//! Guardrail verdict and evaluation context types.
//!
//! The gate consumes content plus a `GateContext` and produces a
//! `GuardrailVerdict`. Verdicts are immutable once issued; the controller
//! appends each one to the request's history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::{DraftAnswer, VerificationResult};

/// Which side of the pipeline the gate is guarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateMode {
    /// Raw query at intake.
    Input,
    /// Draft answer before delivery.
    Output,
}

/// The decision a gate reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictKind {
    Allow,
    Block,
    NeedsRevision,
}

/// A single gate decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub kind: VerdictKind,
    pub mode: GateMode,
    /// Policy category that drove the decision, e.g. "agronomy", "medical",
    /// "unsupported-claim", "jailbreak".
    pub category: String,
    /// 0.0 ..= 1.0
    pub confidence: f32,
    pub rationale: String,
    pub issued_at: DateTime<Utc>,
}

impl GuardrailVerdict {
    pub fn new(
        kind: VerdictKind,
        mode: GateMode,
        category: impl Into<String>,
        confidence: f32,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            mode,
            category: category.into(),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
            issued_at: Utc::now(),
        }
    }

    /// The verdict issued when the gate itself cannot evaluate.
    ///
    /// Never `Allow`: input blocks, output asks for revision.
    pub fn fail_closed(mode: GateMode, category: impl Into<String>, rationale: impl Into<String>) -> Self {
        let kind = match mode {
            GateMode::Input => VerdictKind::Block,
            GateMode::Output => VerdictKind::NeedsRevision,
        };
        Self::new(kind, mode, category, 1.0, rationale)
    }

    pub fn is_allow(&self) -> bool {
        self.kind == VerdictKind::Allow
    }
}

/// Everything the gate needs besides the content itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateContext {
    pub request_id: String,
    pub session_id: String,
    pub mode: GateMode,
    pub revision: u32,
    /// Present in output mode.
    pub draft: Option<DraftAnswer>,
    /// Present in output mode. A missing verification fails closed.
    pub verification: Option<VerificationResult>,
}

impl GateContext {
    pub fn input(request_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            session_id: session_id.into(),
            mode: GateMode::Input,
            revision: 0,
            draft: None,
            verification: None,
        }
    }

    pub fn output(
        request_id: impl Into<String>,
        session_id: impl Into<String>,
        revision: u32,
        draft: DraftAnswer,
        verification: Option<VerificationResult>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            session_id: session_id.into(),
            mode: GateMode::Output,
            revision,
            draft: Some(draft),
            verification,
        }
    }
}
