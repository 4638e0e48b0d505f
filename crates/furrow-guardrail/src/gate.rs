//! Topic-policy guardrail gate.
//!
//! `PolicyGate` loads a `GuardrailPolicy` and implements `GuardrailGate`.
//!
//! Input evaluation:
//!
//! 1. A jailbreak pattern anywhere in the query → `block` ("jailbreak").
//! 2. Score denied and allowed topics by distinct keyword hits. A denied topic
//!    scoring at least as high as the best allowed topic → `block` with the
//!    denied topic's category.
//! 3. The best allowed topic → `allow`, unless its confidence is below
//!    `min_confidence`.
//! 4. Nothing matched → `block` ("off-topic"). Deny by default.
//!
//! Output evaluation:
//!
//! 1. No verification result → `needs-revision` (the draft is unverified).
//! 2. Denied-topic content in the draft → `block`.
//! 3. Any flagged claim → `needs-revision` ("unsupported-claim"). Numeric
//!    flags are reported first since a wrong application rate is the costliest
//!    hallucination.
//! 4. A failed capability that a claim relied on → `needs-revision`.
//! 5. Otherwise → `allow`.

use std::path::Path;

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use furrow_contracts::{
    config::GuardrailPolicy,
    error::{FurrowError, FurrowResult},
    guardrail::{GateContext, GateMode, GuardrailVerdict, VerdictKind},
};
use furrow_core::traits::GuardrailGate;

use crate::topic::{best_match, Topic};

pub const CATEGORY_JAILBREAK: &str = "jailbreak";
pub const CATEGORY_OFF_TOPIC: &str = "off-topic";
pub const CATEGORY_UNSUPPORTED: &str = "unsupported-claim";
pub const CATEGORY_GAP: &str = "capability-gap";
pub const CATEGORY_UNVERIFIED: &str = "unverified";
pub const CATEGORY_GROUNDED: &str = "grounded";

/// A `GuardrailGate` driven entirely by a `GuardrailPolicy`.
///
/// ```rust,ignore
/// use furrow_guardrail::PolicyGate;
///
/// let gate = PolicyGate::from_file(Path::new("policies/guardrail.toml"))?;
/// ```
#[derive(Debug)]
pub struct PolicyGate {
    policy: GuardrailPolicy,
    allowed: Vec<Topic>,
    denied: Vec<Topic>,
    jailbreaks: Vec<Regex>,
}

impl PolicyGate {
    /// Compile every topic and jailbreak pattern in `policy`.
    ///
    /// Returns `FurrowError::ConfigError` if a pattern does not compile or a
    /// topic has no keywords.
    pub fn new(policy: GuardrailPolicy) -> FurrowResult<Self> {
        let allowed = policy.allowed_topics.iter().map(Topic::compile).collect::<FurrowResult<Vec<_>>>()?;
        let denied = policy.denied_topics.iter().map(Topic::compile).collect::<FurrowResult<Vec<_>>>()?;
        let jailbreaks = policy
            .jailbreak_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p).case_insensitive(true).build().map_err(|e| FurrowError::ConfigError {
                    reason: format!("jailbreak pattern '{}' does not compile: {}", p, e),
                })
            })
            .collect::<FurrowResult<Vec<_>>>()?;

        Ok(Self { policy, allowed, denied, jailbreaks })
    }

    /// Parse `s` as a TOML guardrail policy and build the gate.
    pub fn from_toml_str(s: &str) -> FurrowResult<Self> {
        let policy: GuardrailPolicy = toml::from_str(s).map_err(|e| FurrowError::ConfigError {
            reason: format!("failed to parse guardrail TOML: {}", e),
        })?;
        Self::new(policy)
    }

    /// Read the file at `path` and parse it with [`PolicyGate::from_toml_str`].
    pub fn from_file(path: &Path) -> FurrowResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| FurrowError::ConfigError {
            reason: format!("failed to read guardrail file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn policy(&self) -> &GuardrailPolicy {
        &self.policy
    }

    fn evaluate_input(&self, query: &str) -> GuardrailVerdict {
        let mode = GateMode::Input;

        if let Some(pattern) = self.jailbreaks.iter().find(|re| re.is_match(query)) {
            warn!(pattern = %pattern.as_str(), "jailbreak pattern matched");
            return GuardrailVerdict::new(
                VerdictKind::Block,
                mode,
                CATEGORY_JAILBREAK,
                0.95,
                "the query tries to override the assistant's instructions",
            );
        }

        let allowed = best_match(&self.allowed, query);
        let denied = best_match(&self.denied, query);
        let allowed_hits = allowed.map(|(_, h)| h).unwrap_or(0);

        if let Some((topic, hits)) = denied {
            if hits >= allowed_hits {
                return GuardrailVerdict::new(
                    VerdictKind::Block,
                    mode,
                    topic.category.clone(),
                    confidence(hits),
                    format!("questions about {} are outside what this assistant can answer", topic.category),
                );
            }
        }

        match allowed {
            Some((topic, hits)) if confidence(hits) >= self.policy.min_confidence => GuardrailVerdict::new(
                VerdictKind::Allow,
                mode,
                topic.category.clone(),
                confidence(hits),
                format!("matched topic '{}'", topic.id),
            ),
            Some((topic, hits)) => GuardrailVerdict::new(
                VerdictKind::Block,
                mode,
                CATEGORY_OFF_TOPIC,
                confidence(hits),
                format!("too little evidence that the question is about {}", topic.category),
            ),
            None => GuardrailVerdict::new(
                VerdictKind::Block,
                mode,
                CATEGORY_OFF_TOPIC,
                0.6,
                "the question is outside the agronomy topics this assistant covers",
            ),
        }
    }

    fn evaluate_output(&self, text: &str, ctx: &GateContext) -> GuardrailVerdict {
        let mode = GateMode::Output;

        let Some(verification) = &ctx.verification else {
            return GuardrailVerdict::fail_closed(mode, CATEGORY_UNVERIFIED, "the draft could not be checked against evidence");
        };

        if let Some((topic, hits)) = best_match(&self.denied, text) {
            return GuardrailVerdict::new(
                VerdictKind::Block,
                mode,
                topic.category.clone(),
                confidence(hits),
                format!("the answer strays into {} content", topic.category),
            );
        }

        let mut flagged: Vec<_> = verification.flagged.iter().collect();
        flagged.sort_by_key(|f| !f.numeric);
        if let Some(first) = flagged.first() {
            let what = if first.numeric { "unsupported rate claim" } else { "unsupported claim" };
            return GuardrailVerdict::new(
                VerdictKind::NeedsRevision,
                mode,
                CATEGORY_UNSUPPORTED,
                0.9,
                format!("{}: '{}' ({}); {} claim(s) flagged", what, first.claim_text, first.detail, flagged.len()),
            );
        }

        if let Some(gap) = verification.gaps.iter().find(|g| g.affects_cited_claim) {
            return GuardrailVerdict::new(
                VerdictKind::NeedsRevision,
                mode,
                CATEGORY_GAP,
                0.8,
                format!("the answer relies on {} data that is {}", gap.capability, gap.status),
            );
        }

        GuardrailVerdict::new(
            VerdictKind::Allow,
            mode,
            CATEGORY_GROUNDED,
            1.0,
            "every claim traces to retrieved evidence",
        )
    }
}

/// Confidence from distinct keyword hits: one hit is a weak signal, three or
/// more is as sure as keyword matching gets.
fn confidence(hits: usize) -> f32 {
    (0.5 + 0.15 * hits as f32).min(0.95)
}

impl GuardrailGate for PolicyGate {
    fn evaluate(&self, content: &str, ctx: &GateContext) -> FurrowResult<GuardrailVerdict> {
        let verdict = match ctx.mode {
            GateMode::Input => self.evaluate_input(content),
            GateMode::Output => {
                if ctx.draft.is_none() {
                    return Err(FurrowError::InternalFailure {
                        reason: format!("output evaluation for request {} carries no draft", ctx.request_id),
                    });
                }
                self.evaluate_output(content, ctx)
            }
        };

        debug!(
            request_id = %ctx.request_id,
            mode = ?ctx.mode,
            kind = ?verdict.kind,
            category = %verdict.category,
            "guardrail evaluated"
        );
        Ok(verdict)
    }
}
