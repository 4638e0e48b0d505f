//! # furrow-verify
//!
//! Draft verification for the FURROW runtime: every claim is traced back to
//! the evidence recorded for its request, numeric claims are checked against
//! the numbers that evidence actually states, and capability results are
//! validated against JSON Schemas before aggregation.
//!
//! ```rust,ignore
//! use furrow_verify::TraceVerifier;
//!
//! let mut verifier = TraceVerifier::new();
//! verifier.register_schema(CapabilityKind::Geospatial, &schema)?;
//! ```

pub mod trace;

pub use trace::{ClaimRuleFn, TraceVerifier};

// ── Tests ─────────────────────────────────────────────────────────────────────
