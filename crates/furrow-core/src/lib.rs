//! # furrow-core
//!
//! The orchestration runtime for FURROW: the controller state machine, the
//! concurrent dispatcher, and the intake service.
//!
//! This crate provides:
//! - The boundary traits (`GuardrailGate`, `CapabilityAgent`, `JobQueue`,
//!   `SessionStore`, `Planner`, `Synthesizer`, `EvidenceVerifier`)
//! - The `Controller` that drives one request through its lifecycle
//! - The `Orchestrator` that accepts queries and runs them in the background
//! - TOML configuration loading and validation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use furrow_core::{Controller, Orchestrator, AgentRoster};
//! ```

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod planner;
pub mod quantity;
pub mod roster;
pub mod service;
pub mod synth;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::Controller;
pub use planner::{KeywordPlanner, Vocabulary};
pub use roster::AgentRoster;
pub use service::Orchestrator;
pub use synth::EvidenceSynthesizer;
