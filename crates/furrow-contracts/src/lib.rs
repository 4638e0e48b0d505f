//! # furrow-contracts
//!
//! Shared types, the request state machine, and the error taxonomy for the
//! FURROW orchestration runtime.
//!
//! All crates in the workspace import from here. No orchestration logic lives
//! in this crate, only data definitions and the legality of state changes.

pub mod answer;
pub mod capability;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod job;
pub mod request;
pub mod session;
pub mod task;
