//! # furrow-ref-agronomy
//!
//! Agronomy reference runtime for the FURROW agent orchestration controller.
//!
//! Wires the real gate, planner, verifier, agents, worker pool, and session
//! store over mock backends and walks four advisory scenarios:
//!
//! 1. **Weed control** (A): weather and label lookups fan out in parallel and
//!    the grounded answer completes on the first pass.
//! 2. **Rate revision** (B): a drafted label rate disagrees with the evidence,
//!    the output gate asks for revision, and a narrowed second pass fixes it.
//! 3. **Off-topic** (C): medical and prompt-injection queries are rejected at
//!    the input gate without any dispatch.
//! 4. **Yield forecast** (D): a simulation runs as a background job while a
//!    second session's request completes.
//!
//! All data is hardcoded and fictional. No external services are called.

pub mod backends;
pub mod mock_data;
pub mod recall;
pub mod runtime;
pub mod scenarios;

pub use runtime::{load_config, Backends, Runtime};
