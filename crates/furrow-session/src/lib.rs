//! # furrow-session
//!
//! The durable `SessionStore` for the FURROW runtime.
//!
//! ## Modules
//!
//! - [`event`]: `HistoryEvent` (one chained transition) and `SessionLog`.
//! - [`chain`]: SHA-256 hash computation and chain verification.
//! - [`store`]: `LeasedSessionStore`, sled-backed requests, sessions, and
//!   history behind per-session leases.
//!
//! ## Guarantees
//!
//! - One lease holder per session. Writes carrying any other lease fail with
//!   `LeaseLost`.
//! - History is append-only and hash-chained per session; any edit to a
//!   stored event is detected by [`LeasedSessionStore::verify_integrity`].

pub mod chain;
pub mod event;
pub mod store;

pub use event::{HistoryEvent, SessionLog};
pub use store::LeasedSessionStore;
