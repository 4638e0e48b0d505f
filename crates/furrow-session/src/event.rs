//! History event and log types.
//!
//! `HistoryEvent` is a single entry in a session's hash chain. It wraps a
//! `TransitionRecord` with sequence numbering and the SHA-256 hashes that make
//! tampering detectable. `SessionLog` is the sealed export of one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use furrow_contracts::{request::SessionId, session::TransitionRecord};

/// A single entry in the SHA-256 hash chain for one session.
///
/// Each event commits to the previous event via `prev_hash`. Modifying any
/// field, including those of the embedded `record`, invalidates `this_hash`
/// and every subsequent `prev_hash`, which `verify_chain` detects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Position in the session's chain, starting at 0.
    pub sequence: u64,

    pub session_id: SessionId,

    /// The transition the controller recorded.
    pub record: TransitionRecord,

    /// Hash of the previous event, or `GENESIS_HASH` for the first.
    pub prev_hash: String,

    /// Hash over (session_id, sequence, prev_hash, canonical JSON of record).
    pub this_hash: String,
}

impl HistoryEvent {
    /// The `prev_hash` of the first event in every chain: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A sealed snapshot of one session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLog {
    pub session_id: SessionId,

    /// All events in chain order (sequence 0 first).
    pub events: Vec<HistoryEvent>,

    pub exported_at: DateTime<Utc>,

    /// The `this_hash` of the last event. Empty if the log is empty.
    pub terminal_hash: String,
}
