//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. session_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. canonical JSON of record (serde_json with no pretty-printing)

use sha2::{Digest, Sha256};

use furrow_contracts::{
    error::{FurrowError, FurrowResult},
    session::TransitionRecord,
};

use crate::event::HistoryEvent;

/// Compute the SHA-256 hash for one history event.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_event(session_id: &str, sequence: u64, record: &TransitionRecord, prev_hash: &str) -> FurrowResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| FurrowError::StoreError {
        reason: format!("transition record is not serialisable: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of a hash chain.
///
/// Valid when each event's `prev_hash` equals the previous event's
/// `this_hash` (or `GENESIS_HASH` for the first), each `this_hash` matches the
/// value recomputed from the event's own fields, and sequences are contiguous.
/// An empty chain is valid.
pub fn verify_chain(events: &[HistoryEvent]) -> bool {
    let mut expected_prev = HistoryEvent::GENESIS_HASH.to_string();

    for (position, event) in events.iter().enumerate() {
        if event.sequence != position as u64 || event.prev_hash != expected_prev {
            return false;
        }

        match hash_event(&event.session_id.0, event.sequence, &event.record, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return false,
        }

        expected_prev = event.this_hash.clone();
    }

    true
}
