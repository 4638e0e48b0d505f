//! `LeasedSessionStore`: the durable `SessionStore`.
//!
//! Requests, sessions, and history events live in three sled trees. A
//! temporary sled database stands in for "in-memory" mode, so both modes run
//! the same code path.
//!
//! Leases are held in process memory. A lease that is not renewed before its
//! TTL lapses may be taken over by the next acquirer; the old holder then gets
//! `LeaseLost` on its next write.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use furrow_contracts::{
    config::FurrowConfig,
    error::{FurrowError, FurrowResult},
    request::{Request, RequestId, SessionId},
    session::{Session, SessionLease, TransitionRecord},
};
use furrow_core::traits::SessionStore;

use crate::{
    chain::{hash_event, verify_chain},
    event::{HistoryEvent, SessionLog},
};

const REQUESTS_TREE: &str = "requests";
const SESSIONS_TREE: &str = "sessions";
const HISTORY_TREE: &str = "history";

struct LeaseSlot {
    lease: SessionLease,
    expires: Instant,
}

/// Either a fresh lease or the instant the current holder's lease lapses.
enum Attempt {
    Taken(SessionLease),
    HeldUntil(Instant),
}

/// Sled-backed session store with in-process leases.
pub struct LeasedSessionStore {
    db: sled::Db,
    requests: sled::Tree,
    sessions: sled::Tree,
    history: sled::Tree,
    /// Lease table. Also serialises every write so lease checks and the write
    /// they guard happen atomically.
    leases: Mutex<HashMap<SessionId, LeaseSlot>>,
    released: Notify,
    lease_ttl: Duration,
    revision_ceiling: u32,
}

impl LeasedSessionStore {
    /// A store backed by a temporary database, discarded on drop.
    pub fn in_memory(lease_ttl: Duration, revision_ceiling: u32) -> FurrowResult<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(store_err)?;
        Self::with_db(db, lease_ttl, revision_ceiling)
    }

    /// Open (or create) a durable store at `path`.
    pub fn open(path: &Path, lease_ttl: Duration, revision_ceiling: u32) -> FurrowResult<Self> {
        let db = sled::open(path).map_err(store_err)?;
        info!(path = %path.display(), "session store opened");
        Self::with_db(db, lease_ttl, revision_ceiling)
    }

    /// Durable when `sessions.store_path` is set, in-memory otherwise.
    pub fn from_config(config: &FurrowConfig) -> FurrowResult<Self> {
        let ttl = config.sessions.lease_timeout();
        match &config.sessions.store_path {
            Some(path) => Self::open(path, ttl, config.revision_ceiling),
            None => Self::in_memory(ttl, config.revision_ceiling),
        }
    }

    fn with_db(db: sled::Db, lease_ttl: Duration, revision_ceiling: u32) -> FurrowResult<Self> {
        let requests = db.open_tree(REQUESTS_TREE).map_err(store_err)?;
        let sessions = db.open_tree(SESSIONS_TREE).map_err(store_err)?;
        let history = db.open_tree(HISTORY_TREE).map_err(store_err)?;
        Ok(Self {
            db,
            requests,
            sessions,
            history,
            leases: Mutex::new(HashMap::new()),
            released: Notify::new(),
            lease_ttl,
            revision_ceiling,
        })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> FurrowResult<()> {
        self.db.flush().map_err(store_err)?;
        Ok(())
    }

    /// Every history event recorded for `session_id`, in chain order.
    pub fn history(&self, session_id: &SessionId) -> FurrowResult<Vec<HistoryEvent>> {
        self.history
            .scan_prefix(history_prefix(session_id))
            .map(|entry| {
                let (_, bytes) = entry.map_err(store_err)?;
                decode(&bytes)
            })
            .collect()
    }

    /// Recompute the session's hash chain from stored events.
    pub fn verify_integrity(&self, session_id: &SessionId) -> FurrowResult<bool> {
        Ok(verify_chain(&self.history(session_id)?))
    }

    /// Seal the session's history into a `SessionLog`.
    pub fn export_log(&self, session_id: &SessionId) -> FurrowResult<SessionLog> {
        let events = self.history(session_id)?;
        let terminal_hash = events.last().map(|e| e.this_hash.clone()).unwrap_or_default();
        Ok(SessionLog {
            session_id: session_id.clone(),
            events,
            exported_at: Utc::now(),
            terminal_hash,
        })
    }

    fn lock(&self) -> FurrowResult<MutexGuard<'_, HashMap<SessionId, LeaseSlot>>> {
        self.leases.lock().map_err(|_| FurrowError::StoreError {
            reason: "lease table lock poisoned".to_string(),
        })
    }

    fn try_take(&self, session_id: &SessionId) -> FurrowResult<Attempt> {
        let mut leases = self.lock()?;
        let now = Instant::now();
        if let Some(slot) = leases.get(session_id) {
            if slot.expires > now {
                return Ok(Attempt::HeldUntil(slot.expires));
            }
            warn!(
                session_id = %session_id,
                lease_id = %slot.lease.lease_id,
                "lease expired without release, taking over"
            );
        }

        let acquired_at = Utc::now();
        let lease = SessionLease {
            session_id: session_id.clone(),
            lease_id: uuid::Uuid::new_v4(),
            acquired_at,
            expires_at: acquired_at + chrono_ttl(self.lease_ttl),
        };
        leases.insert(session_id.clone(), LeaseSlot { lease: lease.clone(), expires: now + self.lease_ttl });
        debug!(session_id = %session_id, lease_id = %lease.lease_id, "lease acquired");
        Ok(Attempt::Taken(lease))
    }

    fn load_session(&self, session_id: &SessionId) -> FurrowResult<Option<Session>> {
        self.sessions
            .get(session_id.0.as_bytes())
            .map_err(store_err)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn put_session(&self, session: &Session) -> FurrowResult<()> {
        self.sessions.insert(session.id.0.as_bytes(), encode(session)?).map_err(store_err)?;
        Ok(())
    }

    fn put_request(&self, request: &Request) -> FurrowResult<()> {
        self.requests
            .insert(request.id.0.as_bytes(), encode(request)?)
            .map_err(store_err)?;
        Ok(())
    }
}

/// The lease must be the one currently held for its session and unexpired.
fn check_held(leases: &HashMap<SessionId, LeaseSlot>, lease: &SessionLease) -> FurrowResult<()> {
    match leases.get(&lease.session_id) {
        Some(slot) if slot.lease.lease_id == lease.lease_id && slot.expires > Instant::now() => Ok(()),
        _ => Err(FurrowError::LeaseLost { session_id: lease.session_id.to_string() }),
    }
}

#[async_trait]
impl SessionStore for LeasedSessionStore {
    async fn acquire_lease(&self, session_id: &SessionId, wait: Option<Duration>) -> FurrowResult<SessionLease> {
        let deadline = wait.map(|d| Instant::now() + d);

        loop {
            // Register interest before looking, so a release between the
            // check and the wait is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let held_until = match self.try_take(session_id)? {
                Attempt::Taken(lease) => return Ok(lease),
                Attempt::HeldUntil(expires) => expires,
            };

            let deadline = match deadline {
                Some(d) if Instant::now() < d => d,
                _ => return Err(FurrowError::SessionBusy { session_id: session_id.to_string() }),
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline.min(held_until)) => {}
            }
        }
    }

    async fn renew_lease(&self, lease: &SessionLease) -> FurrowResult<SessionLease> {
        let mut leases = self.lock()?;
        check_held(&leases, lease)?;

        let renewed = SessionLease { expires_at: Utc::now() + chrono_ttl(self.lease_ttl), ..lease.clone() };
        leases.insert(
            lease.session_id.clone(),
            LeaseSlot { lease: renewed.clone(), expires: Instant::now() + self.lease_ttl },
        );
        Ok(renewed)
    }

    async fn release_lease(&self, lease: SessionLease) -> FurrowResult<()> {
        {
            let mut leases = self.lock()?;
            match leases.get(&lease.session_id) {
                Some(slot) if slot.lease.lease_id == lease.lease_id => {
                    leases.remove(&lease.session_id);
                }
                _ => return Err(FurrowError::LeaseLost { session_id: lease.session_id.to_string() }),
            }

            if let Some(mut session) = self.load_session(&lease.session_id)? {
                session.active_request = None;
                self.put_session(&session)?;
            }
        }
        debug!(session_id = %lease.session_id, lease_id = %lease.lease_id, "lease released");
        self.released.notify_waiters();
        Ok(())
    }

    async fn insert(&self, request: &Request) -> FurrowResult<()> {
        let _guard = self.lock()?;
        let mut session = self
            .load_session(&request.session_id)?
            .unwrap_or_else(|| Session::new(request.session_id.clone(), self.revision_ceiling));
        if !session.request_ids.contains(&request.id) {
            session.request_ids.push(request.id);
        }
        self.put_session(&session)?;
        self.put_request(request)
    }

    async fn load(&self, request_id: &RequestId) -> FurrowResult<Option<Request>> {
        self.requests
            .get(request_id.0.as_bytes())
            .map_err(store_err)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn save(&self, lease: &SessionLease, request: &Request) -> FurrowResult<()> {
        let leases = self.lock()?;
        check_held(&leases, lease)?;
        if request.session_id != lease.session_id {
            return Err(FurrowError::LeaseLost { session_id: request.session_id.to_string() });
        }

        if let Some(mut session) = self.load_session(&request.session_id)? {
            let active = (!request.is_terminal()).then_some(request.id);
            if session.active_request != active {
                session.active_request = active;
                self.put_session(&session)?;
            }
        }
        self.put_request(request)
    }

    async fn append_history(&self, lease: &SessionLease, record: TransitionRecord) -> FurrowResult<()> {
        let leases = self.lock()?;
        check_held(&leases, lease)?;

        let session_id = &lease.session_id;
        let mut session = self
            .load_session(session_id)?
            .unwrap_or_else(|| Session::new(session_id.clone(), self.revision_ceiling));

        let sequence = session.history_len;
        let prev_hash = match sequence.checked_sub(1) {
            None => HistoryEvent::GENESIS_HASH.to_string(),
            Some(prev) => {
                let bytes = self
                    .history
                    .get(history_key(session_id, prev))
                    .map_err(store_err)?
                    .ok_or_else(|| FurrowError::StoreError {
                        reason: format!("history event {prev} missing for session '{session_id}'"),
                    })?;
                decode::<HistoryEvent>(&bytes)?.this_hash
            }
        };

        let this_hash = hash_event(&session_id.0, sequence, &record, &prev_hash)?;
        let event = HistoryEvent {
            sequence,
            session_id: session_id.clone(),
            record,
            prev_hash,
            this_hash,
        };
        self.history
            .insert(history_key(session_id, sequence), encode(&event)?)
            .map_err(store_err)?;

        session.history_len = sequence + 1;
        self.put_session(&session)
    }

    async fn session(&self, session_id: &SessionId) -> FurrowResult<Option<Session>> {
        self.load_session(session_id)
    }

    async fn pending(&self) -> FurrowResult<Vec<Request>> {
        let mut pending = Vec::new();
        for entry in self.requests.iter() {
            let (_, bytes) = entry.map_err(store_err)?;
            let request: Request = decode(&bytes)?;
            if !request.is_terminal() {
                pending.push(request);
            }
        }
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

fn history_prefix(session_id: &SessionId) -> Vec<u8> {
    let mut key = session_id.0.as_bytes().to_vec();
    key.push(0);
    key
}

/// Session id, a NUL separator, then the big-endian sequence so keys sort in
/// chain order.
fn history_key(session_id: &SessionId, sequence: u64) -> Vec<u8> {
    let mut key = history_prefix(session_id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn encode<T: serde::Serialize>(value: &T) -> FurrowResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| FurrowError::StoreError {
        reason: format!("failed to encode record: {}", e),
    })
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> FurrowResult<T> {
    serde_json::from_slice(bytes).map_err(|e| FurrowError::StoreError {
        reason: format!("failed to decode record: {}", e),
    })
}

fn store_err(e: sled::Error) -> FurrowError {
    FurrowError::StoreError { reason: e.to_string() }
}

fn chrono_ttl(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(30))
}
