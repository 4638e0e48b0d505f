//! Request intake: the caller-facing surface of the runtime.
//!
//! `submit_query` returns as soon as the request is stored; the state machine
//! runs on its own task. Each run holds its session's lease from the first
//! transition to the last, so two requests on one session never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use furrow_contracts::{
    config::ContentionPolicy,
    error::{FurrowError, FurrowResult},
    request::{QueryResult, Request, RequestId, SessionId},
    session::{Session, SessionLease},
};

use crate::{controller::Controller, traits::SessionStore};

struct Running {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

struct Inner {
    controller: Controller,
    running: Mutex<HashMap<RequestId, Running>>,
}

/// Accepts queries and runs each one to a terminal state in the background.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(controller: Controller) -> Self {
        Self {
            inner: Arc::new(Inner { controller, running: Mutex::new(HashMap::new()) }),
        }
    }

    fn store(&self) -> &Arc<dyn SessionStore> {
        self.inner.controller.store()
    }

    /// Accept `text` for `session_id` and start processing it.
    ///
    /// With `contention = "reject"`, a session that already has a request in
    /// flight fails fast with `SessionBusy` and nothing is stored. With
    /// `"queue"` the new request waits for the lease in the background.
    pub async fn submit_query(&self, session_id: SessionId, text: impl Into<String>) -> FurrowResult<RequestId> {
        let lease = match self.inner.controller.config().sessions.contention {
            ContentionPolicy::Reject => Some(self.store().acquire_lease(&session_id, None).await?),
            ContentionPolicy::Queue => None,
        };

        let request = Request::new(session_id.clone(), text);
        let id = request.id;
        if let Err(e) = self.store().insert(&request).await {
            if let Some(lease) = lease {
                let _ = self.store().release_lease(lease).await;
            }
            return Err(e);
        }

        info!(request_id = %id, session_id = %session_id, "query accepted");
        self.spawn_run(id, session_id, lease);
        Ok(id)
    }

    /// The caller-facing view of a request, whatever its state.
    pub async fn get_result(&self, request_id: &RequestId) -> FurrowResult<QueryResult> {
        self.store()
            .load(request_id)
            .await?
            .map(|r| r.result())
            .ok_or_else(|| FurrowError::NotFound { kind: "request".to_string(), id: request_id.to_string() })
    }

    /// Wait until the request's background run has finished, then return its result.
    pub async fn wait_for(&self, request_id: &RequestId) -> FurrowResult<QueryResult> {
        let done = self
            .inner
            .running
            .lock()
            .map_err(poisoned)?
            .get(request_id)
            .map(|r| r.done.clone());

        if let Some(mut done) = done {
            // A closed channel means the run already finished.
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.get_result(request_id).await
    }

    /// Ask a running request to stop. It ends `Failed` with reason "cancelled".
    ///
    /// Requests that are already terminal, or not running in this process,
    /// are left as they are.
    pub async fn cancel(&self, request_id: &RequestId) -> FurrowResult<()> {
        let token = self
            .inner
            .running
            .lock()
            .map_err(poisoned)?
            .get(request_id)
            .map(|r| r.cancel.clone());

        match token {
            Some(token) => {
                info!(request_id = %request_id, "cancelling request");
                token.cancel();
                Ok(())
            }
            None => self.get_result(request_id).await.map(|_| ()),
        }
    }

    /// Re-drive every stored request that has not reached a terminal state.
    ///
    /// Used after a restart. Requests that are bound to queued or running jobs
    /// re-attach to them by polling.
    pub async fn resume_pending(&self) -> FurrowResult<Vec<RequestId>> {
        let pending = self.store().pending().await?;
        let mut resumed = Vec::new();
        for request in pending {
            let already = self.inner.running.lock().map_err(poisoned)?.contains_key(&request.id);
            if already {
                continue;
            }
            info!(request_id = %request.id, state = %request.state, "resuming request");
            resumed.push(request.id);
            self.spawn_run(request.id, request.session_id, None);
        }
        Ok(resumed)
    }

    pub async fn session(&self, session_id: &SessionId) -> FurrowResult<Option<Session>> {
        self.store().session(session_id).await
    }

    fn spawn_run(&self, id: RequestId, session_id: SessionId, lease: Option<SessionLease>) {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(false);
        if let Ok(mut running) = self.inner.running.lock() {
            running.insert(id, Running { cancel: cancel.clone(), done: rx });
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.run(id, session_id, lease, &cancel).await {
                error!(request_id = %id, error = %e, "request run ended with an error");
            }
            if let Ok(mut running) = inner.running.lock() {
                running.remove(&id);
            }
            let _ = tx.send(true);
        });
    }
}

impl Inner {
    async fn run(
        &self,
        id: RequestId,
        session_id: SessionId,
        lease: Option<SessionLease>,
        cancel: &CancellationToken,
    ) -> FurrowResult<()> {
        let store = self.controller.store();
        let lease = match lease {
            Some(lease) => lease,
            None => self.queue_for_lease(&session_id).await?,
        };
        debug!(request_id = %id, session_id = %session_id, lease_id = %lease.lease_id, "lease acquired");

        let outcome = match store.load(&id).await {
            Ok(Some(request)) if request.is_terminal() => Ok(()),
            Ok(Some(request)) => self.controller.drive(request, &lease, cancel).await.map(|done| {
                info!(request_id = %id, state = %done.state, revision = done.revision_count, "request finished");
            }),
            Ok(None) => Err(FurrowError::NotFound { kind: "request".to_string(), id: id.to_string() }),
            Err(e) => Err(e),
        };

        if let Err(e) = store.release_lease(lease).await {
            warn!(request_id = %id, session_id = %session_id, error = %e, "lease release failed");
        }
        outcome
    }

    /// Wait for the session lease for as long as its holder keeps renewing it.
    ///
    /// Each attempt is bounded by the lease timeout, so a holder that stopped
    /// renewing is taken over by the store. There is no overall cap here: the
    /// request deadline is measured from `created_at`, so a request that
    /// queued past it fails as soon as the controller starts driving it.
    async fn queue_for_lease(&self, session_id: &SessionId) -> FurrowResult<SessionLease> {
        let wait = self.controller.config().sessions.lease_timeout();
        let mut attempts = 0u32;
        loop {
            match self.controller.store().acquire_lease(session_id, Some(wait)).await {
                Ok(lease) => return Ok(lease),
                Err(FurrowError::SessionBusy { .. }) => {
                    attempts += 1;
                    debug!(session_id = %session_id, attempts, "session busy, still queued");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> FurrowError {
    FurrowError::InternalFailure { reason: "orchestrator registry lock poisoned".to_string() }
}
