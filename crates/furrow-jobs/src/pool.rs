//! `WorkerPool`: the shared, bounded `JobQueue`.
//!
//! Two semaphores bound the pool. `admission` has `workers + queue_depth`
//! permits and is taken without waiting at submit time, so a saturated pool
//! rejects instead of queueing without limit. `workers` has `workers` permits
//! and is awaited by admitted jobs. Both permits are held until the job's
//! terminal record is written.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use furrow_contracts::{
    config::JobConfig,
    error::{FurrowError, FurrowResult},
    job::{JobId, JobRecord, JobSpec, JobState},
    task::TaskResult,
};
use furrow_core::traits::JobQueue;

use crate::{runner::JobRunner, store::JobStore};

/// Bounded pool executing jobs with a [`JobRunner`].
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    store: JobStore,
    runner: Arc<dyn JobRunner>,
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    /// Guards every record read-modify-write and the indexes below.
    index: Mutex<PoolIndex>,
}

#[derive(Default)]
struct PoolIndex {
    /// Fingerprint to job id, for queued and running jobs only.
    by_fingerprint: HashMap<String, JobId>,
    /// Cancellation for jobs still waiting on a worker.
    waiting: HashMap<JobId, CancellationToken>,
}

impl WorkerPool {
    /// Start the pool over `store`, recovering jobs left by a previous process.
    ///
    /// Queued jobs are re-enqueued under their original id. Jobs recorded as
    /// running lost their worker and are marked failed. Must be called from
    /// within a tokio runtime.
    pub fn start(config: &JobConfig, store: JobStore, runner: Arc<dyn JobRunner>) -> FurrowResult<Self> {
        if config.workers == 0 {
            return Err(FurrowError::ConfigError { reason: "jobs.workers must be at least 1".to_string() });
        }

        let pool = Self {
            inner: Arc::new(PoolInner {
                store,
                runner,
                admission: Arc::new(Semaphore::new(config.workers + config.queue_depth)),
                workers: Arc::new(Semaphore::new(config.workers)),
                index: Mutex::new(PoolIndex::default()),
            }),
        };
        pool.recover()?;
        info!(workers = config.workers, queue_depth = config.queue_depth, "worker pool started");
        Ok(pool)
    }

    /// Durable when `store_path` is set, temporary otherwise.
    pub fn from_config(config: &JobConfig, runner: Arc<dyn JobRunner>) -> FurrowResult<Self> {
        let store = match &config.store_path {
            Some(path) => JobStore::open(path)?,
            None => JobStore::temporary()?,
        };
        Self::start(config, store, runner)
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    fn recover(&self) -> FurrowResult<()> {
        for mut record in self.inner.store.active()? {
            match record.state {
                JobState::Running => {
                    warn!(job_id = %record.id, "job was running at shutdown, marking failed");
                    record.state = JobState::Failed;
                    record.error = Some("worker lost before completion".to_string());
                    record.completed_at = Some(Utc::now());
                    self.inner.store.put(&record)?;
                }
                JobState::Queued => {
                    let mut index = self.inner.lock()?;
                    match self.inner.admission.clone().try_acquire_owned() {
                        Ok(permit) => {
                            info!(job_id = %record.id, "re-enqueueing recovered job");
                            self.inner.enqueue(&mut index, &record, permit);
                        }
                        Err(_) => {
                            warn!(job_id = %record.id, "no capacity for recovered job, marking failed");
                            record.state = JobState::Failed;
                            record.error = Some("queue full during recovery".to_string());
                            record.completed_at = Some(Utc::now());
                            self.inner.store.put(&record)?;
                        }
                    }
                }
                _ => {}
            }
        }
        self.inner.store.flush()
    }
}

/// Hex SHA-256 of the job's canonical key.
pub fn fingerprint(spec: &JobSpec) -> String {
    hex::encode(Sha256::digest(spec.canonical_key().as_bytes()))
}

impl PoolInner {
    fn lock(&self) -> FurrowResult<MutexGuard<'_, PoolIndex>> {
        self.index.lock().map_err(|_| FurrowError::InternalFailure {
            reason: "job index lock poisoned".to_string(),
        })
    }

    fn load(&self, id: &JobId) -> FurrowResult<JobRecord> {
        self.store.get(id)?.ok_or_else(|| FurrowError::NotFound {
            kind: "job".to_string(),
            id: id.to_string(),
        })
    }

    /// Register `record` as active and spawn its execution.
    fn enqueue(self: &Arc<Self>, index: &mut PoolIndex, record: &JobRecord, admission: OwnedSemaphorePermit) {
        let cancel = CancellationToken::new();
        index.by_fingerprint.insert(record.fingerprint.clone(), record.id);
        index.waiting.insert(record.id, cancel.clone());
        tokio::spawn(execute(self.clone(), record.id, admission, cancel));
    }

    /// Move a queued job to running. `None` if it was cancelled meanwhile.
    fn claim(&self, id: JobId) -> FurrowResult<Option<JobRecord>> {
        let mut index = self.lock()?;
        index.waiting.remove(&id);
        let mut record = self.load(&id)?;
        if record.state != JobState::Queued {
            return Ok(None);
        }
        record.state = JobState::Running;
        record.started_at = Some(Utc::now());
        self.store.put(&record)?;
        Ok(Some(record))
    }

    /// Record the terminal outcome durably.
    fn finish(&self, id: JobId, outcome: FurrowResult<TaskResult>) -> FurrowResult<JobRecord> {
        let mut index = self.lock()?;
        let mut record = self.load(&id)?;
        match outcome {
            Ok(result) => {
                record.state = JobState::Succeeded;
                record.result = Some(result);
            }
            Err(e) => {
                record.state = JobState::Failed;
                record.error = Some(e.to_string());
            }
        }
        record.completed_at = Some(Utc::now());
        self.store.put(&record)?;
        self.store.flush()?;
        if index.by_fingerprint.get(&record.fingerprint) == Some(&id) {
            index.by_fingerprint.remove(&record.fingerprint);
        }
        Ok(record)
    }
}

async fn execute(inner: Arc<PoolInner>, id: JobId, admission: OwnedSemaphorePermit, cancel: CancellationToken) {
    let worker = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(job_id = %id, "job cancelled while queued");
            return;
        }
        permit = inner.workers.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                error!(job_id = %id, "worker semaphore closed");
                return;
            }
        },
    };

    let record = match inner.claim(id) {
        Ok(Some(record)) => record,
        Ok(None) => return,
        Err(e) => {
            error!(job_id = %id, error = %e, "failed to claim job");
            return;
        }
    };
    info!(job_id = %id, session_id = %record.spec.session_id, model = %record.spec.scenario.model, "job started");

    // A panicking runner must still leave a terminal record.
    let runner = inner.runner.clone();
    let spec = record.spec.clone();
    let outcome = match tokio::spawn(async move { runner.run(&spec).await }).await {
        Ok(outcome) => outcome,
        Err(e) => Err(FurrowError::InternalFailure { reason: format!("job worker panicked: {}", e) }),
    };

    match inner.finish(id, outcome) {
        Ok(record) => info!(
            job_id = %id,
            state = %record.state,
            abandoned = record.abandoned,
            "job finished"
        ),
        Err(e) => error!(job_id = %id, error = %e, "failed to record job outcome"),
    }

    drop(worker);
    drop(admission);
}

#[async_trait]
impl JobQueue for WorkerPool {
    async fn submit(&self, spec: JobSpec) -> FurrowResult<JobId> {
        let fingerprint = fingerprint(&spec);
        let mut index = self.inner.lock()?;

        if let Some(existing) = index.by_fingerprint.get(&fingerprint).copied() {
            let mut record = self.inner.load(&existing)?;
            if record.abandoned && !record.state.is_terminal() {
                record.abandoned = false;
                self.inner.store.put(&record)?;
                info!(job_id = %existing, "abandoned job re-attached");
            } else {
                debug!(job_id = %existing, "identical job already active");
            }
            return Ok(existing);
        }

        let admission = self.inner.admission.clone().try_acquire_owned().map_err(|_| {
            warn!(session_id = %spec.session_id, "worker pool saturated, rejecting job");
            FurrowError::JobSubmissionRejected {
                reason: "worker pool and queue are full".to_string(),
            }
        })?;

        let record = JobRecord::new(JobId::new(), fingerprint, spec);
        self.inner.store.put(&record)?;
        info!(job_id = %record.id, session_id = %record.spec.session_id, "job queued");
        self.inner.enqueue(&mut index, &record, admission);
        Ok(record.id)
    }

    async fn status(&self, job_id: &JobId) -> FurrowResult<JobRecord> {
        let _index = self.inner.lock()?;
        let mut record = self.inner.load(job_id)?;
        record.last_polled_at = Some(Utc::now());
        self.inner.store.put(&record)?;
        Ok(record)
    }

    async fn cancel(&self, job_id: &JobId) -> FurrowResult<()> {
        let mut index = self.inner.lock()?;
        let mut record = self.inner.load(job_id)?;

        match record.state {
            JobState::Queued => {
                record.state = JobState::Cancelled;
                record.completed_at = Some(Utc::now());
                if let Some(token) = index.waiting.remove(job_id) {
                    token.cancel();
                }
                if index.by_fingerprint.get(&record.fingerprint) == Some(job_id) {
                    index.by_fingerprint.remove(&record.fingerprint);
                }
                info!(job_id = %job_id, "queued job cancelled");
            }
            // The run cannot be interrupted. Its fingerprint stays indexed so
            // an identical submission re-attaches instead of starting a twin.
            JobState::Running => {
                record.abandoned = true;
                warn!(job_id = %job_id, "job already running, marked abandoned");
            }
            _ => return Ok(()),
        }

        self.inner.store.put(&record)
    }
}
