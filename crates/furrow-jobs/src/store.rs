//! Durable job records on sled.

use std::path::Path;

use tracing::info;

use furrow_contracts::{
    error::{FurrowError, FurrowResult},
    job::{JobId, JobRecord},
};

const JOBS_TREE: &str = "jobs";

/// Job records keyed by job id. Cheap to clone; clones share the database.
#[derive(Clone)]
pub struct JobStore {
    db: sled::Db,
    jobs: sled::Tree,
}

impl JobStore {
    /// Open (or create) a durable store at `path`.
    pub fn open(path: &Path) -> FurrowResult<Self> {
        let db = sled::open(path).map_err(store_err)?;
        info!(path = %path.display(), "job store opened");
        Self::with_db(db)
    }

    /// A store discarded when the last clone drops.
    pub fn temporary() -> FurrowResult<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(store_err)?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> FurrowResult<Self> {
        let jobs = db.open_tree(JOBS_TREE).map_err(store_err)?;
        Ok(Self { db, jobs })
    }

    pub fn put(&self, record: &JobRecord) -> FurrowResult<()> {
        let bytes = serde_json::to_vec(record).map_err(|e| FurrowError::StoreError {
            reason: format!("failed to encode job {}: {}", record.id, e),
        })?;
        self.jobs.insert(record.id.0.as_bytes(), bytes).map_err(store_err)?;
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> FurrowResult<Option<JobRecord>> {
        self.jobs
            .get(id.0.as_bytes())
            .map_err(store_err)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Jobs still queued or running, oldest first.
    pub fn active(&self) -> FurrowResult<Vec<JobRecord>> {
        Ok(self.all()?.into_iter().filter(|r| r.state.is_active()).collect())
    }

    /// Every stored job, oldest first.
    pub fn all(&self) -> FurrowResult<Vec<JobRecord>> {
        let mut records = self
            .jobs
            .iter()
            .map(|entry| {
                let (_, bytes) = entry.map_err(store_err)?;
                decode(&bytes)
            })
            .collect::<FurrowResult<Vec<JobRecord>>>()?;
        records.sort_by_key(|r| r.submitted_at);
        Ok(records)
    }

    /// Force buffered writes to disk.
    pub fn flush(&self) -> FurrowResult<()> {
        self.db.flush().map_err(store_err)?;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> FurrowResult<JobRecord> {
    serde_json::from_slice(bytes).map_err(|e| FurrowError::StoreError {
        reason: format!("failed to decode job record: {}", e),
    })
}

fn store_err(e: sled::Error) -> FurrowError {
    FurrowError::StoreError { reason: e.to_string() }
}
