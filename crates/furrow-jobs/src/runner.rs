//! The work a job performs.

use async_trait::async_trait;

use furrow_contracts::{error::FurrowResult, job::JobSpec, task::TaskResult};

/// Executes one job to completion inside a worker slot.
///
/// The pool never interrupts a running job; cancellation of running work only
/// marks the job abandoned.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, spec: &JobSpec) -> FurrowResult<TaskResult>;
}
