//! # furrow-jobs
//!
//! The shared `JobQueue` for long-running capability work.
//!
//! - [`store`]: `JobStore`, durable job records on sled.
//! - [`runner`]: the `JobRunner` trait a worker executes.
//! - [`pool`]: `WorkerPool`, bounded admission, idempotent submission, and
//!   recovery of jobs left behind by a previous process.

pub mod pool;
pub mod runner;
pub mod store;

pub use pool::WorkerPool;
pub use runner::JobRunner;
pub use store::JobStore;
