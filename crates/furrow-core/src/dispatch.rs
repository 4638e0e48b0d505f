//! Fan-out / fan-in of one planning pass.
//!
//! Every task of the pass is submitted without waiting on any other, then each
//! is polled on its own timer until it reaches a terminal status, its
//! capability bound elapses, the plan deadline elapses, or the request is
//! cancelled. `run_plan` returns only when every task is terminal, so the
//! caller can never begin aggregation on a partial set.
//!
//! Waiting is `tokio::time::sleep` between polls: a long simulation job parks
//! this future, not a thread.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use furrow_contracts::{
    config::TimeoutConfig,
    error::FurrowError,
    task::{AgentTask, TaskErrorKind, TaskHandle, TaskOutcome, TaskStatus},
};

use crate::{roster::AgentRoster, traits::CapabilityAgent};

/// Snapshots of tasks whose state changed mid-flight (job bound, finished).
pub type ProgressSender = mpsc::UnboundedSender<AgentTask>;

/// Drive every task in `tasks` to a terminal status, concurrently.
///
/// Tasks that are already terminal pass through untouched. Tasks already bound
/// to a job (resumed after a restart) are re-attached by polling that job
/// instead of submitting again.
pub async fn run_plan(
    agents: &AgentRoster,
    tasks: Vec<AgentTask>,
    timeouts: &TimeoutConfig,
    cancel: CancellationToken,
    progress: Option<ProgressSender>,
) -> Vec<AgentTask> {
    let plan_deadline = Instant::now() + timeouts.plan_deadline();
    let task_count = tasks.len();

    let drivers = tasks.into_iter().map(|task| {
        let agent = Arc::clone(agents.get(task.capability));
        let bound = timeouts.for_capability(task.capability);
        drive_task(
            agent,
            task,
            bound,
            timeouts.poll_interval(),
            plan_deadline,
            cancel.clone(),
            progress.clone(),
        )
    });

    let finished = join_all(drivers).await;

    let done = finished.iter().filter(|t| t.status == TaskStatus::Done).count();
    info!(task_count, done, "planning pass dispatch complete");
    finished
}

fn notify(progress: &Option<ProgressSender>, task: &AgentTask) {
    if let Some(tx) = progress {
        // The receiver goes away only when the controller stopped listening.
        let _ = tx.send(task.clone());
    }
}

async fn drive_task(
    agent: Arc<dyn CapabilityAgent>,
    mut task: AgentTask,
    bound: Duration,
    poll_interval: Duration,
    plan_deadline: Instant,
    cancel: CancellationToken,
    progress: Option<ProgressSender>,
) -> AgentTask {
    if task.status.is_terminal() {
        return task;
    }

    let deadline = (Instant::now() + bound).min(plan_deadline);
    let bound_ms = bound.as_millis() as u64;

    let handle = match task.job_id {
        Some(job_id) => {
            debug!(task_id = %task.id, job_id = %job_id, "re-attaching to existing job");
            TaskHandle::job(task.id, task.capability, job_id)
        }
        None => {
            task.submitted_at = Some(Utc::now());
            task.status = TaskStatus::Running;
            debug!(task_id = %task.id, capability = %task.capability, "submitting task");

            let submitted = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    task.apply(TaskOutcome::failed(
                        TaskErrorKind::Cancelled,
                        "request cancelled before submission completed",
                    ));
                    notify(&progress, &task);
                    return task;
                }
                r = timeout_at(deadline, agent.submit(&task)) => r,
            };

            match submitted {
                Err(_) => {
                    warn!(task_id = %task.id, capability = %task.capability, "submission timed out");
                    task.apply(TaskOutcome::failed(
                        TaskErrorKind::Timeout,
                        format!("{} did not accept the task within {} ms", task.capability, bound_ms),
                    ));
                    notify(&progress, &task);
                    return task;
                }
                Ok(Err(e)) => {
                    let kind = match e {
                        FurrowError::JobSubmissionRejected { .. } => TaskErrorKind::Backpressure,
                        _ => TaskErrorKind::Failure,
                    };
                    warn!(task_id = %task.id, capability = %task.capability, error = %e, "submission failed");
                    task.apply(TaskOutcome::failed(kind, e.to_string()));
                    notify(&progress, &task);
                    return task;
                }
                Ok(Ok(handle)) => handle,
            }
        }
    };

    if let Some(job_id) = handle.job_id() {
        if task.job_id.is_none() {
            task.job_id = Some(job_id);
            notify(&progress, &task);
        }
    }

    loop {
        let outcome = match agent.poll(&handle).await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::failed(TaskErrorKind::Failure, e.to_string()),
        };

        if outcome.status.is_terminal() {
            debug!(task_id = %task.id, capability = %task.capability, status = %outcome.status, "task finished");
            task.apply(outcome);
            notify(&progress, &task);
            return task;
        }
        task.status = outcome.status;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Err(e) = agent.cancel(&handle).await {
                    warn!(task_id = %task.id, error = %e, "cancel was not accepted");
                }
                task.apply(TaskOutcome::failed(TaskErrorKind::Cancelled, "request cancelled"));
                notify(&progress, &task);
                return task;
            }
            _ = sleep_until(deadline) => {
                warn!(task_id = %task.id, capability = %task.capability, bound_ms, "task timed out");
                if let Err(e) = agent.cancel(&handle).await {
                    warn!(task_id = %task.id, error = %e, "cancel after timeout was not accepted");
                }
                task.apply(TaskOutcome::failed(
                    TaskErrorKind::Timeout,
                    format!("{} exceeded its {} ms bound", task.capability, bound_ms),
                ));
                notify(&progress, &task);
                return task;
            }
            _ = sleep(poll_interval) => {}
        }
    }
}
