//! The worker loop (§4.4): repeatedly claims a task, acquires a sandbox,
//! runs it through the [`TaskExecutor`], and releases the sandbox whatever
//! the outcome.

use std::sync::Arc;
use std::time::Duration;

use bx_git::WorktreePool;

use crate::executor::TaskExecutor;
use crate::store::{Store, TaskResult};
use crate::task::TaskStatus;
use crate::ExecError;

/// Outcome of a single poll-claim-execute cycle.
#[derive(Debug)]
pub enum WorkerStep {
    /// No claimable task existed; caller should back off before retrying.
    Idle,
    /// A task was claimed and run to a terminal status.
    Ran {
        /// Claimed task's id.
        task_id: String,
        /// Final status recorded.
        status: TaskStatus,
    },
}

/// Drains one session's claimable tasks against a fixed-size sandbox pool.
pub struct Worker {
    store: Arc<dyn Store>,
    pool: Arc<WorktreePool>,
    executor: Arc<TaskExecutor>,
    sandbox_acquire_timeout: Duration,
}

impl Worker {
    /// Build a worker against the given store, sandbox pool, and executor.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        pool: Arc<WorktreePool>,
        executor: Arc<TaskExecutor>,
        sandbox_acquire_timeout: Duration,
    ) -> Self {
        Self {
            store,
            pool,
            executor,
            sandbox_acquire_timeout,
        }
    }

    /// Run one claim-execute-release cycle for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] if a sandbox cannot be acquired for a claimed
    /// task, or if the store fails.
    pub async fn step(&self, session_id: &str, sandbox_id_hint: &str) -> Result<WorkerStep, ExecError> {
        let task = self
            .store
            .claim_next_task(session_id, sandbox_id_hint)
            .await
            .map_err(|e| ExecError::Backend(e.to_string()))?;

        let Some(task) = task else {
            return Ok(WorkerStep::Idle);
        };

        tracing::info!(task_id = %task.id, task_number = %task.number, "claimed task");

        let sandbox = self
            .pool
            .acquire(&task.id, self.sandbox_acquire_timeout)
            .await
            .map_err(|e| ExecError::Backend(e.to_string()))?;

        let batch_number: u32 = task.number.split('.').next().and_then(|n| n.parse().ok()).unwrap_or(0);
        let branch_name = format!("task/{}", task.number);

        let outcome = self
            .executor
            .run_task(&task, &sandbox.path, batch_number, &branch_name)
            .await;

        let release_result = self.pool.release(&sandbox.id).await;
        if let Err(e) = release_result {
            tracing::error!(sandbox = %sandbox.id, error = %e, "sandbox release failed, left in error state");
        }

        let result = match outcome {
            // A merge, a change request, or no diff at all (§4.5 step 4) are
            // all successful outcomes; only an `Err` is a failure.
            Ok(result) => {
                let status = if result.merged { TaskStatus::Merged } else { TaskStatus::PrCreated };
                TaskResult {
                    status,
                    pr_number: result.change_request.as_ref().map(|cr| cr.number),
                    pr_url: result.change_request.as_ref().map(|cr| cr.url.clone()),
                    commits: result.commits,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, code = e.code(), "task execution failed");
                TaskResult {
                    status: TaskStatus::Failed,
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };
        let status = result.status;

        self.store
            .mark_task_result(&task.id, result)
            .await
            .map_err(|e| ExecError::Backend(e.to_string()))?;

        Ok(WorkerStep::Ran {
            task_id: task.id,
            status,
        })
    }
}
