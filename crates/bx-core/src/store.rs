//! The persistence contract the orchestrator and workers depend on. The
//! concrete SQLite implementation lives in the `bx-store` crate so that
//! `bx-core` stays free of a storage-engine dependency.

use async_trait::async_trait;
use thiserror::Error;

use crate::batch::Batch;
use crate::review::Review;
use crate::session::{ExecutionMode, Session};
use crate::task::{Task, TaskStatus};

/// Errors raised by a [`Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write violated a uniqueness or foreign-key constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The underlying database connection or driver failed.
    #[error("backend error: {0}")]
    Backend(String),
}

/// The payload recorded against a task alongside its new status (§4.2
/// `MarkTaskResult`): the published-change number/URL when one was opened,
/// the commits produced, and the error string on `failed`.
#[derive(Debug, Clone, Default)]
pub struct TaskResult {
    /// The status to transition the task to.
    pub status: TaskStatus,
    /// Published-change number, if a change request was opened or reused.
    pub pr_number: Option<u64>,
    /// Published-change URL, if a change request was opened or reused.
    pub pr_url: Option<String>,
    /// Commit identifiers produced for this task, in order.
    pub commits: Vec<String>,
    /// Error message, set when `status` is `failed`.
    pub error: Option<String>,
}

impl TaskResult {
    /// Build a bare status-only result, e.g. for in-progress transitions
    /// that carry no publication payload.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// A freshly-parsed plan ready to be persisted as a session.
pub struct NewSession {
    /// Plan document path, stored for auditing/debugging.
    pub plan_path: String,
    /// Review-round upper bound for every task in this session.
    pub max_review_rounds: u32,
    /// Parsed batches and their tasks, already filtered to the requested
    /// range, in plan order.
    pub batches: Vec<crate::plan_parser::ParsedBatch>,
    /// Inclusive lower bound of the batch range this session was started
    /// with.
    pub batch_lo: u32,
    /// Inclusive upper bound of the batch range this session was started
    /// with.
    pub batch_hi: u32,
    /// Sequential or parallel batch dispatch.
    pub mode: ExecutionMode,
    /// Whether a successfully published change request should be
    /// squash-merged automatically.
    pub auto_publish: bool,
}

/// The persistence operations the orchestrator and workers need. One
/// transaction per logical operation; implementations are responsible for
/// the atomicity of multi-row writes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a freshly parsed plan as a new session with its batches and
    /// tasks, all starting `pending` except batches with no dependencies,
    /// which start `ready`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the plan produced no batches or the write
    /// fails.
    async fn start_execution(&self, new_session: NewSession) -> Result<Session, StoreError>;

    /// Batches within `session_id` whose dependencies are all complete and
    /// which are still `pending` (the scheduler promotes these to `ready`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn ready_batches(&self, session_id: &str) -> Result<Vec<Batch>, StoreError>;

    /// Transition a batch from `ready` to `executing`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn mark_batch_executing(&self, batch_id: &str) -> Result<(), StoreError>;

    /// Transition a batch to `complete` once every task in it is `merged`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn mark_batch_complete(&self, batch_id: &str) -> Result<(), StoreError>;

    /// Transition a batch to `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn mark_batch_failed(&self, batch_id: &str) -> Result<(), StoreError>;

    /// Atomically claim one `pending` task from an `executing` batch within
    /// `session_id`, transitioning it to `in_progress`. Returns `None` if no
    /// claimable task exists (I2: at most one worker ever claims a given
    /// task).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn claim_next_task(&self, session_id: &str, sandbox_id: &str) -> Result<Option<Task>, StoreError>;

    /// Record the terminal or intermediate result of executing a task,
    /// including its published-change number/URL, commits, and error
    /// string where applicable (§4.2 `MarkTaskResult`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn mark_task_result(&self, task_id: &str, result: TaskResult) -> Result<(), StoreError>;

    /// Record a review round against a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn record_review(&self, review: Review) -> Result<(), StoreError>;

    /// Fetch current session status plus its batches, for reporting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the session does not exist.
    async fn session_status(&self, session_id: &str) -> Result<(Session, Vec<Batch>), StoreError>;

    /// All tasks belonging to a batch, in plan order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    async fn tasks_for_batch(&self, batch_id: &str) -> Result<Vec<Task>, StoreError>;
}
