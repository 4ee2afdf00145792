//! A session is one end-to-end run of a parsed plan across the batch range
//! it defines.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a session (§3, invariant I1: monotonic, no backward
/// transitions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, not yet dispatching batches.
    Started,
    /// At least one batch is executing.
    Executing,
    /// Every batch reached a terminal state successfully.
    Complete,
    /// A batch failed and the session will not make further progress.
    Failed,
    /// Execution was suspended by an operator and can be resumed.
    Paused,
}

impl SessionStatus {
    /// Whether no further work can happen from this status without an
    /// explicit resume.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// How a session dispatches its ready batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Batches are still claimed concurrently by the worker pool, but the
    /// session only admits one `executing` batch at a time.
    Sequential,
    /// Every ready batch is admitted to `executing` as soon as its
    /// dependencies complete.
    #[default]
    Parallel,
}

/// One end-to-end run of a parsed plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: String,
    /// Path to the plan document this session was parsed from.
    pub plan_path: String,
    /// Current status.
    pub status: SessionStatus,
    /// Upper bound on review rounds any task in this session may use
    /// (§4.7; never consulted by the primary execution claim).
    pub max_review_rounds: u32,
    /// Inclusive lower bound of the batch range this session was started
    /// with.
    pub batch_lo: u32,
    /// Inclusive upper bound of the batch range this session was started
    /// with.
    pub batch_hi: u32,
    /// Sequential or parallel batch dispatch.
    pub mode: ExecutionMode,
    /// Batch number the scheduler is currently admitting, if any.
    pub current_batch: Option<u32>,
    /// Whether a successfully published change request should be
    /// squash-merged automatically.
    pub auto_publish: bool,
    /// When the session was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the session last changed status.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    /// Create a new session in the `started` status.
    #[must_use]
    pub fn new(id: impl Into<String>, plan_path: impl Into<String>, max_review_rounds: u32) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            plan_path: plan_path.into(),
            status: SessionStatus::Started,
            max_review_rounds,
            batch_lo: 1,
            batch_hi: u32::MAX,
            mode: ExecutionMode::Parallel,
            current_batch: None,
            auto_publish: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_complete_and_failed() {
        assert!(SessionStatus::Complete.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Executing.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
    }

    #[test]
    fn new_session_starts_in_started_status() {
        let session = Session::new("s-1", "PLAN.md", 3);
        assert_eq!(session.status, SessionStatus::Started);
    }
}
