//! Review rounds (§4.7, sketch). A `Review` records one pass over a task
//! that has already produced a change request.

use serde::{Deserialize, Serialize};

/// The outcome of one review pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No further changes requested; the task may be merged.
    Approved,
    /// Changes requested; the task is eligible for another round up to
    /// the session's `max_review_rounds`.
    ChangesRequested,
}

/// A single review round against a task's change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Unique identifier.
    pub id: String,
    /// Task being reviewed.
    pub task_id: String,
    /// Round number, starting at 1.
    pub round: u32,
    /// Outcome of this round.
    pub verdict: Verdict,
    /// Free-form notes from the review.
    pub notes: String,
    /// When the review was recorded.
    pub created_at: chrono::DateTime<chrono::Utc>,
}
