//! A task is the unit of work claimed by exactly one worker and executed
//! inside exactly one sandbox.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet claimed by a worker.
    #[default]
    Pending,
    /// Claimed and currently executing inside a sandbox.
    InProgress,
    /// A branch was pushed and a change request opened, or — when external
    /// side effects are skipped — a local commit was produced and is ready
    /// to be published.
    PrCreated,
    /// The change request was merged.
    Merged,
    /// The task failed and will not be retried automatically.
    Failed,
}

/// Fields specific to one task, parsed out of the plan document's markdown
/// (§4.1) plus forward-compatible free-form data.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskExtras {
    /// The task's full implementation instructions, verbatim from the plan.
    pub implementation_text: String,
    /// Files the task is expected to touch.
    pub files: Vec<String>,
    /// Advisory verification commands.
    pub verification_steps: Vec<String>,
    /// Task numbers (as written, e.g. `"2.1"`) this task depends on.
    pub depends_on: Vec<String>,
    /// Anything the parser recognized but this schema doesn't name yet.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One unit of work within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: String,
    /// Owning batch.
    pub batch_id: String,
    /// Task number as written in the plan (e.g. `"2.1"`, `"2.1a"`).
    pub number: String,
    /// Title following the task number.
    pub title: String,
    /// Current status.
    pub status: TaskStatus,
    /// Sandbox slot currently executing this task, if any.
    pub sandbox_id: Option<String>,
    /// Number of review rounds used so far (§4.7).
    pub review_rounds: u32,
    /// Published-change number on the hosting code forge, once opened.
    pub pr_number: Option<u64>,
    /// Published-change URL on the hosting code forge, once opened.
    pub pr_url: Option<String>,
    /// Commit identifiers produced for this task, in order.
    pub commits: Vec<String>,
    /// Error message recorded when the task's status is `failed`.
    pub error: Option<String>,
    /// Parsed task payload.
    pub extras: TaskExtras,
    /// When the task was claimed.
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// When the task last changed status.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Parsed `(leading_digits, trailing_alpha)` pairs used to sort task
/// numbers like `"2.1"`, `"2.1a"`, `"2.10"` correctly (I5).
#[must_use]
pub fn task_sort_key(number: &str) -> Vec<(u64, String)> {
    number
        .split('.')
        .map(|segment| {
            let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
            let alpha: String = segment.chars().skip_while(|c| c.is_ascii_digit()).collect();
            (digits.parse().unwrap_or(0), alpha)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_sort_key_orders_numerically_not_lexically() {
        let mut numbers = vec!["2.10", "2.2", "2.1"];
        numbers.sort_by_key(|n| task_sort_key(n));
        assert_eq!(numbers, vec!["2.1", "2.2", "2.10"]);
    }

    #[test]
    fn task_sort_key_orders_alpha_suffix_after_bare_number() {
        let mut numbers = vec!["3.1a", "3.1"];
        numbers.sort_by_key(|n| task_sort_key(n));
        assert_eq!(numbers, vec!["3.1", "3.1a"]);
    }
}
