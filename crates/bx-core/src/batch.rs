//! A batch groups tasks that may run concurrently once its declared
//! dependency batches have all completed.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a batch (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Dependencies not yet satisfied.
    Pending,
    /// Dependencies satisfied; tasks may now be claimed.
    Ready,
    /// At least one task has been claimed.
    Executing,
    /// Every task in the batch reached a terminal state successfully.
    Complete,
    /// At least one task failed and the batch will not complete.
    Failed,
}

/// One group of tasks gated by batch-level dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Batch number as it appeared in the plan document (`## Batch N:`).
    pub number: u32,
    /// Title following the batch number.
    pub title: String,
    /// Batch numbers this batch depends on.
    pub dependencies: Vec<u32>,
    /// Current status.
    pub status: BatchStatus,
}

impl Batch {
    /// Whether this batch's dependencies are all satisfied by `completed`,
    /// the set of batch numbers that have reached `Complete`.
    #[must_use]
    pub fn is_ready(&self, completed: &std::collections::HashSet<u32>) -> bool {
        self.status == BatchStatus::Pending && self.dependencies.iter().all(|d| completed.contains(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn batch(number: u32, deps: Vec<u32>) -> Batch {
        Batch {
            id: format!("b-{number}"),
            session_id: "s-1".to_string(),
            number,
            title: "title".to_string(),
            dependencies: deps,
            status: BatchStatus::Pending,
        }
    }

    #[test]
    fn batch_with_no_dependencies_is_immediately_ready() {
        assert!(batch(1, vec![]).is_ready(&HashSet::new()));
    }

    #[test]
    fn batch_waits_for_all_dependencies() {
        let b = batch(3, vec![1, 2]);
        let mut completed = HashSet::new();
        completed.insert(1);
        assert!(!b.is_ready(&completed));
        completed.insert(2);
        assert!(b.is_ready(&completed));
    }

    #[test]
    fn a_non_pending_batch_is_never_ready_again() {
        let mut b = batch(1, vec![]);
        b.status = BatchStatus::Executing;
        assert!(!b.is_ready(&HashSet::new()));
    }
}
