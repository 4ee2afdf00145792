//! Metrics reporting and storage.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MetricsError;

/// Aggregated metrics for one session run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Session ID.
    pub session_id: String,
    /// Plan document path.
    pub plan_path: String,
    /// When the session started.
    pub started_at: Option<DateTime<Utc>>,
    /// Total wall-clock time in milliseconds.
    pub total_time_ms: u64,
    /// Per-task timing and outcome.
    pub task_metrics: Vec<TaskMetrics>,
    /// Number of task retries across the session.
    pub retry_count: u32,
    /// Whether the session completed successfully.
    pub success: bool,
}

impl Metrics {
    /// Create new metrics for a session, starting its clock now.
    #[must_use]
    pub fn new(session_id: impl Into<String>, plan_path: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            plan_path: plan_path.into(),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Record a task's timing and final status.
    pub fn add_task(&mut self, task_id: impl Into<String>, duration_ms: u64, status: impl Into<String>) {
        self.task_metrics.push(TaskMetrics {
            task_id: task_id.into(),
            duration_ms,
            status: status.into(),
        });
    }

    /// Get a display summary.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            session_id: self.session_id.clone(),
            plan_path: self.plan_path.clone(),
            duration_secs: self.total_time_ms as f64 / 1000.0,
            tasks: self.task_metrics.len(),
            retries: self.retry_count,
            success: self.success,
        }
    }
}

/// Summary of metrics for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Session ID.
    pub session_id: String,
    /// Plan document path.
    pub plan_path: String,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Number of tasks executed.
    pub tasks: usize,
    /// Number of retries.
    pub retries: u32,
    /// Whether the session succeeded.
    pub success: bool,
}

/// Timing and outcome for a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Task ID.
    pub task_id: String,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Final task status, as its dotted string (`merged`, `failed`, ...).
    pub status: String,
}

/// Trait for metrics storage.
pub trait MetricsStorage: Send + Sync {
    /// Save metrics for a session.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    fn save(&self, metrics: &Metrics) -> Result<(), MetricsError>;

    /// Load metrics for a session.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails.
    fn load(&self, session_id: &str) -> Result<Metrics, MetricsError>;

    /// Check if metrics exist for a session.
    fn exists(&self, session_id: &str) -> bool;
}

/// File-based metrics storage, rooted under the batch executor's state
/// directory.
pub struct FileMetricsStorage {
    base_path: PathBuf,
}

impl FileMetricsStorage {
    /// Create a new file-based storage rooted at `base_path` (typically
    /// `.batchexec`).
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn metrics_path(&self, session_id: &str) -> PathBuf {
        self.base_path.join("sessions").join(session_id).join("metrics.json")
    }
}

impl MetricsStorage for FileMetricsStorage {
    fn save(&self, metrics: &Metrics) -> Result<(), MetricsError> {
        let path = self.metrics_path(&metrics.session_id);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MetricsError::StorageError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(metrics).map_err(|e| MetricsError::SerializationError(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| MetricsError::StorageError(e.to_string()))?;

        tracing::debug!(session_id = %metrics.session_id, path = %path.display(), "saved session metrics");
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Metrics, MetricsError> {
        let path = self.metrics_path(session_id);

        if !path.exists() {
            return Err(MetricsError::NotFound(session_id.to_string()));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| MetricsError::StorageError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| MetricsError::SerializationError(e.to_string()))
    }

    fn exists(&self, session_id: &str) -> bool {
        self.metrics_path(session_id).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn metrics_new_starts_empty() {
        let metrics = Metrics::new("sess-1", "PLAN.md");
        assert_eq!(metrics.session_id, "sess-1");
        assert!(metrics.task_metrics.is_empty());
    }

    #[test]
    fn add_task_accumulates_and_summarizes() {
        let mut metrics = Metrics::new("sess-1", "PLAN.md");
        metrics.total_time_ms = 5000;
        metrics.add_task("t-1", 1200, "merged");
        metrics.success = true;

        let summary = metrics.summary();
        assert_eq!(summary.duration_secs, 5.0);
        assert_eq!(summary.tasks, 1);
    }

    #[test]
    fn file_storage_round_trips() {
        let dir = TempDir::new().expect("temp dir");
        let storage = FileMetricsStorage::new(dir.path().join(".batchexec"));

        let mut metrics = Metrics::new("sess-1", "PLAN.md");
        metrics.total_time_ms = 1234;
        metrics.add_task("t-1", 100, "merged");

        storage.save(&metrics).expect("save");
        assert!(storage.exists("sess-1"));

        let loaded = storage.load("sess-1").expect("load");
        assert_eq!(loaded.session_id, "sess-1");
        assert_eq!(loaded.total_time_ms, 1234);
    }

    #[test]
    fn file_storage_reports_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let storage = FileMetricsStorage::new(dir.path().join(".batchexec"));
        assert!(storage.load("nonexistent").is_err());
    }
}
