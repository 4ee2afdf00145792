//! Metrics collection.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::report::Metrics;

/// Trait for collecting metrics over the lifetime of one session run.
pub trait MetricsCollector: Send + Sync {
    /// Record a completed task's duration and final status.
    fn record_task(&self, task_id: &str, duration: Duration, status: &str);

    /// Record one retry of a task.
    fn record_retry(&self);

    /// Start a new session.
    fn start_session(&self, session_id: &str, plan_path: &str);

    /// Finish the session and return its final metrics.
    fn finish_session(&self, success: bool) -> Metrics;

    /// Get current metrics snapshot without finishing the session.
    fn snapshot(&self) -> Metrics;
}

/// Default metrics collector implementation.
#[derive(Debug)]
pub struct DefaultMetricsCollector {
    inner: Arc<Mutex<CollectorState>>,
}

#[derive(Debug, Default)]
struct CollectorState {
    session_id: String,
    plan_path: String,
    start_time: Option<Instant>,
    metrics: Metrics,
}

impl Default for DefaultMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultMetricsCollector {
    /// Create a new collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CollectorState::default())),
        }
    }
}

impl MetricsCollector for DefaultMetricsCollector {
    fn record_task(&self, task_id: &str, duration: Duration, status: &str) {
        if let Ok(mut state) = self.inner.lock() {
            state
                .metrics
                .add_task(task_id, duration.as_millis() as u64, status);
        }
    }

    fn record_retry(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.metrics.retry_count += 1;
        }
    }

    fn start_session(&self, session_id: &str, plan_path: &str) {
        if let Ok(mut state) = self.inner.lock() {
            state.session_id = session_id.to_string();
            state.plan_path = plan_path.to_string();
            state.start_time = Some(Instant::now());
            state.metrics = Metrics::new(session_id, plan_path);
        }
    }

    fn finish_session(&self, success: bool) -> Metrics {
        if let Ok(mut state) = self.inner.lock() {
            let total_time_ms = state.start_time.map_or(0, |t| t.elapsed().as_millis() as u64);
            state.metrics.total_time_ms = total_time_ms;
            state.metrics.success = success;
            state.metrics.clone()
        } else {
            Metrics::default()
        }
    }

    fn snapshot(&self) -> Metrics {
        self.finish_session(false)
    }
}

/// Timer for measuring a single task's duration, reporting to a collector
/// when dropped via [`StepTimer::stop`].
pub struct StepTimer<'a, C: MetricsCollector> {
    collector: &'a C,
    task_id: String,
    start: Instant,
}

impl<'a, C: MetricsCollector> StepTimer<'a, C> {
    /// Create and start a timer for `task_id`.
    pub fn start(collector: &'a C, task_id: impl Into<String>) -> Self {
        Self {
            collector,
            task_id: task_id.into(),
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration under the given final status.
    pub fn stop(self, status: &str) {
        self.collector.record_task(&self.task_id, self.start.elapsed(), status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_start_session_resets_state() {
        let collector = DefaultMetricsCollector::new();
        collector.start_session("sess-123", "PLAN.md");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.session_id, "sess-123");
        assert_eq!(snapshot.plan_path, "PLAN.md");
    }

    #[test]
    fn collector_record_task_accumulates() {
        let collector = DefaultMetricsCollector::new();
        collector.start_session("sess-123", "PLAN.md");
        collector.record_task("1.1", Duration::from_millis(100), "merged");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.task_metrics.len(), 1);
        assert_eq!(snapshot.task_metrics[0].task_id, "1.1");
        assert_eq!(snapshot.task_metrics[0].duration_ms, 100);
    }

    #[test]
    fn collector_record_retry_increments_count() {
        let collector = DefaultMetricsCollector::new();
        collector.start_session("sess-123", "PLAN.md");
        collector.record_retry();
        collector.record_retry();

        assert_eq!(collector.snapshot().retry_count, 2);
    }

    #[test]
    fn collector_finish_session_marks_success() {
        let collector = DefaultMetricsCollector::new();
        collector.start_session("sess-123", "PLAN.md");
        collector.record_task("1.1", Duration::from_millis(50), "merged");

        let metrics = collector.finish_session(true);
        assert!(metrics.success);
    }

    #[test]
    fn step_timer_records_elapsed_time() {
        let collector = DefaultMetricsCollector::new();
        collector.start_session("sess-123", "PLAN.md");

        let timer = StepTimer::start(&collector, "1.1");
        std::thread::sleep(Duration::from_millis(10));
        timer.stop("merged");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.task_metrics.len(), 1);
        assert!(snapshot.task_metrics[0].duration_ms >= 10);
    }
}
