//! Timing aggregation for the batch executor.
//!
//! Tracks how long a session, and each task within it, takes to run and
//! persists that to the session's state directory for later reporting. There
//! is no token-cost accounting here: the coding agent is an opaque CLI
//! subprocess, so the only signal available to this crate is wall-clock time
//! and final task status.

pub mod collector;
pub mod error;
pub mod report;
pub mod time;

pub use collector::{DefaultMetricsCollector, MetricsCollector, StepTimer};
pub use error::MetricsError;
pub use report::{FileMetricsStorage, Metrics, MetricsStorage, MetricsSummary, TaskMetrics};
pub use time::{format_duration, format_ms, Stopwatch};
