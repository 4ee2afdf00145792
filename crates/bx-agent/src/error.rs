//! Agent driver error types.

use thiserror::Error;

/// Errors from invoking the external coding agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The configured agent binary could not be found on `PATH` or in any
    /// of the well-known install locations.
    #[error("agent binary not found: {0}")]
    NotFound(String),

    /// The subprocess could not be spawned at all.
    #[error("failed to spawn agent: {0}")]
    SpawnFailed(String),

    /// The agent ran longer than the allotted timeout and was killed.
    #[error("agent execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The prompt scratch file could not be written or removed.
    #[error("failed to manage prompt scratch file: {0}")]
    ScratchFile(String),
}

impl AgentError {
    /// Whether retrying the same invocation might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        assert!(AgentError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        assert!(!AgentError::NotFound("claude".to_string()).is_retryable());
    }
}
