//! Error taxonomy for the core domain, matching the dotted error codes a
//! caller can match on (`plan.*`, `orchestrator.*`, `pool.*`, `exec.*`,
//! `session.fatal`).

use thiserror::Error;

/// Plan-document parsing errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan document could not be found or read.
    #[error("plan not found: {0}")]
    NotFound(String),

    /// The plan document contained no batch headers at all.
    #[error("plan contains no batches")]
    Empty,

    /// A batch section could not be parsed (fatal — the whole parse fails).
    #[error("malformed batch {0}: {1}")]
    MalformedBatch(u32, String),
}

impl PlanError {
    /// Stable dotted code for structured logging.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "plan.not_found",
            Self::Empty => "plan.empty",
            Self::MalformedBatch(..) => "plan.malformed_batch",
        }
    }
}

/// Orchestration-level errors (batch/task lifecycle transitions).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The plan produced a session with no batches to run.
    #[error("plan produced an empty batch range")]
    EmptyRange,

    /// Underlying persistence failure.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

impl OrchestratorError {
    /// Stable dotted code for structured logging.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyRange => "orchestrator.empty_range",
            Self::Store(_) => "orchestrator.store_error",
        }
    }
}

/// Task-execution errors (§4.5).
#[derive(Debug, Error)]
pub enum ExecError {
    /// Branch creation/promotion failed.
    #[error("branch error: {0}")]
    Branch(#[from] bx_git::GitError),

    /// The configured agent binary could not be found or spawned.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// The agent ran past its timeout.
    #[error("agent timed out after {0:?}")]
    AgentTimeout(std::time::Duration),

    /// A VCS operation (commit/push) failed.
    #[error("vcs error: {0}")]
    Vcs(String),

    /// Publishing a change request to the code forge failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// The task store or sandbox pool failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ExecError {
    /// Stable dotted code for structured logging.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Branch(_) => "exec.branch_error",
            Self::AgentNotFound(_) => "exec.agent_not_found",
            Self::AgentTimeout(_) => "exec.agent_timeout",
            Self::Vcs(_) => "exec.vcs_error",
            Self::Publish(_) => "exec.publish_error",
            Self::Backend(_) => "exec.backend_error",
        }
    }
}

impl From<bx_agent::AgentError> for ExecError {
    fn from(e: bx_agent::AgentError) -> Self {
        match e {
            bx_agent::AgentError::NotFound(m) => Self::AgentNotFound(m),
            bx_agent::AgentError::SpawnFailed(m) => Self::AgentNotFound(m),
            bx_agent::AgentError::Timeout(d) => Self::AgentTimeout(d),
            bx_agent::AgentError::ScratchFile(m) => Self::Vcs(m),
        }
    }
}

/// Top-level error type for configuration and cross-cutting failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration could not be loaded, parsed, or saved.
    #[error("config error: {0}")]
    Config(String),

    /// A session hit an unrecoverable condition and transitioned to
    /// `failed` terminally (`session.fatal`).
    #[error("session {0} failed fatally: {1}")]
    SessionFatal(String, String),

    /// Plan parsing failed.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Orchestration failed.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// Task execution failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}
