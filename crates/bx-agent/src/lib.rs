//! Subprocess-based invocation of the external coding agent.

pub mod driver;
pub mod error;

pub use driver::{AgentDriver, AgentOutput, FakeAgentDriver, LocalAgentDriver};
pub use error::AgentError;
