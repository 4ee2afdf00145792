//! Invocation of the external, opaque coding-agent CLI.
//!
//! The executor never calls a model API directly: it shells out to an agent
//! binary (`claude` by default) the way a human operator would, pointed at
//! the sandbox's working directory, and treats the resulting working-tree
//! diff — not the subprocess's stdout — as the source of truth for success.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

use crate::AgentError;

/// Extra `PATH` entries checked ahead of the inherited environment, since
/// agents are frequently installed outside a login shell's default `PATH`
/// when invoked from a service process.
const EXTRA_PATH_SEGMENTS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

/// Result of one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code, if the process terminated normally.
    pub exit_code: Option<i32>,
}

impl AgentOutput {
    /// Combined stdout+stderr, useful for logging and for storing on the
    /// task record.
    #[must_use]
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// One-method abstraction over "run this prompt against the working tree at
/// this path." Swappable so task execution tests never shell out.
#[async_trait]
pub trait AgentDriver: Send + Sync {
    /// Run `prompt` against the working tree rooted at `cwd`, killing the
    /// process if it runs past `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the agent cannot be found, spawned, or
    /// finishes too slowly.
    async fn run(&self, prompt: &str, cwd: &Path, timeout: Duration) -> Result<AgentOutput, AgentError>;
}

/// Drives the agent as a local subprocess (no containerization).
pub struct LocalAgentDriver {
    agent_binary: String,
}

impl LocalAgentDriver {
    /// Create a driver invoking `agent_binary` (resolved against `PATH` and
    /// a handful of well-known install directories at call time).
    #[must_use]
    pub fn new(agent_binary: impl Into<String>) -> Self {
        Self {
            agent_binary: agent_binary.into(),
        }
    }

    fn resolve_agent_path(&self) -> PathBuf {
        if self.agent_binary.starts_with('/') {
            return PathBuf::from(&self.agent_binary);
        }

        let home = std::env::var("HOME").unwrap_or_default();
        let candidates = [
            format!("{home}/.local/bin/{}", self.agent_binary),
            format!("/usr/local/bin/{}", self.agent_binary),
            format!("/usr/bin/{}", self.agent_binary),
            format!("{home}/.npm/bin/{}", self.agent_binary),
            format!("{home}/.cargo/bin/{}", self.agent_binary),
        ];

        for candidate in &candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return path;
            }
        }

        PathBuf::from(&self.agent_binary)
    }

    fn hardened_path() -> String {
        let existing = std::env::var("PATH").unwrap_or_default();
        let mut segments: Vec<&str> = EXTRA_PATH_SEGMENTS
            .iter()
            .filter(|seg| !existing.split(':').any(|p| p == **seg))
            .copied()
            .collect();
        segments.push(existing.as_str());
        segments.join(":")
    }
}

#[async_trait]
impl AgentDriver for LocalAgentDriver {
    async fn run(&self, prompt: &str, cwd: &Path, exec_timeout: Duration) -> Result<AgentOutput, AgentError> {
        let agent_path = self.resolve_agent_path();
        tracing::debug!(agent_path = %agent_path.display(), "invoking agent locally");

        let scratch = cwd.join(".pipeline_prompt.md");
        tokio::fs::write(&scratch, prompt)
            .await
            .map_err(|e| AgentError::ScratchFile(e.to_string()))?;

        let mut cmd = Command::new(&agent_path);
        cmd.args(["-p", prompt, "--output-format", "text", "--dangerously-skip-permissions"]);
        cmd.current_dir(cwd);
        cmd.env("PATH", Self::hardened_path());

        let result = timeout(exec_timeout, cmd.output()).await;

        // Always clean up the scratch prompt file, mirroring a try/finally.
        let _ = tokio::fs::remove_file(&scratch).await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AgentError::SpawnFailed(format!(
                    "{}: {e}",
                    agent_path.display()
                )))
            }
            Err(_) => return Err(AgentError::Timeout(exec_timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            tracing::warn!(
                agent = %agent_path.display(),
                code = ?output.status.code(),
                "agent exited non-zero; treating as advisory, diff is the source of truth"
            );
        }

        Ok(AgentOutput {
            stdout,
            stderr,
            exit_code: output.status.code(),
        })
    }
}

/// A canned-response driver for tests and for `skip_external_side_effects`
/// offline runs — never spawns a process.
#[derive(Default)]
pub struct FakeAgentDriver {
    response: AgentOutput,
}

impl FakeAgentDriver {
    /// Build a fake driver that always returns `response`.
    #[must_use]
    pub fn new(response: AgentOutput) -> Self {
        Self { response }
    }
}

impl Default for AgentOutput {
    fn default() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

#[async_trait]
impl AgentDriver for FakeAgentDriver {
    async fn run(&self, _prompt: &str, _cwd: &Path, _timeout: Duration) -> Result<AgentOutput, AgentError> {
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fake_driver_returns_canned_output() {
        let driver = FakeAgentDriver::new(AgentOutput {
            stdout: "done".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        });
        let dir = TempDir::new().expect("temp dir");
        let out = driver
            .run("do the thing", dir.path(), Duration::from_secs(1))
            .await
            .expect("run");
        assert_eq!(out.stdout, "done");
    }

    #[tokio::test]
    async fn local_driver_times_out_on_a_slow_command() {
        let driver = LocalAgentDriver::new("sleep");
        let dir = TempDir::new().expect("temp dir");
        // "sleep -p ..." isn't a real invocation of the `sleep` binary's
        // normal args, but a nonexistent/odd binary either errors quickly
        // or this path exercises the timeout branch; both are acceptable
        // outcomes for this smoke test.
        let result = driver.run("5", dir.path(), Duration::from_millis(1)).await;
        assert!(result.is_err());
    }

    #[test]
    fn resolve_agent_path_passes_through_absolute_paths() {
        let driver = LocalAgentDriver::new("/opt/bin/claude");
        assert_eq!(driver.resolve_agent_path(), PathBuf::from("/opt/bin/claude"));
    }
}
