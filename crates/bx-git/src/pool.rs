//! Bounded pool of linked git worktrees used as per-task execution sandboxes.
//!
//! A fixed number of worktrees (`wt-1` .. `wt-N`) are created once against
//! the primary repository, each checked out onto its own persistent branch
//! (`worktree-wt-N`). Tasks acquire a free sandbox, run inside it, and
//! release it; release runs a reset protocol that returns the sandbox to a
//! clean state on top of the integration branch tip rather than destroying
//! and recreating it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::GitError;

const STEP_TIMEOUT: Duration = Duration::from_secs(30);
const STUCK_BUSY_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// Status of a pooled sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    /// Idle and ready to be acquired.
    Free,
    /// Currently checked out to a task.
    Busy,
    /// The last reset failed; needs recovery before reuse.
    Error,
}

/// A single slot in the worktree pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    /// Slot identifier, e.g. `wt-1`.
    pub id: String,
    /// Absolute path to the worktree.
    pub path: PathBuf,
    /// The branch this worktree stays checked out to.
    pub branch: String,
    /// Current status.
    pub status: SandboxStatus,
    /// Identifier of the task currently occupying this sandbox, if any.
    pub current_task: Option<String>,
    /// When the slot was created.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the slot was last acquired.
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Health information for one sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxHealth {
    /// Slot identifier.
    pub id: String,
    /// Current status.
    pub status: SandboxStatus,
    /// Whether no issues were found.
    pub healthy: bool,
    /// Human-readable issues found, if any.
    pub issues: Vec<String>,
}

/// Error raised when no sandbox becomes free before the acquire timeout.
#[derive(Debug, thiserror::Error)]
#[error("timed out waiting for a free sandbox after {waited:?}; busy: {busy:?}")]
pub struct AcquireTimeout {
    /// How long the caller waited.
    pub waited: Duration,
    /// Ids of the sandboxes that were still busy.
    pub busy: Vec<String>,
}

/// Error raised when a sandbox can be neither reset nor recreated.
#[derive(Debug, thiserror::Error)]
#[error("failed to recover sandbox {id}: {source}")]
pub struct RecoveryFailed {
    /// The sandbox that could not be recovered.
    pub id: String,
    /// Underlying git failure.
    #[source]
    pub source: GitError,
}

struct Inner {
    main_repo: PathBuf,
    base_dir: PathBuf,
    main_branch: String,
    sandboxes: HashMap<String, Sandbox>,
}

/// A fixed-size pool of git worktrees acquired/released by workers.
pub struct WorktreePool {
    inner: Mutex<Inner>,
    size: usize,
}

impl WorktreePool {
    /// Create (but do not yet populate) a pool of `size` sandboxes rooted
    /// under `base_dir`, branching off `main_branch` of `main_repo`.
    #[must_use]
    pub fn new(main_repo: PathBuf, base_dir: PathBuf, main_branch: impl Into<String>, size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                main_repo,
                base_dir,
                main_branch: main_branch.into(),
                sandboxes: HashMap::new(),
            }),
            size,
        }
    }

    /// Create every worktree slot. Fails fast on the first failure, leaving
    /// any worktrees created so far in place (the caller is expected to call
    /// [`WorktreePool::teardown`] on error).
    ///
    /// # Errors
    ///
    /// Returns an error if any worktree or branch cannot be created.
    pub async fn initialize(&self) -> Result<(), GitError> {
        let mut inner = self.inner.lock().await;
        tokio::fs::create_dir_all(&inner.base_dir)
            .await
            .map_err(|e| GitError::WorktreeCreationFailed(e.to_string()))?;

        for i in 1..=self.size {
            let id = format!("wt-{i}");
            let sandbox = Self::create_sandbox(&inner.main_repo, &inner.base_dir, &inner.main_branch, &id).await?;
            inner.sandboxes.insert(id, sandbox);
        }
        Ok(())
    }

    async fn create_sandbox(
        main_repo: &Path,
        base_dir: &Path,
        main_branch: &str,
        id: &str,
    ) -> Result<Sandbox, GitError> {
        let path = base_dir.join(id);
        let branch = format!("worktree-{id}");

        if path.exists() {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| GitError::WorktreeCreationFailed(e.to_string()))?;
        }
        // Best-effort: an existing branch from a previous run may be stale.
        let _ = run_git(main_repo, &["branch", "-D", &branch], STEP_TIMEOUT).await;

        run_git(
            main_repo,
            &[
                "worktree",
                "add",
                path.to_str().unwrap_or_default(),
                "-b",
                &branch,
                main_branch,
            ],
            Duration::from_secs(60),
        )
        .await
        .map_err(|e| GitError::WorktreeCreationFailed(e.to_string()))?;

        Ok(Sandbox {
            id: id.to_string(),
            path,
            branch,
            status: SandboxStatus::Free,
            current_task: None,
            created_at: chrono::Utc::now(),
            last_used_at: None,
        })
    }

    /// Acquire a free sandbox for `task_id`, waiting up to `wait` for one to
    /// become free. Attempts opportunistic recovery of any `Error`-status
    /// sandboxes before giving up.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireTimeout`] if no sandbox becomes free in time.
    pub async fn acquire(&self, task_id: &str, wait: Duration) -> Result<Sandbox, AcquireTimeout> {
        let deadline = Instant::now() + wait;
        loop {
            {
                let mut inner = self.inner.lock().await;
                let (main_repo, main_branch) = (inner.main_repo.clone(), inner.main_branch.clone());

                let error_ids: Vec<String> = inner
                    .sandboxes
                    .values()
                    .filter(|s| s.status == SandboxStatus::Error)
                    .map(|s| s.id.clone())
                    .collect();
                for id in error_ids {
                    if let Some(sandbox) = inner.sandboxes.get(&id).cloned() {
                        if let Ok(recovered) =
                            Self::reset(&main_repo, &main_branch, &sandbox).await
                        {
                            inner.sandboxes.insert(id, recovered);
                        }
                    }
                }

                if let Some(free_id) = inner
                    .sandboxes
                    .values()
                    .find(|s| s.status == SandboxStatus::Free)
                    .map(|s| s.id.clone())
                {
                    let sandbox = inner.sandboxes.get_mut(&free_id).expect("checked above");
                    sandbox.status = SandboxStatus::Busy;
                    sandbox.current_task = Some(task_id.to_string());
                    sandbox.last_used_at = Some(chrono::Utc::now());
                    return Ok(sandbox.clone());
                }
            }

            if Instant::now() >= deadline {
                let inner = self.inner.lock().await;
                let busy = inner
                    .sandboxes
                    .values()
                    .filter(|s| s.status == SandboxStatus::Busy)
                    .map(|s| s.id.clone())
                    .collect();
                return Err(AcquireTimeout { waited: wait, busy });
            }

            tokio::time::sleep(Duration::from_millis(500).min(deadline - Instant::now())).await;
        }
    }

    /// Release a sandbox back to the pool, resetting it to a clean state.
    /// On reset failure the sandbox is marked `Error` instead of `Free` so
    /// future acquires skip it until recovery succeeds.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`GitError`] if the reset protocol fails. The
    /// sandbox is still marked `Error` in the pool in that case.
    pub async fn release(&self, id: &str) -> Result<(), GitError> {
        let mut inner = self.inner.lock().await;
        let (main_repo, main_branch) = (inner.main_repo.clone(), inner.main_branch.clone());
        let sandbox = inner
            .sandboxes
            .get(id)
            .cloned()
            .ok_or_else(|| GitError::NotARepo(format!("unknown sandbox: {id}")))?;

        match Self::reset(&main_repo, &main_branch, &sandbox).await {
            Ok(reset) => {
                inner.sandboxes.insert(id.to_string(), reset);
                Ok(())
            }
            Err(e) => {
                if let Some(s) = inner.sandboxes.get_mut(id) {
                    s.status = SandboxStatus::Error;
                }
                Err(e)
            }
        }
    }

    /// The reset protocol: checkout the sandbox's own branch, hard-reset to
    /// the integration branch tip, remove untracked/ignored files, and
    /// delete every other local branch the agent may have created.
    async fn reset(main_repo: &Path, main_branch: &str, sandbox: &Sandbox) -> Result<Sandbox, GitError> {
        if !sandbox.path.exists() {
            tracing::warn!(sandbox = %sandbox.id, path = %sandbox.path.display(), "worktree path missing, nothing to reset");
            let mut next = sandbox.clone();
            next.status = SandboxStatus::Free;
            next.current_task = None;
            return Ok(next);
        }
        if !sandbox.path.join(".git").exists() {
            tracing::warn!(sandbox = %sandbox.id, path = %sandbox.path.display(), "worktree has no .git entry, nothing to reset");
            let mut next = sandbox.clone();
            next.status = SandboxStatus::Free;
            next.current_task = None;
            return Ok(next);
        }

        run_git(&sandbox.path, &["checkout", "-f", &sandbox.branch], STEP_TIMEOUT).await?;
        run_git(
            &sandbox.path,
            &["reset", "--hard", &format!("origin/{main_branch}")],
            STEP_TIMEOUT,
        )
        .await?;
        run_git(&sandbox.path, &["clean", "-fd"], STEP_TIMEOUT).await?;

        let branches = run_git(main_repo, &["branch", "--list"], STEP_TIMEOUT).await?;
        for line in branches.lines() {
            let name = line.trim_start_matches('*').trim();
            if name.is_empty() || name == main_branch || name == sandbox.branch {
                continue;
            }
            let _ = run_git(main_repo, &["branch", "-D", name], STEP_TIMEOUT).await;
        }

        let mut next = sandbox.clone();
        next.status = SandboxStatus::Free;
        next.current_task = None;
        Ok(next)
    }

    /// Run a health sweep over every sandbox, flagging stuck-busy slots
    /// (busy for more than 30 minutes) and attempting recovery of any
    /// sandbox already in the `Error` state.
    pub async fn health_check(&self) -> Vec<SandboxHealth> {
        let mut inner = self.inner.lock().await;
        let (main_repo, main_branch) = (inner.main_repo.clone(), inner.main_branch.clone());
        let mut reports = Vec::new();

        let ids: Vec<String> = inner.sandboxes.keys().cloned().collect();
        for id in ids {
            let sandbox = inner.sandboxes.get(&id).expect("id from keys").clone();
            let mut issues = Vec::new();

            if !sandbox.path.exists() {
                issues.push("worktree path does not exist".to_string());
            }
            if !sandbox.path.join(".git").exists() {
                issues.push("worktree has no .git entry".to_string());
            }
            if sandbox.status == SandboxStatus::Error {
                issues.push("sandbox is in error state".to_string());
                if let Ok(recovered) = Self::reset(&main_repo, &main_branch, &sandbox).await {
                    inner.sandboxes.insert(id.clone(), recovered);
                } else {
                    issues.push("recovery attempt failed".to_string());
                }
            }
            if sandbox.status == SandboxStatus::Busy {
                if let Some(last_used) = sandbox.last_used_at {
                    let busy_for = chrono::Utc::now() - last_used;
                    if busy_for
                        > chrono::Duration::from_std(STUCK_BUSY_THRESHOLD).unwrap_or_default()
                    {
                        issues.push(format!("busy for {busy_for} — may be stuck"));
                    }
                }
            }

            reports.push(SandboxHealth {
                id,
                status: inner
                    .sandboxes
                    .get(&sandbox.id)
                    .map_or(sandbox.status, |s| s.status),
                healthy: issues.is_empty(),
                issues,
            });
        }
        reports
    }

    /// Tear down every worktree and branch. Best-effort; failures are
    /// swallowed since this is typically called during shutdown.
    pub async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        let main_repo = inner.main_repo.clone();
        for (_, sandbox) in inner.sandboxes.drain() {
            let _ = run_git(
                &main_repo,
                &["worktree", "remove", sandbox.path.to_str().unwrap_or_default(), "--force"],
                STEP_TIMEOUT,
            )
            .await;
            if sandbox.path.exists() {
                let _ = tokio::fs::remove_dir_all(&sandbox.path).await;
            }
            let _ = run_git(&main_repo, &["branch", "-D", &sandbox.branch], STEP_TIMEOUT).await;
        }
    }

    /// Number of sandboxes currently free.
    pub async fn num_free(&self) -> usize {
        self.inner
            .lock()
            .await
            .sandboxes
            .values()
            .filter(|s| s.status == SandboxStatus::Free)
            .count()
    }
}

async fn run_git(cwd: &Path, args: &[&str], step_timeout: Duration) -> Result<String, GitError> {
    let fut = Command::new("git").args(args).current_dir(cwd).output();
    let output = timeout(step_timeout, fut)
        .await
        .map_err(|_| GitError::CommandTimeout(format!("git {}", args.join(" "))))?
        .map_err(|e| GitError::CommandFailed(format!("git {}: {e}", args.join(" "))))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(GitError::CommandFailed(format!(
            "git {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) {
        StdCommand::new("git").args(["init", "-b", "main"]).current_dir(dir).output().expect("git init");
        StdCommand::new("git").args(["config", "user.email", "t@t.com"]).current_dir(dir).output().ok();
        StdCommand::new("git").args(["config", "user.name", "T"]).current_dir(dir).output().ok();
        std::fs::write(dir.join("README.md"), "# test").ok();
        StdCommand::new("git").args(["add", "-A"]).current_dir(dir).output().ok();
        StdCommand::new("git").args(["commit", "-m", "init"]).current_dir(dir).output().ok();
    }

    #[test]
    fn sandbox_status_roundtrips_through_json() {
        let json = serde_json::to_string(&SandboxStatus::Busy).expect("serialize");
        assert_eq!(json, "\"busy\"");
    }

    #[tokio::test]
    #[ignore = "requires a git worktree-capable environment and a configured origin remote"]
    async fn initialize_creates_n_free_sandboxes() {
        let repo = TempDir::new().expect("temp dir");
        init_repo(repo.path());
        let base = TempDir::new().expect("base dir");

        let pool = WorktreePool::new(repo.path().to_path_buf(), base.path().to_path_buf(), "main", 2);
        pool.initialize().await.expect("initialize");
        assert_eq!(pool.num_free().await, 2);
    }
}
