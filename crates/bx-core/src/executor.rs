//! Task execution (§4.5): builds a prompt from a task's parsed payload,
//! runs it through the agent driver inside an acquired sandbox, and — when
//! changes were made — commits, pushes, and opens (or reuses) a change
//! request.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bx_agent::AgentDriver;
use bx_git::{BranchManager, DefaultDiffGenerator, DiffGenerator, DiffStat, GitBranchManager};

use crate::forge::{ChangeRequest, ForgeClient, MergeMethod};
use crate::task::Task;
use crate::ExecError;

/// Outcome of running one task to completion.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Whether the agent produced any working-tree changes.
    pub changed: bool,
    /// Branch the changes were committed to.
    pub branch_name: String,
    /// Diff statistics for the commit, if any changes were made.
    pub diff_stat: Option<DiffStat>,
    /// The change request opened or reused, if forge publishing ran.
    pub change_request: Option<ChangeRequest>,
    /// Whether the change request was merged.
    pub merged: bool,
    /// Commit identifiers produced for this task, in order.
    pub commits: Vec<String>,
    /// Combined stdout+stderr from the agent invocation, truncated for
    /// storage on the task record.
    pub agent_output: String,
}

/// Drives one task's execution inside an already-acquired sandbox.
pub struct TaskExecutor {
    agent: Arc<dyn AgentDriver>,
    forge: Option<Arc<dyn ForgeClient>>,
    main_repo: std::path::PathBuf,
    main_branch: String,
    task_timeout: Duration,
    skip_external_side_effects: bool,
    auto_merge: bool,
}

impl TaskExecutor {
    /// Build a task executor.
    #[must_use]
    pub fn new(
        agent: Arc<dyn AgentDriver>,
        forge: Option<Arc<dyn ForgeClient>>,
        main_repo: std::path::PathBuf,
        main_branch: impl Into<String>,
        task_timeout: Duration,
        skip_external_side_effects: bool,
        auto_merge: bool,
    ) -> Self {
        Self {
            agent,
            forge,
            main_repo,
            main_branch: main_branch.into(),
            task_timeout,
            skip_external_side_effects,
            auto_merge,
        }
    }

    /// Run `task` inside the working tree at `sandbox_path`, checked out on
    /// `sandbox_branch`, naming the published branch `branch_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] if the agent cannot be invoked, the commit/push
    /// fails, or publishing to the forge fails.
    pub async fn run_task(
        &self,
        task: &Task,
        sandbox_path: &Path,
        batch_number: u32,
        branch_name: &str,
    ) -> Result<ExecutionOutcome, ExecError> {
        let prompt = build_prompt(batch_number, task);

        let agent_output = self.agent.run(&prompt, sandbox_path, self.task_timeout).await?;

        let changed = working_tree_has_changes(sandbox_path)?;
        if !changed {
            // No diff is still a successful run (§4.5 step 4): the task has
            // nothing to publish, not an error.
            return Ok(ExecutionOutcome {
                changed: false,
                branch_name: branch_name.to_string(),
                diff_stat: None,
                change_request: None,
                merged: false,
                commits: Vec::new(),
                agent_output: agent_output.combined(),
            });
        }

        let diff_stat = DefaultDiffGenerator::new()
            .diffstat(sandbox_path)
            .map_err(ExecError::Branch)?;

        let branch_manager = GitBranchManager::new(&self.main_repo);
        let commit = branch_manager
            .create_from_worktree(sandbox_path, branch_name, true)
            .map_err(ExecError::Branch)?;

        if self.skip_external_side_effects {
            return Ok(ExecutionOutcome {
                changed: true,
                branch_name: branch_name.to_string(),
                diff_stat: Some(diff_stat),
                change_request: None,
                merged: false,
                commits: vec![commit],
                agent_output: agent_output.combined(),
            });
        }

        branch_manager
            .push(branch_name, "origin", true)
            .map_err(ExecError::Branch)?;

        let (change_request, merged) = if let Some(forge) = &self.forge {
            let existing = forge
                .list_open_change_requests(branch_name)
                .await
                .map_err(|e| ExecError::Publish(e.to_string()))?;

            let cr = if let Some(cr) = existing.into_iter().next() {
                cr
            } else {
                forge
                    .create_change_request(
                        &format!("Task {}: {}", task.number, task.title),
                        &prompt,
                        branch_name,
                        &self.main_branch,
                    )
                    .await
                    .map_err(|e| ExecError::Publish(e.to_string()))?
            };

            let merged = if self.auto_merge {
                let result = forge
                    .merge_change_request(cr.number, MergeMethod::Squash)
                    .await
                    .map_err(|e| ExecError::Publish(e.to_string()))?;
                if result.merged {
                    let _ = forge.delete_branch_ref(branch_name).await;
                }
                result.merged
            } else {
                false
            };

            (Some(cr), merged)
        } else {
            (None, false)
        };

        Ok(ExecutionOutcome {
            changed: true,
            branch_name: branch_name.to_string(),
            diff_stat: Some(diff_stat),
            change_request,
            merged,
            commits: vec![commit],
            agent_output: agent_output.combined(),
        })
    }
}

/// Build the exact prompt structure the agent is invoked with: title,
/// files, implementation, and a fixed verification/instructions footer.
#[must_use]
pub fn build_prompt(batch_number: u32, task: &Task) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Task {}: {}\n\n", task.number, task.title));
    out.push_str(&format!("Batch: {batch_number}\n\n"));

    if !task.extras.files.is_empty() {
        out.push_str("## Files to modify\n\n");
        for f in &task.extras.files {
            out.push_str(&format!("- {f}\n"));
        }
        out.push('\n');
    }

    out.push_str("## Implementation\n\n");
    out.push_str(&task.extras.implementation_text);
    out.push_str("\n\n");

    out.push_str("## Verification\n\n");
    out.push_str("After completing, run these commands to verify:\n\n");
    for step in &task.extras.verification_steps {
        out.push_str(&format!("- {step}\n"));
    }
    out.push('\n');

    out.push_str("## Instructions\n\n");
    out.push_str("1. Implement the changes described above\n");
    out.push_str("2. Ensure all tests pass\n");
    out.push_str("3. Follow existing code patterns\n");
    out.push_str("4. Do not modify unrelated files\n");

    out
}

fn working_tree_has_changes(path: &Path) -> Result<bool, ExecError> {
    let output = std::process::Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(path)
        .output()
        .map_err(|e| ExecError::Vcs(e.to_string()))?;
    Ok(!output.stdout.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskExtras, TaskStatus};

    fn sample_task() -> Task {
        Task {
            id: "t-1".to_string(),
            batch_id: "b-1".to_string(),
            number: "1.1".to_string(),
            title: "Add config loader".to_string(),
            status: TaskStatus::Pending,
            sandbox_id: None,
            review_rounds: 0,
            pr_number: None,
            pr_url: None,
            commits: Vec::new(),
            error: None,
            extras: TaskExtras {
                implementation_text: "Add a Config struct.".to_string(),
                files: vec!["src/config.rs".to_string()],
                verification_steps: vec!["cargo test".to_string()],
                depends_on: vec![],
                extra: serde_json::Map::new(),
            },
            started_at: None,
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn build_prompt_includes_title_files_and_instructions() {
        let prompt = build_prompt(1, &sample_task());
        assert!(prompt.contains("# Task 1.1: Add config loader"));
        assert!(prompt.contains("- src/config.rs"));
        assert!(prompt.contains("Add a Config struct."));
        assert!(prompt.contains("## Instructions"));
    }
}
