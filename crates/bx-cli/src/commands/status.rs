//! Status command - show a session's status projection (§4.2).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use bx_core::{BatchStatus, Store, TaskStatus};
use bx_store::SqliteStore;

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Session ID to check status for.
    pub session_id: String,

    /// Path to a JSON config file. Defaults to `.batchexec/config.json` in
    /// the repository root.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Serialize)]
struct StatusOutput {
    session_id: String,
    status: String,
    plan_path: String,
    tasks_completed: usize,
    tasks_total: usize,
    batches: Vec<BatchStatusOutput>,
    /// Tasks holding an open change request (`pr_created` with a non-null
    /// change number).
    open_change_requests: Vec<OpenChangeOutput>,
    /// Task-level errors recorded against `failed` tasks.
    task_errors: Vec<TaskErrorOutput>,
}

#[derive(Serialize)]
struct BatchStatusOutput {
    number: u32,
    title: String,
    status: String,
}

#[derive(Serialize)]
struct OpenChangeOutput {
    task_number: String,
    pr_number: u64,
    pr_url: Option<String>,
}

#[derive(Serialize)]
struct TaskErrorOutput {
    task_number: String,
    error: String,
}

/// Execute the status command.
pub async fn execute(args: StatusArgs, json: bool) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let repo_root = bx_git::repo_root(&cwd).unwrap_or_else(|_| cwd.clone());

    let config_path = args
        .config
        .unwrap_or_else(|| repo_root.join(".batchexec").join("config.json"));
    let config = bx_core::Config::load_or_default(&config_path)?;

    let db_path = repo_root.join(&config.db_path);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path)?);

    let (session, batches) = store.session_status(&args.session_id).await?;

    let mut tasks_completed = 0usize;
    let mut tasks_total = 0usize;
    let mut open_change_requests = Vec::new();
    let mut task_errors = Vec::new();
    for batch in &batches {
        let tasks = store.tasks_for_batch(&batch.id).await?;
        tasks_total += tasks.len();
        tasks_completed += tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::PrCreated | TaskStatus::Merged))
            .count();

        for task in &tasks {
            if task.status == TaskStatus::PrCreated {
                if let Some(pr_number) = task.pr_number {
                    open_change_requests.push(OpenChangeOutput {
                        task_number: task.number.clone(),
                        pr_number,
                        pr_url: task.pr_url.clone(),
                    });
                }
            }
            if task.status == TaskStatus::Failed {
                if let Some(error) = &task.error {
                    task_errors.push(TaskErrorOutput {
                        task_number: task.number.clone(),
                        error: error.clone(),
                    });
                }
            }
        }
    }

    let output = StatusOutput {
        session_id: session.id.clone(),
        status: format!("{:?}", session.status).to_lowercase(),
        plan_path: session.plan_path.clone(),
        tasks_completed,
        tasks_total,
        batches: batches
            .iter()
            .map(|b| BatchStatusOutput {
                number: b.number,
                title: b.title.clone(),
                status: batch_status_str(b.status).to_string(),
            })
            .collect(),
        open_change_requests,
        task_errors,
    };

    if json {
        crate::commands::emit_json(&output, json);
    } else {
        println!("Session: {}", output.session_id);
        println!("Plan: {}", output.plan_path);
        println!("Status: {}", output.status);
        println!("Tasks completed: {}/{}", output.tasks_completed, output.tasks_total);
        println!();
        for batch in &output.batches {
            println!("  Batch {}: {} [{}]", batch.number, batch.title, batch.status);
        }
        if !output.open_change_requests.is_empty() {
            println!();
            println!("Open change requests:");
            for cr in &output.open_change_requests {
                println!("  Task {}: #{}", cr.task_number, cr.pr_number);
            }
        }
        if !output.task_errors.is_empty() {
            println!();
            println!("Task errors:");
            for err in &output.task_errors {
                println!("  Task {}: {}", err.task_number, err.error);
            }
        }
    }

    Ok(())
}

fn batch_status_str(status: BatchStatus) -> &'static str {
    match status {
        BatchStatus::Pending => "pending",
        BatchStatus::Ready => "ready",
        BatchStatus::Executing => "executing",
        BatchStatus::Complete => "complete",
        BatchStatus::Failed => "failed",
    }
}
