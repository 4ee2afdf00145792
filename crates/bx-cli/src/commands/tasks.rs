//! Tasks command - list a session's batches and tasks.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use bx_core::{Store, TaskStatus};
use bx_store::SqliteStore;

/// Arguments for the tasks command.
#[derive(Args)]
pub struct TasksArgs {
    /// Session ID to list tasks for.
    pub session_id: String,

    /// Restrict the listing to a single batch number.
    #[arg(long)]
    pub batch: Option<u32>,

    /// Path to a JSON config file. Defaults to `.batchexec/config.json` in
    /// the repository root.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Serialize)]
struct TaskOutput {
    number: String,
    title: String,
    status: String,
    sandbox_id: Option<String>,
    review_rounds: u32,
    pr_number: Option<u64>,
    pr_url: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct BatchTasksOutput {
    batch_number: u32,
    batch_title: String,
    tasks: Vec<TaskOutput>,
}

/// Execute the tasks command.
pub async fn execute(args: TasksArgs, json: bool) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let repo_root = bx_git::repo_root(&cwd).unwrap_or_else(|_| cwd.clone());

    let config_path = args
        .config
        .unwrap_or_else(|| repo_root.join(".batchexec").join("config.json"));
    let config = bx_core::Config::load_or_default(&config_path)?;

    let db_path = repo_root.join(&config.db_path);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path)?);

    let (_session, batches) = store.session_status(&args.session_id).await?;

    let mut output = Vec::new();
    for batch in batches.iter().filter(|b| args.batch.map_or(true, |n| n == b.number)) {
        let tasks = store.tasks_for_batch(&batch.id).await?;
        output.push(BatchTasksOutput {
            batch_number: batch.number,
            batch_title: batch.title.clone(),
            tasks: tasks
                .iter()
                .map(|t| TaskOutput {
                    number: t.number.clone(),
                    title: t.title.clone(),
                    status: task_status_str(t.status).to_string(),
                    sandbox_id: t.sandbox_id.clone(),
                    review_rounds: t.review_rounds,
                    pr_number: t.pr_number,
                    pr_url: t.pr_url.clone(),
                    error: t.error.clone(),
                })
                .collect(),
        });
    }

    if json {
        crate::commands::emit_json(&output, json);
    } else {
        for batch in &output {
            println!("Batch {}: {}", batch.batch_number, batch.batch_title);
            for task in &batch.tasks {
                let sandbox = task.sandbox_id.as_deref().unwrap_or("-");
                println!(
                    "  {:<8} {:<12} sandbox={:<8} reviews={} {}",
                    task.number, task.status, sandbox, task.review_rounds, task.title
                );
                if let Some(pr_number) = task.pr_number {
                    println!("           change request #{pr_number}");
                }
                if let Some(error) = &task.error {
                    println!("           error: {error}");
                }
            }
            println!();
        }
    }

    Ok(())
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::PrCreated => "pr_created",
        TaskStatus::Merged => "merged",
        TaskStatus::Failed => "failed",
    }
}
