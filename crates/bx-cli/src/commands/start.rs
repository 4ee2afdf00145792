//! Start command - parse a plan document and run it to completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde::Serialize;

use bx_agent::LocalAgentDriver;
use bx_core::{Config, ExecutionMode, ForgeClient, Orchestrator, Store, TaskExecutor, Worker, WorkerStep};
use bx_forge::GithubForgeClient;
use bx_git::WorktreePool;
use bx_metrics::{DefaultMetricsCollector, FileMetricsStorage, MetricsCollector, MetricsStorage};
use bx_store::SqliteStore;

/// Arguments for the start command.
#[derive(Args)]
pub struct StartArgs {
    /// Path to the plan document.
    pub plan: PathBuf,

    /// Path to a JSON config file. Defaults to `.batchexec/config.json` in
    /// the repository root.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip pushing branches and opening change requests, overriding the
    /// config file.
    #[arg(long)]
    pub skip_external_side_effects: bool,

    /// Merge change requests automatically once opened.
    #[arg(long)]
    pub auto_merge: bool,

    /// Lowest batch number to execute, inclusive.
    #[arg(long, default_value_t = 1)]
    pub lo: u32,

    /// Highest batch number to execute, inclusive.
    #[arg(long, default_value_t = u32::MAX)]
    pub hi: u32,

    /// Sequential or parallel batch dispatch.
    #[arg(long, default_value = "parallel")]
    pub mode: String,
}

#[derive(Serialize)]
struct StartOutput {
    session_id: String,
    status: String,
    batches: usize,
}

/// Execute the start command.
pub async fn execute(args: StartArgs, json: bool) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let repo_root = bx_git::repo_root(&cwd).unwrap_or_else(|_| cwd.clone());

    let config_path = args
        .config
        .unwrap_or_else(|| repo_root.join(".batchexec").join("config.json"));
    let mut config = Config::load_or_default(&config_path)?;
    if args.skip_external_side_effects {
        config.skip_external_side_effects = true;
    }

    let db_path = repo_root.join(&config.db_path);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path)?);
    let orchestrator = Orchestrator::new(store.clone());

    let plan_text = std::fs::read_to_string(&args.plan)?;
    let plan_path_str = args.plan.display().to_string();

    let mode = match args.mode.as_str() {
        "sequential" => ExecutionMode::Sequential,
        _ => ExecutionMode::Parallel,
    };

    let session = orchestrator
        .start_execution(
            &plan_path_str,
            &plan_text,
            config.max_review_rounds,
            args.lo,
            args.hi,
            mode,
            args.auto_merge,
        )
        .await?;

    tracing::info!(session_id = %session.id, "session started");

    let sandbox_dir = repo_root.join(".batchexec").join("sandboxes").join(&session.id);
    let pool = Arc::new(WorktreePool::new(
        repo_root.clone(),
        sandbox_dir,
        config.main_branch.clone(),
        config.pool_size,
    ));
    pool.initialize().await?;

    let agent = Arc::new(LocalAgentDriver::new(config.agent_binary.clone()));
    let forge = build_forge_client(&config)?;

    let executor = Arc::new(TaskExecutor::new(
        agent,
        forge,
        repo_root.clone(),
        config.main_branch.clone(),
        Duration::from_secs(config.task_timeout_secs),
        config.skip_external_side_effects,
        args.auto_merge,
    ));

    let worker = Arc::new(Worker::new(
        store.clone(),
        pool.clone(),
        executor,
        Duration::from_secs(config.sandbox_acquire_timeout_secs),
    ));

    let metrics_collector = DefaultMetricsCollector::new();
    metrics_collector.start_session(&session.id, &plan_path_str);

    let final_status = run_to_completion(&orchestrator, &store, worker, &session.id, config.pool_size).await?;

    let metrics = metrics_collector.finish_session(final_status == bx_core::SessionStatus::Complete);
    let storage = FileMetricsStorage::new(repo_root.join(".batchexec"));
    if let Err(e) = storage.save(&metrics) {
        tracing::warn!(error = %e, "failed to persist session metrics");
    }

    pool.teardown().await;

    let (_, batches) = store.session_status(&session.id).await?;

    if json {
        crate::commands::emit_json(
            &StartOutput {
                session_id: session.id.clone(),
                status: session_status_str(final_status).to_string(),
                batches: batches.len(),
            },
            json,
        );
    } else {
        println!("Session {} finished: {}", session.id, session_status_str(final_status));
        println!("Batches: {}", batches.len());
        println!("Elapsed: {}", bx_metrics::format_ms(metrics.total_time_ms));
    }

    if final_status == bx_core::SessionStatus::Failed {
        std::process::exit(1);
    }

    Ok(())
}

fn session_status_str(status: bx_core::SessionStatus) -> &'static str {
    use bx_core::SessionStatus::{Complete, Executing, Failed, Paused, Started};
    match status {
        Started => "started",
        Executing => "executing",
        Complete => "complete",
        Failed => "failed",
        Paused => "paused",
    }
}

fn build_forge_client(config: &Config) -> anyhow::Result<Option<Arc<dyn ForgeClient>>> {
    if config.skip_external_side_effects {
        return Ok(None);
    }

    let owner = std::env::var("BX_FORGE_OWNER");
    let repo = std::env::var("BX_FORGE_REPO");
    let token = std::env::var("BX_FORGE_TOKEN");

    match (owner, repo, token) {
        (Ok(owner), Ok(repo), Ok(token)) => {
            let client = GithubForgeClient::new(owner, repo, token)?;
            Ok(Some(Arc::new(client) as Arc<dyn ForgeClient>))
        }
        _ => {
            tracing::warn!(
                "BX_FORGE_OWNER/BX_FORGE_REPO/BX_FORGE_TOKEN not fully set; change requests will not be published"
            );
            Ok(None)
        }
    }
}

/// Runs workers against `session_id` until every batch reaches a terminal
/// state, promoting ready batches and reconciling executing ones as tasks
/// complete.
async fn run_to_completion(
    orchestrator: &Orchestrator,
    store: &Arc<dyn Store>,
    worker: Arc<Worker>,
    session_id: &str,
    pool_size: usize,
) -> anyhow::Result<bx_core::SessionStatus> {
    let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut handles = Vec::with_capacity(pool_size);
    for i in 0..pool_size {
        let worker = worker.clone();
        let session_id = session_id.to_string();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            let sandbox_hint = format!("worker-{i}");
            while !shutdown.load(std::sync::atomic::Ordering::Relaxed) {
                match worker.step(&session_id, &sandbox_hint).await {
                    Ok(WorkerStep::Idle) => {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                    }
                    Ok(WorkerStep::Ran { task_id, status }) => {
                        tracing::info!(task_id, ?status, "task finished");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, code = e.code(), "worker step failed");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }));
    }

    let final_status = loop {
        let ready = orchestrator.advance_ready_batches(session_id).await?;
        for batch_id in &ready {
            orchestrator.mark_batch_executing(batch_id).await?;
        }

        let (_, batches) = store.session_status(session_id).await?;
        for batch in batches.iter().filter(|b| b.status == bx_core::BatchStatus::Executing) {
            orchestrator.reconcile_batch(&batch.id).await?;
        }

        let status = orchestrator.session_status(session_id).await?;
        if status.is_terminal() {
            break status;
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    };

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    for handle in handles {
        let _ = handle.await;
    }

    Ok(final_status)
}
