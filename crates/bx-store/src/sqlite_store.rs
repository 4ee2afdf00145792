//! [`Store`] implementation backed by a pooled SQLite connection.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bx_core::{
    Batch, BatchStatus, ExecutionMode, NewSession, Review, Session, SessionStatus, Store, StoreError, Task,
    TaskExtras, TaskResult, TaskStatus, Verdict,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::schema;

fn map_err(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// A SQLite-backed [`Store`]. Safe to share across workers: every operation
/// borrows a connection from a pool for the duration of one blocking
/// database call and returns it immediately after.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (creating if necessary) a SQLite database at `path` and run
    /// migrations against it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the file cannot be opened, the
    /// pool cannot be built, or migrations fail.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(8).build(manager).map_err(|e| StoreError::Backend(e.to_string()))?;

        let conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;
        schema::run_migrations(&conn).map_err(map_err)?;

        Ok(Self { pool })
    }

    /// Open an in-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the pool cannot be built or
    /// migrations fail.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;
        schema::run_migrations(&conn).map_err(map_err)?;
        Ok(Self { pool })
    }
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let status: String = row.get("status")?;
    let mode: String = row.get("mode")?;
    let current_batch: Option<i64> = row.get("current_batch")?;
    let auto_publish: i64 = row.get("auto_publish")?;
    Ok(Session {
        id: row.get("id")?,
        plan_path: row.get("plan_path")?,
        status: parse_session_status(&status),
        max_review_rounds: row.get("max_review_rounds")?,
        batch_lo: row.get("batch_lo")?,
        batch_hi: row.get("batch_hi")?,
        mode: parse_execution_mode(&mode),
        current_batch: current_batch.map(|n| n as u32),
        auto_publish: auto_publish != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_session_status(s: &str) -> SessionStatus {
    match s {
        "executing" => SessionStatus::Executing,
        "complete" => SessionStatus::Complete,
        "failed" => SessionStatus::Failed,
        "paused" => SessionStatus::Paused,
        _ => SessionStatus::Started,
    }
}

fn parse_execution_mode(s: &str) -> ExecutionMode {
    match s {
        "sequential" => ExecutionMode::Sequential,
        _ => ExecutionMode::Parallel,
    }
}

fn execution_mode_str(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::Sequential => "sequential",
        ExecutionMode::Parallel => "parallel",
    }
}

fn session_status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Started => "started",
        SessionStatus::Executing => "executing",
        SessionStatus::Complete => "complete",
        SessionStatus::Failed => "failed",
        SessionStatus::Paused => "paused",
    }
}

fn parse_batch_status(s: &str) -> BatchStatus {
    match s {
        "ready" => BatchStatus::Ready,
        "executing" => BatchStatus::Executing,
        "complete" => BatchStatus::Complete,
        "failed" => BatchStatus::Failed,
        _ => BatchStatus::Pending,
    }
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

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "in_progress" => TaskStatus::InProgress,
        "pr_created" => TaskStatus::PrCreated,
        "merged" => TaskStatus::Merged,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
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

fn verdict_str(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Approved => "approved",
        Verdict::ChangesRequested => "changes_requested",
    }
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let files_json: String = row.get("files_json")?;
    let verification_json: String = row.get("verification_json")?;
    let depends_on_json: String = row.get("depends_on_json")?;
    let extra_json: String = row.get("extra_json")?;
    let commits_json: String = row.get("commits_json")?;
    let pr_number: Option<i64> = row.get("pr_number")?;

    Ok(Task {
        id: row.get("id")?,
        batch_id: row.get("batch_id")?,
        number: row.get("number")?,
        title: row.get("title")?,
        status: parse_task_status(&status),
        sandbox_id: row.get("sandbox_id")?,
        review_rounds: row.get("review_rounds")?,
        pr_number: pr_number.map(|n| n as u64),
        pr_url: row.get("pr_url")?,
        commits: serde_json::from_str(&commits_json).unwrap_or_default(),
        error: row.get("error")?,
        extras: TaskExtras {
            implementation_text: row.get("implementation_text")?,
            files: serde_json::from_str(&files_json).unwrap_or_default(),
            verification_steps: serde_json::from_str(&verification_json).unwrap_or_default(),
            depends_on: serde_json::from_str(&depends_on_json).unwrap_or_default(),
            extra: serde_json::from_str(&extra_json).unwrap_or_default(),
        },
        started_at: row.get("started_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn load_batch_dependencies(conn: &Connection, session_id: &str) -> Result<HashMap<String, Vec<u32>>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT bd.batch_id, bd.depends_on_number FROM batch_dependencies bd
             JOIN batches b ON b.id = bd.batch_id WHERE b.session_id = ?1",
        )
        .map_err(map_err)?;
    let rows = stmt
        .query_map(params![session_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))
        .map_err(map_err)?;

    let mut deps: HashMap<String, Vec<u32>> = HashMap::new();
    for row in rows {
        let (batch_id, dep) = row.map_err(map_err)?;
        deps.entry(batch_id).or_default().push(dep);
    }
    Ok(deps)
}

fn row_to_batch(row: &Row, deps: &HashMap<String, Vec<u32>>) -> rusqlite::Result<Batch> {
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;
    Ok(Batch {
        dependencies: deps.get(&id).cloned().unwrap_or_default(),
        id,
        session_id: row.get("session_id")?,
        number: row.get("number")?,
        title: row.get("title")?,
        status: parse_batch_status(&status),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn start_execution(&self, new_session: NewSession) -> Result<Session, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tx = conn.transaction().map_err(map_err)?;

            let session_id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO sessions (id, plan_path, status, max_review_rounds, batch_lo, batch_hi, mode, auto_publish)
                 VALUES (?1, ?2, 'started', ?3, ?4, ?5, ?6, ?7)",
                params![
                    session_id,
                    new_session.plan_path,
                    new_session.max_review_rounds,
                    new_session.batch_lo,
                    new_session.batch_hi,
                    execution_mode_str(new_session.mode),
                    new_session.auto_publish as i64,
                ],
            )
            .map_err(map_err)?;

            for batch in &new_session.batches {
                let batch_id = uuid::Uuid::new_v4().to_string();
                let status = if batch.dependencies.is_empty() { "ready" } else { "pending" };
                tx.execute(
                    "INSERT INTO batches (id, session_id, number, title, status) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![batch_id, session_id, batch.number, batch.title, status],
                )
                .map_err(map_err)?;

                for dep in &batch.dependencies {
                    tx.execute(
                        "INSERT INTO batch_dependencies (batch_id, depends_on_number) VALUES (?1, ?2)",
                        params![batch_id, dep],
                    )
                    .map_err(map_err)?;
                }

                for (seq, task) in batch.tasks.iter().enumerate() {
                    let task_id = uuid::Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO tasks (
                            id, batch_id, seq, number, title, status,
                            implementation_text, files_json, verification_json, depends_on_json, extra_json
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?10)",
                        params![
                            task_id,
                            batch_id,
                            i64::try_from(seq).unwrap_or(i64::MAX),
                            task.number,
                            task.title,
                            task.extras.implementation_text,
                            serde_json::to_string(&task.extras.files).unwrap_or_else(|_| "[]".to_string()),
                            serde_json::to_string(&task.extras.verification_steps).unwrap_or_else(|_| "[]".to_string()),
                            serde_json::to_string(&task.extras.depends_on).unwrap_or_else(|_| "[]".to_string()),
                            serde_json::to_string(&task.extras.extra).unwrap_or_else(|_| "{}".to_string()),
                        ],
                    )
                    .map_err(map_err)?;
                }
            }

            let session = tx
                .query_row("SELECT * FROM sessions WHERE id = ?1", params![session_id], row_to_session)
                .map_err(map_err)?;

            tx.commit().map_err(map_err)?;
            Ok(session)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    async fn ready_batches(&self, session_id: &str) -> Result<Vec<Batch>, StoreError> {
        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;

            conn.execute(
                "UPDATE batches SET status = 'ready', updated_at = datetime('now')
                 WHERE session_id = ?1 AND status = 'pending' AND NOT EXISTS (
                     SELECT 1 FROM batch_dependencies bd
                     JOIN batches dep ON dep.session_id = batches.session_id AND dep.number = bd.depends_on_number
                     WHERE bd.batch_id = batches.id AND dep.status != 'complete'
                 )",
                params![session_id],
            )
            .map_err(map_err)?;

            let deps = load_batch_dependencies(&conn, &session_id)?;
            let mut stmt = conn
                .prepare("SELECT * FROM batches WHERE session_id = ?1 AND status = 'ready' ORDER BY number")
                .map_err(map_err)?;
            let batches = stmt
                .query_map(params![session_id], |row| row_to_batch(row, &deps))
                .map_err(map_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err)?;
            Ok(batches)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    async fn mark_batch_executing(&self, batch_id: &str) -> Result<(), StoreError> {
        self.set_batch_status(batch_id, BatchStatus::Executing).await
    }

    async fn mark_batch_complete(&self, batch_id: &str) -> Result<(), StoreError> {
        self.set_batch_status(batch_id, BatchStatus::Complete).await
    }

    async fn mark_batch_failed(&self, batch_id: &str) -> Result<(), StoreError> {
        self.set_batch_status(batch_id, BatchStatus::Failed).await
    }

    async fn claim_next_task(&self, session_id: &str, sandbox_id: &str) -> Result<Option<Task>, StoreError> {
        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        let sandbox_id = sandbox_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;

            let mut stmt = conn
                .prepare(
                    "UPDATE tasks SET status = 'in_progress', sandbox_id = ?1,
                        started_at = datetime('now'), updated_at = datetime('now')
                     WHERE id = (
                         SELECT t.id FROM tasks t
                         JOIN batches b ON b.id = t.batch_id
                         WHERE b.session_id = ?2 AND b.status = 'executing' AND t.status = 'pending'
                         ORDER BY t.seq
                         LIMIT 1
                     )
                     RETURNING *",
                )
                .map_err(map_err)?;

            stmt.query_row(params![sandbox_id, session_id], row_to_task)
                .optional()
                .map_err(map_err)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    async fn mark_task_result(&self, task_id: &str, result: TaskResult) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;
            let clear_sandbox = matches!(result.status, TaskStatus::Merged | TaskStatus::Failed);
            let pr_number = result.pr_number.map(|n| n as i64);
            let commits_json = serde_json::to_string(&result.commits).unwrap_or_else(|_| "[]".to_string());
            if clear_sandbox {
                conn.execute(
                    "UPDATE tasks SET status = ?1, sandbox_id = NULL, pr_number = ?2, pr_url = ?3,
                        commits_json = ?4, error = ?5, updated_at = datetime('now') WHERE id = ?6",
                    params![
                        task_status_str(result.status),
                        pr_number,
                        result.pr_url,
                        commits_json,
                        result.error,
                        task_id,
                    ],
                )
            } else {
                conn.execute(
                    "UPDATE tasks SET status = ?1, pr_number = ?2, pr_url = ?3, commits_json = ?4,
                        error = ?5, updated_at = datetime('now') WHERE id = ?6",
                    params![
                        task_status_str(result.status),
                        pr_number,
                        result.pr_url,
                        commits_json,
                        result.error,
                        task_id,
                    ],
                )
            }
            .map_err(map_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    async fn record_review(&self, review: Review) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tx = conn.transaction().map_err(map_err)?;

            tx.execute(
                "INSERT INTO reviews (id, task_id, round, verdict, notes) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![review.id, review.task_id, review.round, verdict_str(review.verdict), review.notes],
            )
            .map_err(map_err)?;

            tx.execute(
                "UPDATE tasks SET review_rounds = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![review.round, review.task_id],
            )
            .map_err(map_err)?;

            tx.commit().map_err(map_err)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    async fn session_status(&self, session_id: &str) -> Result<(Session, Vec<Batch>), StoreError> {
        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;

            let session = conn
                .query_row("SELECT * FROM sessions WHERE id = ?1", params![session_id], row_to_session)
                .optional()
                .map_err(map_err)?
                .ok_or_else(|| StoreError::NotFound(session_id.clone()))?;

            let deps = load_batch_dependencies(&conn, &session_id)?;
            let mut stmt = conn
                .prepare("SELECT * FROM batches WHERE session_id = ?1 ORDER BY number")
                .map_err(map_err)?;
            let batches = stmt
                .query_map(params![session_id], |row| row_to_batch(row, &deps))
                .map_err(map_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err)?;

            Ok((session, batches))
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    async fn tasks_for_batch(&self, batch_id: &str) -> Result<Vec<Task>, StoreError> {
        let pool = self.pool.clone();
        let batch_id = batch_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT * FROM tasks WHERE batch_id = ?1 ORDER BY seq")
                .map_err(map_err)?;
            stmt.query_map(params![batch_id], row_to_task)
                .map_err(map_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }
}

impl SqliteStore {
    async fn set_batch_status(&self, batch_id: &str, status: BatchStatus) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let batch_id = batch_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Backend(e.to_string()))?;
            conn.execute(
                "UPDATE batches SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![batch_status_str(status), batch_id],
            )
            .map_err(map_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_core::parse_plan;

    const PLAN: &str = "## Batch 1: x\n\n### Task 1.1: a\n\nbody\n\n## Batch 2: y\n\n**Dependencies:** batch 1\n\n### Task 2.1: b\n\nbody\n";

    fn new_session() -> NewSession {
        let batches = parse_plan(PLAN).expect("parse");
        NewSession {
            plan_path: "PLAN.md".to_string(),
            max_review_rounds: 3,
            batches,
            batch_lo: 1,
            batch_hi: u32::MAX,
            mode: ExecutionMode::Parallel,
            auto_publish: false,
        }
    }

    #[tokio::test]
    async fn start_execution_marks_dependency_free_batches_ready() {
        let store = SqliteStore::open_in_memory().expect("open");
        let session = store.start_execution(new_session()).await.expect("start");
        let (_s, batches) = store.session_status(&session.id).await.expect("status");
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].status, BatchStatus::Ready);
        assert_eq!(batches[1].status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn claim_next_task_is_exclusive_and_respects_batch_gating() {
        let store = SqliteStore::open_in_memory().expect("open");
        let session = store.start_execution(new_session()).await.expect("start");
        let (_s, batches) = store.session_status(&session.id).await.expect("status");
        let ready_batch = &batches[0];

        // Not executing yet: nothing claimable.
        assert!(store.claim_next_task(&session.id, "wt-1").await.expect("claim").is_none());

        store.mark_batch_executing(&ready_batch.id).await.expect("mark executing");

        let claimed = store.claim_next_task(&session.id, "wt-1").await.expect("claim").expect("some task");
        assert_eq!(claimed.status, TaskStatus::InProgress);

        // Second claim finds nothing: the batch had exactly one task.
        assert!(store.claim_next_task(&session.id, "wt-2").await.expect("claim").is_none());
    }

    #[tokio::test]
    async fn ready_batches_promotes_batch_two_once_batch_one_completes() {
        let store = SqliteStore::open_in_memory().expect("open");
        let session = store.start_execution(new_session()).await.expect("start");
        let (_s, batches) = store.session_status(&session.id).await.expect("status");
        let batch_one = batches.iter().find(|b| b.number == 1).expect("batch 1");

        store.mark_batch_complete(&batch_one.id).await.expect("complete");
        let ready = store.ready_batches(&session.id).await.expect("ready");
        assert!(ready.iter().any(|b| b.number == 2));
    }
}
