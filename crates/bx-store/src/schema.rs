//! Schema migrations, applied once per connection pool at startup.

use rusqlite::Connection;

/// Create every table and index if they don't already exist.
///
/// # Errors
///
/// Returns a [`rusqlite::Error`] if any statement fails.
pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            plan_path TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'started'
                CHECK (status IN ('started', 'executing', 'complete', 'failed', 'paused')),
            max_review_rounds INTEGER NOT NULL,
            batch_lo INTEGER NOT NULL DEFAULT 1,
            batch_hi INTEGER NOT NULL DEFAULT 2147483647,
            mode TEXT NOT NULL DEFAULT 'parallel' CHECK (mode IN ('sequential', 'parallel')),
            current_batch INTEGER,
            auto_publish INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS batches (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            number INTEGER NOT NULL,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'ready', 'executing', 'complete', 'failed')),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (session_id, number)
        );

        CREATE TABLE IF NOT EXISTS batch_dependencies (
            batch_id TEXT NOT NULL REFERENCES batches(id) ON DELETE CASCADE,
            depends_on_number INTEGER NOT NULL,
            PRIMARY KEY (batch_id, depends_on_number)
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batches(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            number TEXT NOT NULL,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in_progress', 'pr_created', 'merged', 'failed')),
            sandbox_id TEXT,
            review_rounds INTEGER NOT NULL DEFAULT 0,
            pr_number INTEGER,
            pr_url TEXT,
            commits_json TEXT NOT NULL DEFAULT '[]',
            error TEXT,
            implementation_text TEXT NOT NULL DEFAULT '',
            files_json TEXT NOT NULL DEFAULT '[]',
            verification_json TEXT NOT NULL DEFAULT '[]',
            depends_on_json TEXT NOT NULL DEFAULT '[]',
            extra_json TEXT NOT NULL DEFAULT '{}',
            started_at TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS reviews (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            round INTEGER NOT NULL,
            verdict TEXT NOT NULL CHECK (verdict IN ('approved', 'changes_requested')),
            notes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_batches_session_status ON batches(session_id, status);
        CREATE INDEX IF NOT EXISTS idx_tasks_batch_seq ON tasks(batch_id, seq);
        CREATE INDEX IF NOT EXISTS idx_tasks_claimable ON tasks(batch_id, status);
        CREATE INDEX IF NOT EXISTS idx_reviews_task ON reviews(task_id);
        ",
    )
}
