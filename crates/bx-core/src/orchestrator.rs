//! Batch-level scheduling (§4.2): turns a parsed plan into a session, and
//! promotes batches from `pending` to `ready` to `executing` to
//! `complete`/`failed` as their tasks resolve.

use std::sync::Arc;

use crate::batch::BatchStatus;
use crate::plan_parser::parse_plan;
use crate::session::{ExecutionMode, Session, SessionStatus};
use crate::store::{NewSession, Store};
use crate::{CoreError, OrchestratorError};

/// Coordinates session/batch lifecycle against a [`Store`]. Holds no
/// mutable state of its own — every operation round-trips through the
/// store so multiple orchestrator instances (e.g. one per worker, or a CLI
/// invocation and a long-running daemon) stay consistent.
pub struct Orchestrator {
    store: Arc<dyn Store>,
}

impl Orchestrator {
    /// Build an orchestrator against the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Parse `plan_text`, filter its batches to the inclusive range
    /// `[lo, hi]`, and persist the result as a new session (§4.2
    /// `StartExecution`).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Plan`] if the document can't be parsed, or
    /// [`CoreError::Orchestrator`] wrapping [`OrchestratorError::EmptyRange`]
    /// if parsing produced zero batches, or if the range filter admits none
    /// of the batches that were parsed.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_execution(
        &self,
        plan_path: &str,
        plan_text: &str,
        max_review_rounds: u32,
        lo: u32,
        hi: u32,
        mode: ExecutionMode,
        auto_publish: bool,
    ) -> Result<Session, CoreError> {
        let batches = parse_plan(plan_text)?;
        if batches.is_empty() {
            return Err(OrchestratorError::EmptyRange.into());
        }

        let batches: Vec<_> = batches.into_iter().filter(|b| b.number >= lo && b.number <= hi).collect();
        if batches.is_empty() {
            return Err(OrchestratorError::EmptyRange.into());
        }

        tracing::info!(plan_path, batches = batches.len(), lo, hi, ?mode, "starting execution for plan");

        let session = self
            .store
            .start_execution(NewSession {
                plan_path: plan_path.to_string(),
                max_review_rounds,
                batches,
                batch_lo: lo,
                batch_hi: hi,
                mode,
                auto_publish,
            })
            .await
            .map_err(OrchestratorError::from)?;

        Ok(session)
    }

    /// Promote every batch in `session_id` whose dependencies are satisfied
    /// from `pending` to `ready`, returning the ids that became ready.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] on a backend failure.
    pub async fn advance_ready_batches(&self, session_id: &str) -> Result<Vec<String>, OrchestratorError> {
        let ready = self.store.ready_batches(session_id).await?;
        for batch in &ready {
            tracing::info!(session_id, batch = batch.number, "batch ready");
        }
        Ok(ready.into_iter().map(|b| b.id).collect())
    }

    /// Mark a batch as executing (the first task claimed within it calls
    /// this).
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] on a backend failure.
    pub async fn mark_batch_executing(&self, batch_id: &str) -> Result<(), OrchestratorError> {
        self.store.mark_batch_executing(batch_id).await?;
        Ok(())
    }

    /// Check whether every task in a batch reached a successful terminal
    /// status (`pr_created` or `merged`), and if so mark the batch
    /// `complete`; if any task is `failed`, mark the batch `failed`. A
    /// merge is an optional follow-on to publishing, not a precondition of
    /// the batch's own completion.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] on a backend failure.
    pub async fn reconcile_batch(&self, batch_id: &str) -> Result<BatchStatus, OrchestratorError> {
        let tasks = self.store.tasks_for_batch(batch_id).await?;
        use crate::task::TaskStatus;

        if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
            self.store.mark_batch_failed(batch_id).await?;
            return Ok(BatchStatus::Failed);
        }
        if !tasks.is_empty()
            && tasks
                .iter()
                .all(|t| matches!(t.status, TaskStatus::PrCreated | TaskStatus::Merged))
        {
            self.store.mark_batch_complete(batch_id).await?;
            return Ok(BatchStatus::Complete);
        }
        Ok(BatchStatus::Executing)
    }

    /// Derive session-level status from its batches: `complete` if every
    /// batch is complete, `failed` if any batch is failed, else
    /// `executing`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] if the session does not exist.
    pub async fn session_status(&self, session_id: &str) -> Result<SessionStatus, OrchestratorError> {
        let (_session, batches) = self.store.session_status(session_id).await?;
        if batches.iter().any(|b| b.status == BatchStatus::Failed) {
            return Ok(SessionStatus::Failed);
        }
        if !batches.is_empty() && batches.iter().all(|b| b.status == BatchStatus::Complete) {
            return Ok(SessionStatus::Complete);
        }
        Ok(SessionStatus::Executing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::review::Review;
    use crate::store::StoreError;
    use crate::task::Task;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        sessions: Mutex<HashMap<String, (Session, Vec<Batch>)>>,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn start_execution(&self, new_session: NewSession) -> Result<Session, StoreError> {
            let session = Session::new("s-1", new_session.plan_path, new_session.max_review_rounds);
            let batches: Vec<Batch> = new_session
                .batches
                .iter()
                .map(|b| Batch {
                    id: format!("b-{}", b.number),
                    session_id: session.id.clone(),
                    number: b.number,
                    title: b.title.clone(),
                    dependencies: b.dependencies.clone(),
                    status: if b.dependencies.is_empty() {
                        crate::batch::BatchStatus::Ready
                    } else {
                        crate::batch::BatchStatus::Pending
                    },
                })
                .collect();
            self.sessions
                .lock()
                .expect("lock")
                .insert(session.id.clone(), (session.clone(), batches));
            Ok(session)
        }

        async fn ready_batches(&self, session_id: &str) -> Result<Vec<Batch>, StoreError> {
            let sessions = self.sessions.lock().expect("lock");
            let (_s, batches) = sessions.get(session_id).ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
            Ok(batches
                .iter()
                .filter(|b| b.status == crate::batch::BatchStatus::Ready)
                .cloned()
                .collect())
        }

        async fn mark_batch_executing(&self, _batch_id: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn mark_batch_complete(&self, _batch_id: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn mark_batch_failed(&self, _batch_id: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn claim_next_task(&self, _session_id: &str, _sandbox_id: &str) -> Result<Option<Task>, StoreError> {
            Ok(None)
        }
        async fn mark_task_result(&self, _task_id: &str, _result: crate::store::TaskResult) -> Result<(), StoreError> {
            Ok(())
        }
        async fn record_review(&self, _review: Review) -> Result<(), StoreError> {
            Ok(())
        }
        async fn session_status(&self, session_id: &str) -> Result<(Session, Vec<Batch>), StoreError> {
            self.sessions
                .lock()
                .expect("lock")
                .get(session_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
        }
        async fn tasks_for_batch(&self, _batch_id: &str) -> Result<Vec<Task>, StoreError> {
            Ok(Vec::new())
        }
    }

    const PLAN: &str = "## Batch 1: only\n\n### Task 1.1: do it\n\nbody\n";

    #[tokio::test]
    async fn start_execution_rejects_a_planless_document() {
        let orchestrator = Orchestrator::new(Arc::new(FakeStore::default()));
        let result = orchestrator
            .start_execution("PLAN.md", "no batches", 3, 1, u32::MAX, ExecutionMode::Parallel, false)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn start_execution_persists_a_session_with_ready_batches() {
        let orchestrator = Orchestrator::new(Arc::new(FakeStore::default()));
        let session = orchestrator
            .start_execution("PLAN.md", PLAN, 3, 1, u32::MAX, ExecutionMode::Parallel, false)
            .await
            .expect("start");
        let ready = orchestrator.advance_ready_batches(&session.id).await.expect("ready");
        assert_eq!(ready.len(), 1);
    }

    #[tokio::test]
    async fn start_execution_rejects_a_range_that_admits_no_batches() {
        let orchestrator = Orchestrator::new(Arc::new(FakeStore::default()));
        let result = orchestrator
            .start_execution("PLAN.md", PLAN, 3, 5, 10, ExecutionMode::Parallel, false)
            .await;
        assert!(result.is_err());
    }
}
