//! Exercises P2 (dependency respected) and P6 (session totals) against the
//! real SQLite-backed store, following §8 scenario 2: a second batch must
//! not admit any task into `in_progress` until every task in the batch it
//! depends on reaches a successful terminal status.

use bx_core::{
    ExecutionMode, NewSession, Orchestrator, ParsedBatch, ParsedTask, Store, TaskExtras, TaskResult, TaskStatus,
};
use bx_store::SqliteStore;
use std::sync::Arc;

fn two_dependent_batches() -> NewSession {
    NewSession {
        plan_path: "PLAN.md".to_string(),
        max_review_rounds: 3,
        batches: vec![
            ParsedBatch {
                number: 1,
                title: "Bootstrap".to_string(),
                dependencies: vec![],
                tasks: vec![ParsedTask {
                    number: "1.1".to_string(),
                    title: "Add config loader".to_string(),
                    extras: TaskExtras::default(),
                }],
            },
            ParsedBatch {
                number: 2,
                title: "Wire it up".to_string(),
                dependencies: vec![1],
                tasks: vec![ParsedTask {
                    number: "2.1".to_string(),
                    title: "Use the loader".to_string(),
                    extras: TaskExtras::default(),
                }],
            },
        ],
        batch_lo: 1,
        batch_hi: u32::MAX,
        mode: ExecutionMode::Parallel,
        auto_publish: false,
    }
}

fn tasks_completed(tasks: &[bx_core::Task]) -> usize {
    tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::PrCreated | TaskStatus::Merged))
        .count()
}

#[tokio::test]
async fn batch_two_stays_blocked_until_batch_one_tasks_finish() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().expect("open"));
    let orchestrator = Orchestrator::new(store.clone());

    let session = store.start_execution(two_dependent_batches()).await.expect("start");

    let ready = orchestrator.advance_ready_batches(&session.id).await.expect("ready");
    assert_eq!(ready.len(), 1, "only batch 1 should be ready at the outset");

    let (_s, batches) = store.session_status(&session.id).await.expect("status");
    let batch_one = batches.iter().find(|b| b.number == 1).expect("batch 1");
    let batch_two = batches.iter().find(|b| b.number == 2).expect("batch 2");

    orchestrator.mark_batch_executing(&batch_one.id).await.expect("mark executing");

    // Batch 2 is still `pending`, so the only claimable task anywhere in
    // the session is batch 1's, regardless of which sandbox asks (P2).
    let claimed = store
        .claim_next_task(&session.id, "wt-1")
        .await
        .expect("claim")
        .expect("batch 1's task should be claimable now that the batch is executing");
    assert_eq!(claimed.batch_id, batch_one.id);

    assert!(
        store.claim_next_task(&session.id, "wt-2").await.expect("claim").is_none(),
        "batch 2's task must not surface while batch 2 is still pending"
    );

    // Re-advancing now shouldn't promote batch 2 yet: batch 1 hasn't
    // reconciled to `complete`.
    let ready_again = orchestrator.advance_ready_batches(&session.id).await.expect("ready");
    assert!(ready_again.is_empty(), "batch 2 should not be ready before batch 1 completes");

    store
        .mark_task_result(&claimed.id, TaskResult::status(TaskStatus::PrCreated))
        .await
        .expect("mark result");

    let status = orchestrator.reconcile_batch(&batch_one.id).await.expect("reconcile");
    assert_eq!(status, bx_core::BatchStatus::Complete);

    let ready = orchestrator.advance_ready_batches(&session.id).await.expect("ready");
    assert_eq!(ready, vec![batch_two.id.clone()], "batch 2 becomes ready once batch 1 completes");

    // Still gated: batch 2 is `ready`, not yet `executing`.
    assert!(store.claim_next_task(&session.id, "wt-2").await.expect("claim").is_none());

    orchestrator.mark_batch_executing(&batch_two.id).await.expect("mark executing");
    let claimed_two = store
        .claim_next_task(&session.id, "wt-2")
        .await
        .expect("claim")
        .expect("batch 2's task is now claimable");
    assert_eq!(claimed_two.batch_id, batch_two.id);
    assert_eq!(claimed_two.status, TaskStatus::InProgress);

    store
        .mark_task_result(&claimed_two.id, TaskResult::status(TaskStatus::Merged))
        .await
        .expect("mark result");
    orchestrator.reconcile_batch(&batch_two.id).await.expect("reconcile");

    let final_status = orchestrator.session_status(&session.id).await.expect("status");
    assert_eq!(final_status, bx_core::SessionStatus::Complete);

    let (_s, batches) = store.session_status(&session.id).await.expect("status");
    let mut total_completed = 0;
    for batch in &batches {
        total_completed += tasks_completed(&store.tasks_for_batch(&batch.id).await.expect("tasks"));
    }
    assert_eq!(total_completed, 2, "P6: both tasks counted as completed");
}
