//! Exercises P1 (no double-execution) and P3 (sandbox exclusivity) against
//! the real SQLite-backed store: four workers racing to claim one pending
//! task must produce exactly one winner (§8 scenario 3).

use std::sync::Arc;

use bx_core::{ExecutionMode, NewSession, ParsedBatch, ParsedTask, Store, TaskExtras, TaskStatus};
use bx_store::SqliteStore;

fn one_task_session() -> NewSession {
    NewSession {
        plan_path: "PLAN.md".to_string(),
        max_review_rounds: 3,
        batches: vec![ParsedBatch {
            number: 1,
            title: "Only batch".to_string(),
            dependencies: vec![],
            tasks: vec![ParsedTask {
                number: "1.1".to_string(),
                title: "Only task".to_string(),
                extras: TaskExtras {
                    implementation_text: "do the thing".to_string(),
                    files: vec![],
                    verification_steps: vec![],
                    depends_on: vec![],
                    extra: serde_json::Map::new(),
                },
            }],
        }],
        batch_lo: 1,
        batch_hi: u32::MAX,
        mode: ExecutionMode::Parallel,
        auto_publish: false,
    }
}

#[tokio::test]
async fn exactly_one_of_four_workers_claims_the_pending_task() {
    let store: Arc<SqliteStore> = Arc::new(SqliteStore::open_in_memory().expect("open"));
    let session = store.start_execution(one_task_session()).await.expect("start");
    let (_session, batches) = store.session_status(&session.id).await.expect("status");
    store.mark_batch_executing(&batches[0].id).await.expect("mark executing");

    let mut handles = Vec::new();
    for i in 0..4 {
        let store = store.clone();
        let session_id = session.id.clone();
        handles.push(tokio::spawn(async move {
            store.claim_next_task(&session_id, &format!("wt-{i}")).await.expect("claim")
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("join").is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1, "exactly one worker should win the claim race");

    let (_session, batches) = store.session_status(&session.id).await.expect("status");
    let tasks = store.tasks_for_batch(&batches[0].id).await.expect("tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::InProgress);
    assert!(tasks[0].sandbox_id.is_some(), "winner's sandbox id should be recorded");
}

#[tokio::test]
async fn claim_is_a_noop_outside_an_executing_batch() {
    let store = SqliteStore::open_in_memory().expect("open");
    let session = store.start_execution(one_task_session()).await.expect("start");

    // Batch is `ready`, not yet `executing`: nothing should be claimable.
    let claimed = store.claim_next_task(&session.id, "wt-1").await.expect("claim");
    assert!(claimed.is_none());
}

#[tokio::test]
async fn a_claimed_task_is_never_reclaimed_by_a_later_caller() {
    let store = SqliteStore::open_in_memory().expect("open");
    let session = store.start_execution(one_task_session()).await.expect("start");
    let (_session, batches) = store.session_status(&session.id).await.expect("status");
    store.mark_batch_executing(&batches[0].id).await.expect("mark executing");

    let first = store.claim_next_task(&session.id, "wt-1").await.expect("claim");
    assert!(first.is_some());

    let second = store.claim_next_task(&session.id, "wt-2").await.expect("claim");
    assert!(second.is_none(), "the task was already claimed");
}
