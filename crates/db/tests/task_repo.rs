//! Integration tests for `TaskRepo` and `LedgerRepo` against a real
//! PostgreSQL database (provisioned per test by `sqlx::test`).

use chrono::{Duration, Utc};
use retouch_db::models::status::TaskStatus;
use retouch_db::models::task::{CreateTask, Task};
use retouch_db::repositories::{LedgerRepo, TaskRepo};
use serde_json::json;
use sqlx::PgPool;

fn restore_task(user_id: i64) -> CreateTask {
    CreateTask {
        task_type: "restore".to_string(),
        payload: json!({"source_url": "https://cdn.example.com/p/1.jpg"}),
        cost: 150,
        max_attempts: None,
        user_id: Some(user_id),
        photo_id: Some(11),
        chat_id: Some(9001),
    }
}

async fn set_created_at(pool: &PgPool, id: i64, at: chrono::DateTime<Utc>) {
    sqlx::query("UPDATE tasks SET created_at = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_sets_defaults(pool: PgPool) {
    let task = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();

    assert_eq!(task.status(), Some(TaskStatus::Pending));
    assert_eq!(task.attempt_count, 0);
    assert_eq!(task.max_attempts, 3);
    assert!(task.charged_at.is_none());
    assert!(task.retry_of_task_id.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn select_eligible_orders_oldest_first_and_limits(pool: PgPool) {
    let now = Utc::now();
    let mut ids = Vec::new();
    for offset in [3, 1, 2] {
        let task = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
        set_created_at(&pool, task.id, now - Duration::minutes(offset)).await;
        ids.push((offset, task.id));
    }

    let selected = TaskRepo::select_eligible(&pool, now, Duration::hours(24), 2)
        .await
        .unwrap();
    let selected_ids: Vec<i64> = selected.iter().map(|t| t.id).collect();

    // Offsets 3 and 2 minutes ago are the two oldest.
    assert_eq!(selected_ids, vec![ids[0].1, ids[2].1]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn select_eligible_skips_ineligible_rows(pool: PgPool) {
    let now = Utc::now();

    let too_old = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    set_created_at(&pool, too_old.id, now - Duration::hours(30)).await;

    let mut waiting: Task = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    waiting.status_id = TaskStatus::PendingRetry.id();
    waiting.attempt_count = 1;
    waiting.next_eligible_at = Some(now + Duration::minutes(5));
    TaskRepo::persist(&pool, &waiting).await.unwrap();

    let mut running = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    running.status_id = TaskStatus::Processing.id();
    running.attempt_count = 1;
    TaskRepo::persist(&pool, &running).await.unwrap();

    let ready = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();

    let selected = TaskRepo::select_eligible(&pool, now, Duration::hours(24), 10)
        .await
        .unwrap();
    assert_eq!(selected.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ready.id]);

    // Once the retry window has passed the waiting task is selectable too.
    let later = now + Duration::minutes(6);
    let selected = TaskRepo::select_eligible(&pool, later, Duration::hours(24), 10)
        .await
        .unwrap();
    assert!(selected.iter().any(|t| t.id == waiting.id));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn persist_writes_full_record(pool: PgPool) {
    let mut task = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    let now = Utc::now();
    task.status_id = TaskStatus::Completed.id();
    task.attempt_count = 1;
    task.result_locator = Some("https://cdn.example.com/r/1.png".into());
    task.updated_at = now;
    task.completed_at = Some(now);
    TaskRepo::persist(&pool, &task).await.unwrap();

    let stored = TaskRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TaskStatus::Completed));
    assert_eq!(stored.result_locator, task.result_locator);
    assert!(stored.completed_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn persist_missing_task_is_row_not_found(pool: PgPool) {
    let mut task = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    task.id += 1000;
    let err = TaskRepo::persist(&pool, &task).await.unwrap_err();
    assert!(matches!(err, sqlx::Error::RowNotFound));
}

/// The record a worker writes when it starts the next attempt.
fn started(mut task: Task) -> Task {
    task.status_id = TaskStatus::Processing.id();
    task.attempt_count += 1;
    task.next_eligible_at = None;
    task.updated_at = Utc::now();
    task
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_admits_one_copy_of_a_snapshot(pool: PgPool) {
    let snapshot = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();

    assert!(TaskRepo::claim(&pool, &started(snapshot.clone())).await.unwrap());
    assert!(!TaskRepo::claim(&pool, &started(snapshot.clone())).await.unwrap());

    let stored = TaskRepo::find_by_id(&pool, snapshot.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TaskStatus::Processing));
    assert_eq!(stored.attempt_count, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_rejects_outdated_attempt_count(pool: PgPool) {
    let snapshot = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    let mut retrying = snapshot.clone();
    retrying.status_id = TaskStatus::PendingRetry.id();
    retrying.attempt_count = 1;
    retrying.next_eligible_at = Some(Utc::now());
    TaskRepo::persist(&pool, &retrying).await.unwrap();

    assert!(!TaskRepo::claim(&pool, &started(snapshot)).await.unwrap());
    let stored = TaskRepo::find_by_id(&pool, retrying.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TaskStatus::PendingRetry));
    assert_eq!(stored.attempt_count, 1);

    assert!(TaskRepo::claim(&pool, &started(retrying.clone())).await.unwrap());
    let stored = TaskRepo::find_by_id(&pool, retrying.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TaskStatus::Processing));
    assert_eq!(stored.attempt_count, 2);
    assert!(stored.next_eligible_at.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn persist_outcome_only_applies_to_processing_rows(pool: PgPool) {
    let snapshot = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    let mut done = started(snapshot.clone());
    done.status_id = TaskStatus::Completed.id();
    done.completed_at = Some(Utc::now());

    assert!(!TaskRepo::persist_outcome(&pool, &done).await.unwrap());

    assert!(TaskRepo::claim(&pool, &started(snapshot)).await.unwrap());
    assert!(TaskRepo::persist_outcome(&pool, &done).await.unwrap());
    assert!(!TaskRepo::persist_outcome(&pool, &done).await.unwrap());

    let stored = TaskRepo::find_by_id(&pool, done.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TaskStatus::Completed));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_charged_only_once(pool: PgPool) {
    let task = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    assert!(TaskRepo::mark_charged(&pool, task.id, Utc::now()).await.unwrap());
    assert!(!TaskRepo::mark_charged(&pool, task.id, Utc::now()).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn resubmit_only_from_failed(pool: PgPool) {
    let mut task = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    assert!(TaskRepo::resubmit(&pool, task.id).await.unwrap().is_none());

    task.status_id = TaskStatus::Failed.id();
    task.attempt_count = 3;
    TaskRepo::persist(&pool, &task).await.unwrap();

    let copy = TaskRepo::resubmit(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(copy.retry_of_task_id, Some(task.id));
    assert_eq!(copy.status(), Some(TaskStatus::Pending));
    assert_eq!(copy.attempt_count, 0);
    assert_eq!(copy.payload, task.payload);
    assert!(!copy.is_chargeable());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn housekeeping_queries(pool: PgPool) {
    let now = Utc::now();

    let mut done = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    done.status_id = TaskStatus::Completed.id();
    done.attempt_count = 1;
    done.completed_at = Some(now - Duration::days(40));
    TaskRepo::persist(&pool, &done).await.unwrap();

    let mut stuck = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    stuck.status_id = TaskStatus::Processing.id();
    stuck.attempt_count = 1;
    stuck.updated_at = now - Duration::hours(3);
    TaskRepo::persist(&pool, &stuck).await.unwrap();

    let stale = TaskRepo::stale_processing_ids(&pool, now - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(stale, vec![stuck.id]);

    let deleted = TaskRepo::delete_terminal_older_than(&pool, now - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(TaskRepo::find_by_id(&pool, done.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_waiting_ids_lists_unselectable_tasks(pool: PgPool) {
    let now = Utc::now();

    let mut expired_retry = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    expired_retry.status_id = TaskStatus::PendingRetry.id();
    expired_retry.attempt_count = 1;
    expired_retry.next_eligible_at = Some(now - Duration::hours(20));
    TaskRepo::persist(&pool, &expired_retry).await.unwrap();
    set_created_at(&pool, expired_retry.id, now - Duration::hours(30)).await;

    let expired_pending = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    set_created_at(&pool, expired_pending.id, now - Duration::hours(26)).await;

    let mut old_done = TaskRepo::create(&pool, &restore_task(1)).await.unwrap();
    old_done.status_id = TaskStatus::Failed.id();
    old_done.completed_at = Some(now - Duration::hours(29));
    TaskRepo::persist(&pool, &old_done).await.unwrap();
    set_created_at(&pool, old_done.id, now - Duration::hours(30)).await;

    TaskRepo::create(&pool, &restore_task(1)).await.unwrap();

    let expired = TaskRepo::expired_waiting_ids(&pool, now - Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(expired, vec![expired_retry.id, expired_pending.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn ledger_debit_is_idempotent(pool: PgPool) {
    assert!(LedgerRepo::debit(&pool, 5, 150, "task:1", "photo restoration").await.unwrap());
    assert!(!LedgerRepo::debit(&pool, 5, 150, "task:1", "photo restoration").await.unwrap());

    assert_eq!(LedgerRepo::balance(&pool, 5).await.unwrap(), -150);
    let entry = LedgerRepo::find_by_reference(&pool, "task:1").await.unwrap().unwrap();
    assert_eq!(entry.amount, -150);
    assert_eq!(entry.user_id, 5);
}
