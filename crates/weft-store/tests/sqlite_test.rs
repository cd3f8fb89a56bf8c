use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use weft_store::{Error, ExecutionStatus, Json, NodeSnapshot, RunRecord, RunStore, SqliteStore};

async fn memory_store() -> SqliteStore {
  // One connection, so every query sees the same in-memory database.
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .unwrap();
  let store = SqliteStore::new(pool);
  store.migrate().await.unwrap();
  store
}

fn record(run_id: &str, workflow_id: &str, offset: i64) -> RunRecord {
  let started_at = Utc::now() + Duration::seconds(offset);
  RunRecord {
    run_id: run_id.to_string(),
    workflow_id: workflow_id.to_string(),
    definition: Json(json!({"workflow_id": workflow_id, "nodes": []})),
    status: ExecutionStatus::Error,
    started_at,
    ended_at: Some(started_at + Duration::seconds(1)),
    nodes: Json(vec![NodeSnapshot {
      instance_id: "double#1".to_string(),
      original_id: "double".to_string(),
      node_type: "double".to_string(),
      parent: Some("loop".to_string()),
      status: "Error".to_string(),
      data: json!({"error": "boom"}),
    }]),
  }
}

#[tokio::test]
async fn test_save_and_get_run() {
  let store = memory_store().await;
  let run = record("r1", "wf", 0);
  store.save_run(&run).await.unwrap();

  let loaded = store.get_run("r1").await.unwrap();
  assert_eq!(loaded.workflow_id, "wf");
  assert_eq!(loaded.status, ExecutionStatus::Error);
  assert_eq!(loaded.nodes.0, run.nodes.0);
  assert_eq!(loaded.node("double#1").unwrap().data["error"], "boom");
}

#[tokio::test]
async fn test_save_replaces_existing_run() {
  let store = memory_store().await;
  let mut run = record("r1", "wf", 0);
  store.save_run(&run).await.unwrap();

  run.status = ExecutionStatus::Success;
  store.save_run(&run).await.unwrap();

  assert_eq!(store.get_run("r1").await.unwrap().status, ExecutionStatus::Success);
  assert_eq!(store.list_runs("wf").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_runs_filters_and_orders() {
  let store = memory_store().await;
  store.save_run(&record("old", "wf", 0)).await.unwrap();
  store.save_run(&record("new", "wf", 60)).await.unwrap();
  store.save_run(&record("elsewhere", "other", 30)).await.unwrap();

  let ids: Vec<String> = store
    .list_runs("wf")
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.run_id)
    .collect();
  assert_eq!(ids, vec!["new", "old"]);
}

#[tokio::test]
async fn test_missing_run_is_not_found() {
  let store = memory_store().await;
  assert!(matches!(store.get_run("missing").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_connect_creates_database_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("runs.db");
  let url = format!("sqlite://{}", path.display());

  let store = SqliteStore::connect(&url).await.unwrap();
  store.save_run(&record("r1", "wf", 0)).await.unwrap();
  assert!(path.exists());

  let reopened = SqliteStore::connect(&url).await.unwrap();
  assert_eq!(reopened.get_run("r1").await.unwrap().run_id, "r1");
}
