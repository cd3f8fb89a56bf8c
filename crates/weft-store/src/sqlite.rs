use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use crate::{Error, RunRecord, RunStore};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url` and migrate it.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

#[async_trait]
impl RunStore for SqliteStore {
  async fn save_run(&self, run: &RunRecord) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT OR REPLACE INTO workflow_runs (run_id, workflow_id, definition, status, started_at, ended_at, nodes)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&run.run_id)
    .bind(&run.workflow_id)
    .bind(&run.definition)
    .bind(run.status)
    .bind(run.started_at)
    .bind(run.ended_at)
    .bind(&run.nodes)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, Error> {
    sqlx::query_as(
      r#"
            SELECT run_id, workflow_id, definition, status, started_at, ended_at, nodes
            FROM workflow_runs
            WHERE run_id = ?
            "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, Error> {
    Ok(
      sqlx::query_as(
        r#"
            SELECT run_id, workflow_id, definition, status, started_at, ended_at, nodes
            FROM workflow_runs
            WHERE workflow_id = ?
            ORDER BY started_at DESC
            "#,
      )
      .bind(workflow_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }
}
