//! Weft Store
//!
//! Persistence for finished workflow runs. A [`RunRecord`] keeps the
//! definition a run executed, its overall status, and a snapshot of every
//! node instance at the end of the run, so a finished run can be inspected
//! after the process that ran it is gone.
//!
//! [`SqliteStore`] is the durable implementation; [`MemoryStore`] keeps
//! records for the lifetime of the process.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use sqlx::types::Json;
pub use types::{ExecutionStatus, NodeSnapshot, RunRecord};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage of run records.
#[async_trait]
pub trait RunStore: Send + Sync {
  /// Insert or replace a run record.
  async fn save_run(&self, run: &RunRecord) -> Result<(), Error>;

  /// Get a run by ID.
  async fn get_run(&self, run_id: &str) -> Result<RunRecord, Error>;

  /// Runs of a workflow, newest first.
  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, Error>;
}
