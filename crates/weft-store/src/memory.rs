use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Error, RunRecord, RunStore};

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
  runs: RwLock<HashMap<String, RunRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RunStore for MemoryStore {
  async fn save_run(&self, run: &RunRecord) -> Result<(), Error> {
    self
      .runs
      .write()
      .await
      .insert(run.run_id.clone(), run.clone());
    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, Error> {
    self
      .runs
      .read()
      .await
      .get(run_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, Error> {
    let mut runs: Vec<RunRecord> = self
      .runs
      .read()
      .await
      .values()
      .filter(|r| r.workflow_id == workflow_id)
      .cloned()
      .collect();
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(runs)
  }
}
