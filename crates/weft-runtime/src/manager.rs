//! The process-wide front door: submit, observe, stop and reload runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use weft_config::WorkflowDef;
use weft_store::{RunRecord, RunStore};
use weft_validator::{ValidationError, Validator};

use crate::config::RunnerConfig;
use crate::error::{NodeError, RuntimeError};
use crate::node::NodeCtx;
use crate::progress::{ChannelKey, ProgressEvent, ProgressRegistry};
use crate::registry::NodeRegistry;
use crate::run::{RunOutcome, WorkflowRun};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
  pub workflow_id: String,
  pub definition: WorkflowDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
  pub success: bool,
  /// Run id; also the key of the run's graph channel.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub validation_errors: Vec<ValidationError>,
}

struct ActiveRun {
  run: Arc<WorkflowRun>,
  handle: JoinHandle<Option<RunOutcome>>,
}

type ActiveRuns = Mutex<HashMap<String, ActiveRun>>;

fn lock(active: &ActiveRuns) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
  active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the runs of one process, keyed by workflow id.
///
/// A finished run stays in the table until it is waited on, stopped, or
/// replaced by the next submission for the same workflow. Leaving the table
/// drops the run's progress channels, so read them before that.
pub struct RunManager {
  registry: Arc<NodeRegistry>,
  progress: ProgressRegistry,
  store: Option<Arc<dyn RunStore>>,
  config: RunnerConfig,
  active: ActiveRuns,
}

impl RunManager {
  pub fn new(registry: Arc<NodeRegistry>, progress: ProgressRegistry) -> Self {
    Self {
      registry,
      progress,
      store: None,
      config: RunnerConfig::default(),
      active: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn with_config(mut self, config: RunnerConfig) -> Self {
    self.config = config;
    self
  }

  pub fn progress(&self) -> &ProgressRegistry {
    &self.progress
  }

  pub fn registry(&self) -> &NodeRegistry {
    &self.registry
  }

  pub fn validate(&self, definition: &WorkflowDef) -> Vec<ValidationError> {
    Validator::new(definition, self.registry.as_ref()).validate()
  }

  /// Validate and start a run.
  ///
  /// Invalid definitions are answered with their validation errors and never
  /// start. The graph channel exists before the run's first event.
  pub fn submit(&self, request: RunRequest) -> Result<RunResponse, RuntimeError> {
    let validation_errors = self.validate(&request.definition);
    if !validation_errors.is_empty() {
      info!(
        workflow_id = %request.workflow_id,
        invalid_nodes = validation_errors.len(),
        "run_rejected"
      );
      return Ok(RunResponse {
        success: false,
        token: None,
        validation_errors,
      });
    }

    let workflow_id = request.workflow_id;
    let mut active = lock(&self.active);
    if active
      .get(&workflow_id)
      .is_some_and(|existing| !existing.handle.is_finished())
    {
      return Err(RuntimeError::AlreadyRunning { workflow_id });
    }

    let mut definition = request.definition;
    definition.workflow_id = workflow_id.clone();
    let mut run = WorkflowRun::build(
      definition,
      &self.registry,
      self.progress.clone(),
      self.config.clone(),
    )?;
    if let Some(store) = &self.store {
      run = run.with_store(store.clone());
    }
    let run = Arc::new(run);
    let token = run.run_id().to_string();
    self.progress.create(ChannelKey::graph(&token));

    let handle = {
      let run = run.clone();
      tokio::spawn(async move {
        match run.run().await {
          Ok(outcome) => Some(outcome),
          Err(e) => {
            warn!(error = %e, "run_not_started");
            None
          }
        }
      })
    };

    info!(workflow_id = %workflow_id, run_id = %token, "run_submitted");
    if let Some(previous) = active.insert(workflow_id, ActiveRun { run, handle }) {
      self.progress.remove_run(previous.run.run_id());
    }
    Ok(RunResponse {
      success: true,
      token: Some(token),
      validation_errors: Vec::new(),
    })
  }

  pub fn is_running(&self, workflow_id: &str) -> bool {
    lock(&self.active)
      .get(workflow_id)
      .is_some_and(|entry| !entry.handle.is_finished())
  }

  fn take(&self, workflow_id: &str) -> Result<ActiveRun, RuntimeError> {
    lock(&self.active)
      .remove(workflow_id)
      .ok_or_else(|| RuntimeError::NotRunning {
        workflow_id: workflow_id.to_string(),
      })
  }

  fn run_of(&self, workflow_id: &str) -> Result<Arc<WorkflowRun>, RuntimeError> {
    lock(&self.active)
      .get(workflow_id)
      .map(|entry| entry.run.clone())
      .ok_or_else(|| RuntimeError::NotRunning {
        workflow_id: workflow_id.to_string(),
      })
  }

  /// Cancel a run and wait until every instance has settled.
  pub async fn stop(&self, workflow_id: &str) -> Result<Option<RunOutcome>, RuntimeError> {
    let entry = self.take(workflow_id)?;
    info!(workflow_id, run_id = %entry.run.run_id(), "run_stopping");
    entry.run.stop();
    Ok(self.retire(entry).await)
  }

  /// Fire a run's cancellation without waiting for it. The run stays in the
  /// table for a later [`RunManager::wait`].
  pub fn cancel(&self, workflow_id: &str) -> Result<(), RuntimeError> {
    let run = self.run_of(workflow_id)?;
    info!(workflow_id, run_id = %run.run_id(), "run_canceling");
    run.stop();
    Ok(())
  }

  /// Wait for a run to finish on its own.
  pub async fn wait(&self, workflow_id: &str) -> Result<Option<RunOutcome>, RuntimeError> {
    let entry = self.take(workflow_id)?;
    Ok(self.retire(entry).await)
  }

  /// Await a run taken out of the table, then drop its progress channels.
  async fn retire(&self, entry: ActiveRun) -> Option<RunOutcome> {
    let outcome = match entry.handle.await {
      Ok(outcome) => outcome,
      Err(e) => {
        warn!(run_id = %entry.run.run_id(), error = %e, "run_task_failed");
        None
      }
    };
    self.progress.remove_run(entry.run.run_id());
    outcome
  }

  /// Current data of every instance, for an observer joining mid-run.
  pub fn snapshot_events(&self, workflow_id: &str) -> Result<Vec<ProgressEvent>, RuntimeError> {
    Ok(self.run_of(workflow_id)?.snapshot_events())
  }

  /// Forward an interactive request to one live instance.
  pub async fn node_request(
    &self,
    workflow_id: &str,
    instance_id: &str,
    payload: Value,
  ) -> Result<Value, NodeError> {
    let run = self.run_of(workflow_id)?;
    let instance = run
      .context()
      .instance_by_id(instance_id)
      .ok_or_else(|| RuntimeError::InstanceNotFound {
        instance_id: instance_id.to_string(),
      })?;
    let ctx = NodeCtx {
      instance: instance.clone(),
      run: run.context().clone(),
      cancel: run.context().cancel_token().clone(),
    };
    instance.kind().process_request(&ctx, payload).await
  }

  fn store(&self) -> Result<&Arc<dyn RunStore>, RuntimeError> {
    self.store.as_ref().ok_or_else(|| RuntimeError::StoreUnavailable {
      message: "no run store configured".to_string(),
    })
  }

  /// A finished run's record, with its per-node snapshots.
  pub async fn load_run(&self, run_id: &str) -> Result<RunRecord, RuntimeError> {
    Ok(self.store()?.get_run(run_id).await?)
  }

  pub async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, RuntimeError> {
    Ok(self.store()?.list_runs(workflow_id).await?)
  }
}
