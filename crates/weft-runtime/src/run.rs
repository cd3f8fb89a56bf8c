//! One execution of a workflow definition.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use weft_config::WorkflowDef;
use weft_store::{ExecutionStatus, Json, NodeSnapshot, RunRecord, RunStore};

use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::error::RuntimeError;
use crate::layout::NestLayout;
use crate::node::NodeCtx;
use crate::progress::{ProgressEvent, ProgressRegistry};
use crate::registry::NodeRegistry;
use crate::status::RunStatus;

/// Final state of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
  pub run_id: String,
  pub workflow_id: String,
  pub status: RunStatus,
  pub started_at: DateTime<Utc>,
  pub ended_at: DateTime<Utc>,
  pub nodes: Vec<NodeSnapshot>,
}

impl RunOutcome {
  pub fn node(&self, instance_id: &str) -> Option<&NodeSnapshot> {
    self.nodes.iter().find(|n| n.instance_id == instance_id)
  }
}

/// A built, not yet started (or running) workflow execution.
pub struct WorkflowRun {
  ctx: Arc<RunContext>,
  store: Option<Arc<dyn RunStore>>,
  started: AtomicBool,
}

impl WorkflowRun {
  /// Create every root-level instance and wire the root-level edges.
  pub fn build(
    workflow: WorkflowDef,
    registry: &NodeRegistry,
    progress: ProgressRegistry,
    config: RunnerConfig,
  ) -> Result<Self, RuntimeError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let ctx = Arc::new(RunContext::new(
      run_id,
      Arc::new(workflow),
      registry,
      progress,
      config,
    )?);

    let mut scope = HashMap::new();
    let roots: Vec<String> = ctx.workflow().roots().map(|n| n.node_id.clone()).collect();
    for node_id in roots {
      let instance = ctx.create_instance(&node_id, NestLayout::root())?;
      scope.insert(node_id, instance.key().clone());
    }
    ctx.wire(&scope)?;

    Ok(Self {
      ctx,
      store: None,
      started: AtomicBool::new(false),
    })
  }

  /// Persist the outcome here once the run finishes.
  pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn run_id(&self) -> &str {
    self.ctx.run_id()
  }

  pub fn context(&self) -> &Arc<RunContext> {
    &self.ctx
  }

  /// Fire cancellation. In-flight nodes settle as `Canceled`.
  pub fn stop(&self) {
    self.ctx.cancel_token().cancel();
  }

  pub fn is_stopped(&self) -> bool {
    self.ctx.cancel_token().is_cancelled()
  }

  /// One `BatchUpdateNode` per live instance, carrying its current data.
  pub fn snapshot_events(&self) -> Vec<ProgressEvent> {
    self
      .ctx
      .instances()
      .into_iter()
      .map(|instance| {
        let ctx = NodeCtx {
          instance: instance.clone(),
          run: self.ctx.clone(),
          cancel: self.ctx.cancel_token().clone(),
        };
        ProgressEvent::BatchUpdateNode {
          run_id: self.ctx.run_id().to_string(),
          instance_id: instance.id(),
          original_id: instance.template_id().to_string(),
          updates: instance.kind().current_data(&ctx),
        }
      })
      .collect()
  }

  /// Drive every root instance to completion.
  ///
  /// Emits exactly one `FlowFinished` on the run's channels. A run can only
  /// be started once.
  #[instrument(
    name = "run",
    skip(self),
    fields(run_id = %self.ctx.run_id(), workflow_id = %self.ctx.workflow().workflow_id)
  )]
  pub async fn run(&self) -> Result<RunOutcome, RuntimeError> {
    if self.started.swap(true, Ordering::SeqCst) {
      return Err(RuntimeError::AlreadyRunning {
        workflow_id: self.ctx.workflow().workflow_id.clone(),
      });
    }

    let started_at = Utc::now();
    info!("run_started");

    let mut tasks = JoinSet::new();
    for instance in self.ctx.instances() {
      tasks.spawn(instance.invoke(self.ctx.clone(), self.ctx.cancel_token().clone()));
    }
    while let Some(joined) = tasks.join_next().await {
      if let Err(e) = joined {
        error!(error = %e, "node_task_failed");
        self.ctx.publish(ProgressEvent::InternalError {
          run_id: self.ctx.run_id().to_string(),
          message: e.to_string(),
        });
      }
    }

    let instances = self.ctx.instances();
    for instance in &instances {
      instance.detach();
    }

    let status = self.overall_status();
    let outcome = RunOutcome {
      run_id: self.ctx.run_id().to_string(),
      workflow_id: self.ctx.workflow().workflow_id.clone(),
      status,
      started_at,
      ended_at: Utc::now(),
      nodes: instances.iter().map(|i| i.snapshot()).collect(),
    };
    self.persist(&outcome).await;

    info!(status = %status, nodes = outcome.nodes.len(), "run_completed");
    self.ctx.progress().broadcast(
      self.ctx.run_id(),
      ProgressEvent::FlowFinished {
        run_id: self.ctx.run_id().to_string(),
        status,
      },
    );
    Ok(outcome)
  }

  fn overall_status(&self) -> RunStatus {
    if self.is_stopped() {
      return RunStatus::Canceled;
    }
    let errored = self
      .ctx
      .instances()
      .iter()
      .any(|i| i.status() == RunStatus::Error);
    if errored {
      RunStatus::Error
    } else {
      RunStatus::Success
    }
  }

  async fn persist(&self, outcome: &RunOutcome) {
    let Some(store) = &self.store else {
      return;
    };
    let definition = match serde_json::to_value(self.ctx.workflow()) {
      Ok(definition) => definition,
      Err(e) => {
        warn!(error = %e, "run_definition_not_serializable");
        serde_json::Value::Null
      }
    };
    let status = match outcome.status {
      RunStatus::Success => ExecutionStatus::Success,
      RunStatus::Error => ExecutionStatus::Error,
      RunStatus::Canceled => ExecutionStatus::Canceled,
      _ => ExecutionStatus::Running,
    };
    let record = RunRecord {
      run_id: outcome.run_id.clone(),
      workflow_id: outcome.workflow_id.clone(),
      definition: Json(definition),
      status,
      started_at: outcome.started_at,
      ended_at: Some(outcome.ended_at),
      nodes: Json(outcome.nodes.clone()),
    };
    if let Err(e) = store.save_run(&record).await {
      warn!(error = %e, "run_persist_failed");
    }
  }
}
