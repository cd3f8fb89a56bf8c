//! Dynamic subgraph expansion for nested constructs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;
use weft_config::{AttachedRole, ContentRef, WorkflowDef};

use crate::context::RunContext;
use crate::error::{NodeError, RuntimeError};
use crate::instance::NodeInstance;
use crate::layout::{InstanceKey, NestLayout};
use crate::node::NodeCtx;
use crate::progress::NodeUpdate;

/// The children of one nested construct, split by role.
#[derive(Debug, Clone)]
pub(crate) struct Construct {
  pub input: String,
  pub output: String,
  pub next: Option<String>,
  /// Task children, in definition order.
  pub body: Vec<String>,
}

impl Construct {
  pub(crate) fn of(workflow: &WorkflowDef, parent_id: &str) -> Result<Self, NodeError> {
    let boundary = |role: AttachedRole| {
      workflow
        .attached_child(parent_id, role)
        .map(|n| n.node_id.clone())
    };
    let missing = |role: &str| NodeError::failed(format!("construct '{}' has no {} boundary", parent_id, role));

    Ok(Self {
      input: boundary(AttachedRole::Input).ok_or_else(|| missing("input"))?,
      output: boundary(AttachedRole::Output).ok_or_else(|| missing("output"))?,
      next: boundary(AttachedRole::Next),
      body: workflow
        .children(parent_id)
        .filter(|n| !n.flags.is_attached)
        .map(|n| n.node_id.clone())
        .collect(),
    })
  }
}

/// Instances spawned by one construct, under a child cancellation token.
///
/// Children are never aborted: leaving the subgraph cancels them and lets
/// each one settle its own status.
pub(crate) struct Subgraph {
  run: Arc<RunContext>,
  cancel: CancellationToken,
  tasks: JoinSet<()>,
  created: Vec<InstanceKey>,
  unlaunched: Vec<Arc<NodeInstance>>,
}

impl Subgraph {
  pub(crate) fn new(ctx: &NodeCtx) -> Self {
    Self {
      run: ctx.run.clone(),
      cancel: ctx.cancel.child_token(),
      tasks: JoinSet::new(),
      created: Vec::new(),
      unlaunched: Vec::new(),
    }
  }

  pub(crate) fn instantiate(
    &mut self,
    template_id: &str,
    layout: &NestLayout,
  ) -> Result<Arc<NodeInstance>, RuntimeError> {
    let instance = self.run.create_instance(template_id, layout.clone())?;
    self.created.push(instance.key().clone());
    self.unlaunched.push(instance.clone());
    Ok(instance)
  }

  /// Instantiate every body template at `layout`, adding each to `scope`.
  pub(crate) fn instantiate_body(
    &mut self,
    construct: &Construct,
    layout: &NestLayout,
    scope: &mut HashMap<String, InstanceKey>,
  ) -> Result<Vec<Arc<NodeInstance>>, RuntimeError> {
    let mut body = Vec::with_capacity(construct.body.len());
    for template_id in &construct.body {
      let instance = self.instantiate(template_id, layout)?;
      scope.insert(template_id.clone(), instance.key().clone());
      body.push(instance);
    }
    Ok(body)
  }

  pub(crate) fn launch(&mut self, instance: &Arc<NodeInstance>) {
    self.unlaunched.retain(|i| i.key() != instance.key());
    self
      .tasks
      .spawn(instance.clone().invoke(self.run.clone(), self.cancel.clone()));
  }

  /// Wait for every launched instance to finish.
  pub(crate) async fn drain(&mut self) {
    while let Some(joined) = self.tasks.join_next().await {
      if joined.as_ref().is_err_and(|e| e.is_panic()) {
        error!(run_id = %self.run.run_id(), "node_task_panicked");
      }
    }
  }

  /// Cancel every child, settle the ones never launched as `Canceled`, and
  /// wait for the launched ones to settle themselves.
  pub(crate) async fn close(&mut self) {
    self.cancel.cancel();
    self.cancel_unlaunched();
    self.drain().await;
  }

  /// Close, then drop every instance this subgraph created from the run.
  pub(crate) async fn discard(mut self) {
    self.close().await;
    for key in &self.created {
      self.run.remove_instance(key);
    }
  }

  fn cancel_unlaunched(&mut self) {
    for instance in self.unlaunched.drain(..) {
      instance.cancel_unstarted(&self.run);
    }
  }
}

impl Drop for Subgraph {
  fn drop(&mut self) {
    if self.tasks.is_empty() && self.unlaunched.is_empty() {
      return;
    }
    self.cancel.cancel();
    self.cancel_unlaunched();
    self.tasks.detach_all();
  }
}

/// Map the given instances by template id.
pub(crate) fn scope_of<'a>(
  instances: impl IntoIterator<Item = &'a Arc<NodeInstance>>,
) -> HashMap<String, InstanceKey> {
  instances
    .into_iter()
    .map(|inst| (inst.template_id().to_string(), inst.key().clone()))
    .collect()
}

/// Copy every result entry carrying a `config.ref` from its referenced
/// entry, as read from `reader`.
pub(crate) fn copy_referenced_results(
  ctx: &NodeCtx,
  reader: &NestLayout,
) -> Result<Vec<NodeUpdate>, NodeError> {
  let mut updates = Vec::new();
  for (content_id, slot) in ctx.instance.results().iter() {
    let Some(reference) = &slot.reference else {
      continue;
    };
    let reference: ContentRef = reference.parse().map_err(RuntimeError::from)?;
    let value = ctx.run.resolve_ref(&reference, reader)?;
    slot.data.set(&[], value.clone())?;
    updates.push(NodeUpdate::overwrite(NodeUpdate::result_path(content_id), value));
  }
  Ok(updates)
}
