//! The contract every node kind implements.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use weft_config::NodeDef;
use weft_validator::{VisibleVariables, check_content_refs};

use crate::context::RunContext;
use crate::error::NodeError;
use crate::instance::{ContentSlot, NodeInstance};
use crate::layout::NestLayout;
use crate::progress::NodeUpdate;
use crate::status::JoinPolicy;

/// Everything a node body may touch: its own instance, the run it belongs
/// to, and the cancellation signal it runs under.
#[derive(Clone)]
pub struct NodeCtx {
  pub instance: Arc<NodeInstance>,
  pub run: Arc<RunContext>,
  pub cancel: CancellationToken,
}

impl NodeCtx {
  pub fn layout(&self) -> &NestLayout {
    &self.instance.key().layout
  }

  pub fn payload(&self, content_id: &str) -> Result<&ContentSlot, NodeError> {
    self
      .instance
      .payloads()
      .get(content_id)
      .ok_or_else(|| NodeError::failed(format!("missing payload '{}'", content_id)))
  }

  /// Value of a payload entry, following a `{"ref": ...}` indirection.
  pub fn payload_value(&self, content_id: &str) -> Result<Value, NodeError> {
    let slot = self.payload(content_id)?;
    self.deref_value(slot.data.value())
  }

  /// Like [`NodeCtx::payload_value`], `None` when the entry is absent.
  pub fn payload_value_opt(&self, content_id: &str) -> Result<Option<Value>, NodeError> {
    match self.instance.payloads().get(content_id) {
      Some(slot) => self.deref_value(slot.data.value()).map(Some),
      None => Ok(None),
    }
  }

  fn deref_value(&self, value: Value) -> Result<Value, NodeError> {
    match value.get("ref").and_then(|r| r.as_str()) {
      Some(reference) => self.resolve(reference),
      None => Ok(value),
    }
  }

  /// Resolve a reference from this instance's position in the nest.
  pub fn resolve(&self, reference: &str) -> Result<Value, NodeError> {
    Ok(self.run.resolve(reference, self.layout())?)
  }

  /// Overwrite a result entry, returning the matching update.
  pub fn set_result(&self, content_id: &str, value: Value) -> Result<NodeUpdate, NodeError> {
    let slot = self
      .instance
      .results()
      .get(content_id)
      .ok_or_else(|| NodeError::failed(format!("missing result '{}'", content_id)))?;
    slot.data.set(&[], value.clone())?;
    Ok(NodeUpdate::overwrite(NodeUpdate::result_path(content_id), value))
  }
}

/// A node type's behavior.
///
/// One value per type tag is registered in a
/// [`NodeRegistry`](crate::NodeRegistry); per-instance state lives on the
/// [`NodeInstance`], never on the kind.
#[async_trait]
pub trait NodeKind: Send + Sync {
  /// The type tag this kind handles.
  fn name(&self) -> &'static str;

  fn join_policy(&self) -> JoinPolicy {
    JoinPolicy::And
  }

  /// Passive kinds never run; they only report derived state.
  fn is_passive(&self) -> bool {
    false
  }

  /// Kinds that expand a subgraph watch `ctx.cancel` themselves and settle
  /// their children before returning. Their body is never raced against it.
  fn observes_cancel(&self) -> bool {
    false
  }

  /// Execute the body.
  ///
  /// On success, output handles the body left untouched become `Success`.
  /// A branching kind marks the handles it does not take as `Canceled`.
  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError>;

  /// Design-time checks against the variables the node can see.
  fn validate(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
    check_content_refs(node, visible)
  }

  /// Handle an interactive request aimed at a live instance.
  async fn process_request(&self, _ctx: &NodeCtx, _payload: Value) -> Result<Value, NodeError> {
    Err(NodeError::Unsupported {
      kind: self.name(),
      operation: "requests",
    })
  }

  /// Full current state, for observers joining mid-run.
  fn current_data(&self, ctx: &NodeCtx) -> Vec<NodeUpdate> {
    ctx.instance.state_updates()
  }

  /// Start observing, for passive kinds. Called instead of [`NodeKind::run`].
  fn attach(&self, _ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    Ok(Vec::new())
  }

  /// Static metadata for authoring tools.
  fn node_config(&self) -> Value {
    json!({})
  }
}
