use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};
use weft_config::{ContentRef, ContentType, NodeDef, kinds};
use weft_validator::{VisibleVariables, check_content_refs};

use super::ids;
use crate::error::{NodeError, RuntimeError};
use crate::expand::{Construct, Subgraph, scope_of};
use crate::instance::NodeInstance;
use crate::layout::NestLayout;
use crate::node::{NodeCtx, NodeKind};
use crate::progress::NodeUpdate;
use crate::status::RunStatus;

/// Runs its body once per element of a list, one nest level deeper.
///
/// The input and output boundaries are created once at the node's own
/// layout. Each index gets fresh body instances and a fresh `next`
/// boundary; in sequential mode index `i + 1` starts only after index `i`'s
/// `next` boundary settles. The output boundary is launched last, waiting
/// on every iteration's body.
pub struct IterRun;

impl IterRun {
  fn parallel(ctx: &NodeCtx) -> Result<bool, NodeError> {
    Ok(
      ctx
        .payload_value_opt(ids::ITER_CONFIG)?
        .and_then(|config| config.get("parallel").and_then(Value::as_bool))
        .unwrap_or(false),
    )
  }

  async fn await_gate(next: &Arc<NodeInstance>, index: usize) {
    next.signal().wait().await;
    if next.status() != RunStatus::Success {
      warn!(instance_id = %next.key(), index, status = %next.status(), "iteration_gate_not_passed");
    }
  }

  /// Launch every iteration, then the output boundary. Returns the output
  /// boundary's final status.
  async fn expand(
    ctx: &NodeCtx,
    sub: &mut Subgraph,
    construct: &Construct,
    next_id: &str,
    count: usize,
    parallel: bool,
  ) -> Result<RunStatus, NodeError> {
    let outer = ctx.layout();
    let input = sub.instantiate(&construct.input, outer)?;
    let output = sub.instantiate(&construct.output, outer)?;
    sub.launch(&input);

    let mut gates = Vec::new();
    for index in 0..count {
      if ctx.cancel.is_cancelled() {
        info!(instance_id = %ctx.instance.key(), index, "iteration_interrupted");
        break;
      }
      let inner = outer.child(index);
      let next = sub.instantiate(next_id, &inner)?;
      let mut scope = scope_of([&input, &output, &next]);
      let body = sub.instantiate_body(construct, &inner, &mut scope)?;
      ctx.run.wire(&scope)?;

      for instance in &body {
        sub.launch(instance);
      }
      sub.launch(&next);

      if parallel {
        gates.push((index, next));
      } else {
        Self::await_gate(&next, index).await;
      }
    }
    for (index, next) in &gates {
      Self::await_gate(next, *index).await;
    }

    sub.launch(&output);
    output.signal().wait().await;
    Ok(output.status())
  }

  /// Rebuild every referenced result as a list, one element per index.
  fn aggregate(ctx: &NodeCtx, outer: &NestLayout, count: usize) -> Result<Vec<NodeUpdate>, NodeError> {
    let mut updates = Vec::new();
    for (content_id, slot) in ctx.instance.results().iter() {
      let Some(reference) = &slot.reference else {
        continue;
      };
      let reference: ContentRef = reference.parse().map_err(RuntimeError::from)?;
      let path = NodeUpdate::result_path(content_id);

      slot.data.set(&[], json!([]))?;
      updates.push(NodeUpdate::overwrite(path.clone(), json!([])));
      for index in 0..count {
        let value = ctx.run.resolve_ref(&reference, &outer.child(index))?;
        slot.data.push(&[], value.clone())?;
        updates.push(NodeUpdate::append(path.clone(), value));
      }
    }
    Ok(updates)
  }
}

#[async_trait]
impl NodeKind for IterRun {
  fn name(&self) -> &'static str {
    kinds::ITER_RUN
  }

  fn observes_cancel(&self) -> bool {
    true
  }

  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    let items = match ctx.payload_value(ids::ITER_LIST)? {
      Value::Array(items) => items,
      other => {
        return Err(NodeError::failed(format!(
          "{} must resolve to a list, got {}",
          ids::ITER_LIST,
          other
        )));
      }
    };
    let max = ctx.run.config().max_iterations;
    if items.len() > max {
      return Err(NodeError::failed(format!(
        "{} has {} items, limit is {}",
        ids::ITER_LIST,
        items.len(),
        max
      )));
    }
    let count = items.len();
    let parallel = Self::parallel(ctx)?;

    if let Some((_, slot)) = ctx.instance.payloads().find_type(&ContentType::IterItem) {
      slot.data.set(&[], Value::Array(items))?;
    }

    let construct = Construct::of(ctx.run.workflow(), ctx.instance.template_id())?;
    let next_id = construct
      .next
      .clone()
      .ok_or_else(|| NodeError::failed("iteration has no next boundary"))?;
    let outer = ctx.layout().clone();
    info!(instance_id = %ctx.instance.key(), count, parallel, "iteration_started");

    let mut sub = Subgraph::new(ctx);
    let expanded = Self::expand(ctx, &mut sub, &construct, &next_id, count, parallel).await;
    if expanded.is_ok() {
      sub.drain().await;
    } else {
      sub.close().await;
    }
    let status = expanded?;

    if ctx.cancel.is_cancelled() {
      return Err(NodeError::Cancelled);
    }
    if status != RunStatus::Success {
      return Err(NodeError::IterationFailed {
        message: format!("output boundary finished {}", status),
      });
    }

    let updates = Self::aggregate(ctx, &outer, count)?;
    info!(instance_id = %ctx.instance.key(), count, "iteration_completed");
    Ok(updates)
  }

  fn validate(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
    let mut errors = check_content_refs(node, visible);
    match node.payloads.get(ids::ITER_LIST) {
      None => errors.push(format!("missing payload {}", ids::ITER_LIST)),
      Some(entry) if entry.data_ref().is_none() && !entry.data.is_array() => {
        errors.push(format!("{} must be a list or a reference", ids::ITER_LIST))
      }
      Some(_) => {}
    }
    errors
  }

  fn node_config(&self) -> Value {
    json!({
      "label": "Iterate",
      "nested": true,
      "payloads": [ids::ITER_LIST, ids::ITER_CONFIG],
      "boundaries": [kinds::ATTACHED_INPUT, kinds::ATTACHED_OUTPUT, kinds::ATTACHED_NEXT],
    })
  }
}
