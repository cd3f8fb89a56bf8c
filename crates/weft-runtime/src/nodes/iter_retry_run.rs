use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use weft_config::{ContentType, NodeDef, kinds};
use weft_validator::{VisibleVariables, check_content_refs};

use super::ids;
use super::retry_run::attempts;
use crate::error::NodeError;
use crate::expand::{Construct, Subgraph, scope_of};
use crate::instance::NodeInstance;
use crate::node::{NodeCtx, NodeKind};
use crate::progress::NodeUpdate;
use crate::status::RunStatus;

#[derive(Debug, Clone, Deserialize)]
struct RetryInOut {
  /// Seed value of the loop item.
  input: String,
  /// Where each successful attempt leaves the next item.
  output: String,
}

/// Feeds an item through its body repeatedly.
///
/// Every attempt gets fresh `output` and `next` boundaries plus fresh body
/// instances. A successful `output` replaces the current item with the value
/// behind `D_RETRY_INOUT.output`; a successful `next` as well ends the loop
/// with that item as `D_OUTPUT`. Anything else discards the attempt.
pub struct IterRetryRun;

impl IterRetryRun {
  fn inout(ctx: &NodeCtx) -> Result<RetryInOut, NodeError> {
    serde_json::from_value(ctx.payload(ids::RETRY_INOUT)?.data.value())
      .map_err(|e| NodeError::failed(format!("invalid {}: {}", ids::RETRY_INOUT, e)))
  }

  fn set_item(ctx: &NodeCtx, item: &Value) -> Result<(), NodeError> {
    if let Some((_, slot)) = ctx.instance.payloads().find_type(&ContentType::RetryItem) {
      slot.data.set(&[], item.clone())?;
    }
    Ok(())
  }

  async fn attempt_all(
    ctx: &NodeCtx,
    base: &mut Subgraph,
    construct: &Construct,
    next_id: &str,
    inout: &RetryInOut,
    mut item: Value,
    attempts: u32,
  ) -> Result<Vec<NodeUpdate>, NodeError> {
    let layout = ctx.layout();
    let input = base.instantiate(&construct.input, layout)?;
    base.launch(&input);

    for attempt in 1..=attempts {
      if ctx.cancel.is_cancelled() {
        return Err(NodeError::Cancelled);
      }
      let mut sub = Subgraph::new(ctx);
      let settled = Self::attempt(ctx, &mut sub, construct, next_id, &input).await;
      let (output, next) = match settled {
        Ok(statuses) => statuses,
        Err(e) => {
          sub.discard().await;
          return Err(e);
        }
      };

      if output == RunStatus::Success {
        let advanced = ctx
          .run
          .resolve(&inout.output, layout)
          .map_err(NodeError::from)
          .and_then(|value| Self::set_item(ctx, &value).map(|_| value));
        match advanced {
          Ok(value) => item = value,
          Err(e) => {
            sub.discard().await;
            return Err(e);
          }
        }

        if next == RunStatus::Success {
          sub.drain().await;
          info!(instance_id = %ctx.instance.key(), attempt, "iter_retry_converged");
          return Ok(vec![ctx.set_result(ids::OUTPUT, item)?]);
        }
      }

      if ctx.cancel.is_cancelled() {
        sub.close().await;
        return Err(NodeError::Cancelled);
      }
      warn!(
        instance_id = %ctx.instance.key(),
        attempt,
        attempts,
        output = %output,
        next = %next,
        "iter_retry_attempt_failed"
      );
      sub.discard().await;
    }

    Err(NodeError::RetryExhausted { attempts })
  }

  /// Run one attempt; returns the final statuses of its output and next
  /// boundaries.
  async fn attempt(
    ctx: &NodeCtx,
    sub: &mut Subgraph,
    construct: &Construct,
    next_id: &str,
    input: &Arc<NodeInstance>,
  ) -> Result<(RunStatus, RunStatus), NodeError> {
    let layout = ctx.layout();
    let output = sub.instantiate(&construct.output, layout)?;
    let next = sub.instantiate(next_id, layout)?;
    let mut scope = scope_of([input, &output, &next]);
    let body = sub.instantiate_body(construct, layout, &mut scope)?;
    ctx.run.wire(&scope)?;
    for instance in &body {
      sub.launch(instance);
    }
    sub.launch(&output);
    sub.launch(&next);
    output.signal().wait().await;
    next.signal().wait().await;
    Ok((output.status(), next.status()))
  }
}

#[async_trait]
impl NodeKind for IterRetryRun {
  fn name(&self) -> &'static str {
    kinds::ITER_RETRY_RUN
  }

  fn observes_cancel(&self) -> bool {
    true
  }

  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    let attempts = attempts(ctx)?;
    let inout = Self::inout(ctx)?;
    let construct = Construct::of(ctx.run.workflow(), ctx.instance.template_id())?;
    let next_id = construct
      .next
      .clone()
      .ok_or_else(|| NodeError::failed("iterate-retry has no next boundary"))?;

    let item = ctx.resolve(&inout.input)?;
    Self::set_item(ctx, &item)?;

    let mut base = Subgraph::new(ctx);
    let result = Self::attempt_all(ctx, &mut base, &construct, &next_id, &inout, item, attempts).await;
    if result.is_ok() {
      base.drain().await;
    } else {
      base.close().await;
    }
    result
  }

  fn validate(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
    let mut errors = check_content_refs(node, visible);
    let inout = node
      .payloads
      .get(ids::RETRY_INOUT)
      .map(|entry| serde_json::from_value::<RetryInOut>(entry.data.clone()));
    match inout {
      None => errors.push(format!("missing payload {}", ids::RETRY_INOUT)),
      Some(Err(e)) => errors.push(format!("invalid {}: {}", ids::RETRY_INOUT, e)),
      Some(Ok(inout)) => {
        for (side, reference) in [("input", &inout.input), ("output", &inout.output)] {
          if let Err(message) = visible.check_ref(reference) {
            errors.push(format!("{} {}: {}", ids::RETRY_INOUT, side, message));
          }
        }
      }
    }
    if node.results.get(ids::OUTPUT).is_none() {
      errors.push(format!("missing result {}", ids::OUTPUT));
    }
    errors
  }

  fn node_config(&self) -> Value {
    json!({
      "label": "Iterate until accepted",
      "nested": true,
      "payloads": [ids::RETRY_CONFIG, ids::RETRY_INOUT],
      "results": [ids::OUTPUT],
      "boundaries": [kinds::ATTACHED_INPUT, kinds::ATTACHED_OUTPUT, kinds::ATTACHED_NEXT],
    })
  }
}
