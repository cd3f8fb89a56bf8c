use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};
use weft_config::kinds;

use super::ids;
use crate::error::NodeError;
use crate::expand::{Construct, Subgraph, copy_referenced_results, scope_of};
use crate::instance::NodeInstance;
use crate::node::{NodeCtx, NodeKind};
use crate::progress::NodeUpdate;
use crate::status::RunStatus;

/// Attempt budget from `D_RETRY_CONFIG.num_retries`, falling back to the
/// runner default. Always at least one.
pub(super) fn attempts(ctx: &NodeCtx) -> Result<u32, NodeError> {
  let configured = ctx
    .payload_value_opt(ids::RETRY_CONFIG)?
    .and_then(|config| config.get("num_retries").and_then(Value::as_u64));
  let attempts = match configured {
    Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
    None => ctx.run.config().default_retries,
  };
  Ok(attempts.max(1))
}

/// Re-runs its body at the same layout until the output boundary succeeds.
///
/// The input boundary lives for the whole node; each attempt gets a fresh
/// output boundary and fresh body instances, all removed again if the
/// attempt fails.
pub struct RetryRun;

impl RetryRun {
  async fn attempt_all(
    ctx: &NodeCtx,
    base: &mut Subgraph,
    construct: &Construct,
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
      let status = Self::attempt(ctx, &mut sub, construct, &input).await;
      if let Ok(RunStatus::Success) = status {
        sub.drain().await;
        let updates = copy_referenced_results(ctx, layout)?;
        info!(instance_id = %ctx.instance.key(), attempt, "retry_succeeded");
        return Ok(updates);
      }

      if ctx.cancel.is_cancelled() {
        sub.close().await;
        return Err(NodeError::Cancelled);
      }
      sub.discard().await;
      status?;
      warn!(instance_id = %ctx.instance.key(), attempt, attempts, "retry_attempt_failed");
    }

    Err(NodeError::RetryExhausted { attempts })
  }

  /// Run one attempt and return its output boundary's final status.
  async fn attempt(
    ctx: &NodeCtx,
    sub: &mut Subgraph,
    construct: &Construct,
    input: &Arc<NodeInstance>,
  ) -> Result<RunStatus, NodeError> {
    let layout = ctx.layout();
    let output = sub.instantiate(&construct.output, layout)?;
    let mut scope = scope_of([input, &output]);
    let body = sub.instantiate_body(construct, layout, &mut scope)?;
    ctx.run.wire(&scope)?;
    for instance in &body {
      sub.launch(instance);
    }
    sub.launch(&output);
    output.signal().wait().await;
    Ok(output.status())
  }
}

#[async_trait]
impl NodeKind for RetryRun {
  fn name(&self) -> &'static str {
    kinds::RETRY_RUN
  }

  fn observes_cancel(&self) -> bool {
    true
  }

  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    let attempts = attempts(ctx)?;
    let construct = Construct::of(ctx.run.workflow(), ctx.instance.template_id())?;

    let mut base = Subgraph::new(ctx);
    let result = Self::attempt_all(ctx, &mut base, &construct, attempts).await;
    if result.is_ok() {
      base.drain().await;
    } else {
      base.close().await;
    }
    result
  }

  fn node_config(&self) -> Value {
    json!({
      "label": "Retry",
      "nested": true,
      "payloads": [ids::RETRY_CONFIG],
      "boundaries": [kinds::ATTACHED_INPUT, kinds::ATTACHED_OUTPUT],
    })
  }
}
