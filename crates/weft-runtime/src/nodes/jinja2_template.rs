use async_trait::async_trait;
use minijinja::Environment;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::warn;
use weft_config::{ContentRef, NodeDef, kinds};
use weft_reactive::PathSegment;
use weft_validator::{VisibleVariables, check_content_refs};

use super::ids;
use crate::error::{NodeError, RuntimeError};
use crate::node::{NodeCtx, NodeKind};
use crate::progress::{ChannelKey, NodeUpdate, ProgressEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VarKind {
  Ref,
  Value,
}

#[derive(Debug, Clone, Deserialize)]
struct VarInput {
  key: String,
  #[serde(rename = "type")]
  kind: VarKind,
  #[serde(default)]
  value: Value,
}

/// Passive live view: renders a template over referenced values and
/// streams every change to those values to its own channel.
pub struct Jinja2Template;

impl Jinja2Template {
  fn vars(ctx: &NodeCtx) -> Result<Vec<VarInput>, NodeError> {
    let raw = ctx.payload_value(ids::VARS_INPUT)?;
    serde_json::from_value(raw)
      .map_err(|e| NodeError::failed(format!("invalid {}: {}", ids::VARS_INPUT, e)))
  }

  fn render(ctx: &NodeCtx) -> Result<String, NodeError> {
    let source = ctx.payload_value(ids::TEMPLATE)?;
    let source = source
      .as_str()
      .ok_or_else(|| NodeError::failed(format!("{} must be a string", ids::TEMPLATE)))?;

    let mut values = Map::new();
    for var in Self::vars(ctx)? {
      let value = match (var.kind, var.value.as_str()) {
        (VarKind::Ref, Some(reference)) => ctx.resolve(reference)?,
        _ => var.value,
      };
      values.insert(var.key, value);
    }

    Environment::new()
      .render_str(source, Value::Object(values))
      .map_err(|e| NodeError::failed(format!("template render failed: {}", e)))
  }
}

#[async_trait]
impl NodeKind for Jinja2Template {
  fn name(&self) -> &'static str {
    kinds::JINJA2_TEMPLATE
  }

  fn is_passive(&self) -> bool {
    true
  }

  async fn run(&self, _ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    Ok(Vec::new())
  }

  fn attach(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    let run_id = ctx.run.run_id().to_string();
    let instance_id = ctx.instance.id();
    let channel = ChannelKey::node(&run_id, &instance_id);
    ctx.run.progress().create(channel.clone());

    for var in Self::vars(ctx)? {
      let (VarKind::Ref, Some(reference)) = (var.kind, var.value.as_str()) else {
        continue;
      };
      let reference: ContentRef = reference.parse().map_err(RuntimeError::from)?;
      let reactive = ctx.run.reactive(&reference, ctx.layout())?;

      let progress = ctx.run.progress().clone();
      let channel = channel.clone();
      let run_id = run_id.clone();
      let instance_id = instance_id.clone();
      let original_id = ctx.instance.template_id().to_string();
      let prefix: Vec<PathSegment> = vec![var.key.clone().into()];
      let id = reactive.subscribe(move |mutation| {
        progress.put(
          &channel,
          ProgressEvent::UpdateNode {
            run_id: run_id.clone(),
            instance_id: instance_id.clone(),
            original_id: original_id.clone(),
            updates: vec![NodeUpdate::from_mutation(&prefix, mutation)],
          },
        );
      });
      ctx.instance.track_subscription(reactive, id);
    }

    Ok(self.current_data(ctx))
  }

  fn current_data(&self, ctx: &NodeCtx) -> Vec<NodeUpdate> {
    let mut updates = ctx.instance.status_updates();
    match Self::render(ctx) {
      Ok(rendered) => updates.push(NodeUpdate::overwrite(
        NodeUpdate::result_path(ids::OUTPUT),
        Value::String(rendered),
      )),
      Err(e) => warn!(instance_id = %ctx.instance.key(), error = %e, "template_render_failed"),
    }
    updates
  }

  async fn process_request(&self, ctx: &NodeCtx, payload: Value) -> Result<Value, NodeError> {
    match payload.get("action").and_then(|a| a.as_str()) {
      Some("render") => Ok(json!({ "rendered": Self::render(ctx)? })),
      other => Err(NodeError::failed(format!("unknown action {:?}", other))),
    }
  }

  fn validate(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
    let mut errors = check_content_refs(node, visible);
    match node.payloads.get(ids::TEMPLATE).map(|e| &e.data) {
      Some(Value::String(source)) => {
        let env = Environment::new();
        if let Err(e) = env.template_from_str(source) {
          errors.push(format!("{}: {}", ids::TEMPLATE, e));
        }
      }
      Some(_) => errors.push(format!("{} must be a string", ids::TEMPLATE)),
      None => errors.push(format!("missing payload {}", ids::TEMPLATE)),
    }
    let vars = node
      .payloads
      .get(ids::VARS_INPUT)
      .map(|entry| serde_json::from_value::<Vec<VarInput>>(entry.data.clone()));
    if let Some(Err(e)) = vars {
      errors.push(format!("invalid {}: {}", ids::VARS_INPUT, e));
    }
    errors
  }

  fn node_config(&self) -> Value {
    json!({ "label": "Template", "passive": true, "payloads": [ids::VARS_INPUT, ids::TEMPLATE] })
  }
}
