use async_trait::async_trait;
use serde_json::{Value, json};
use weft_config::kinds;

use crate::error::NodeError;
use crate::node::{NodeCtx, NodeKind};
use crate::progress::NodeUpdate;

/// Publishes its authored results unchanged.
pub struct TextInput;

#[async_trait]
impl NodeKind for TextInput {
  fn name(&self) -> &'static str {
    kinds::TEXT_INPUT
  }

  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    Ok(
      ctx
        .instance
        .results()
        .iter()
        .map(|(id, slot)| NodeUpdate::overwrite(NodeUpdate::result_path(id), slot.data.value()))
        .collect(),
    )
  }

  fn node_config(&self) -> Value {
    json!({ "label": "Text input", "results": ["String"] })
  }
}
