use async_trait::async_trait;
use serde_json::{Value, json};
use weft_config::{AttachedRole, NodeDef};
use weft_validator::VisibleVariables;

use crate::error::NodeError;
use crate::node::{NodeCtx, NodeKind};
use crate::progress::NodeUpdate;

/// Synthetic boundary of a nested construct. Succeeds once its join passes.
pub struct Boundary {
  role: AttachedRole,
}

impl Boundary {
  pub fn new(role: AttachedRole) -> Self {
    Self { role }
  }
}

#[async_trait]
impl NodeKind for Boundary {
  fn name(&self) -> &'static str {
    self.role.node_type()
  }

  async fn run(&self, _ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    Ok(Vec::new())
  }

  fn validate(&self, _node: &NodeDef, _visible: &VisibleVariables) -> Vec<String> {
    Vec::new()
  }

  fn node_config(&self) -> Value {
    json!({ "attached": true, "role": self.role })
  }
}
