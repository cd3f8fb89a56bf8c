use serde::{Deserialize, Serialize};

use crate::connection::Connections;
use crate::content::{ContentGroup, Contents};
use crate::kinds;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
  #[serde(default)]
  pub is_task: bool,
  #[serde(default)]
  pub is_attached: bool,
  #[serde(default)]
  pub is_passive: bool,
}

/// Boundary role of an attached child inside a nested construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachedRole {
  Input,
  Output,
  Next,
}

impl AttachedRole {
  pub fn from_node_type(node_type: &str) -> Option<Self> {
    match node_type {
      kinds::ATTACHED_INPUT => Some(AttachedRole::Input),
      kinds::ATTACHED_OUTPUT => Some(AttachedRole::Output),
      kinds::ATTACHED_NEXT => Some(AttachedRole::Next),
      _ => None,
    }
  }

  pub fn node_type(&self) -> &'static str {
    match self {
      AttachedRole::Input => kinds::ATTACHED_INPUT,
      AttachedRole::Output => kinds::ATTACHED_OUTPUT,
      AttachedRole::Next => kinds::ATTACHED_NEXT,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  pub node_type: String,
  #[serde(default)]
  pub label: String,
  /// Enclosing construct, `None` for root-level nodes.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
  #[serde(default)]
  pub flags: NodeFlags,
  #[serde(default)]
  pub connections: Connections,
  #[serde(default)]
  pub payloads: Contents,
  #[serde(default)]
  pub results: Contents,
}

impl NodeDef {
  pub fn new(node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
    let node_type = node_type.into();
    let is_attached = AttachedRole::from_node_type(&node_type).is_some();
    Self {
      node_id: node_id.into(),
      node_type,
      label: String::new(),
      parent: None,
      flags: NodeFlags {
        is_task: !is_attached,
        is_attached,
        is_passive: false,
      },
      connections: Connections::default(),
      payloads: Contents::default(),
      results: Contents::default(),
    }
  }

  /// Boundary role, for attached children.
  pub fn attached_role(&self) -> Option<AttachedRole> {
    AttachedRole::from_node_type(&self.node_type)
  }

  /// Output handle names, in sorted order.
  pub fn output_handles(&self) -> impl Iterator<Item = &String> {
    self.connections.outputs.keys()
  }

  pub fn has_input(&self, handle: &str) -> bool {
    self.connections.inputs.contains_key(handle)
  }

  pub fn has_output(&self, handle: &str) -> bool {
    self.connections.outputs.contains_key(handle)
  }

  pub fn content(&self, group: ContentGroup) -> &Contents {
    match group {
      ContentGroup::Payloads => &self.payloads,
      ContentGroup::Results => &self.results,
    }
  }

  /// Display label, falling back to the id.
  pub fn display_label(&self) -> &str {
    if self.label.is_empty() {
      &self.node_id
    } else {
      &self.label
    }
  }
}
