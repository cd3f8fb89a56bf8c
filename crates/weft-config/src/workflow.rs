use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::kinds;
use crate::node::{AttachedRole, NodeDef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub workflow_id: String,
  #[serde(default)]
  pub name: String,
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
}

impl WorkflowDef {
  pub fn node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.node_id == node_id)
  }

  /// Root-level nodes.
  pub fn roots(&self) -> impl Iterator<Item = &NodeDef> {
    self.nodes.iter().filter(|n| n.parent.is_none())
  }

  /// Task and attached children of a nested construct.
  pub fn children<'a>(&'a self, parent_id: &str) -> impl Iterator<Item = &'a NodeDef> + use<'a> {
    let parent_id = parent_id.to_string();
    self.nodes.iter().filter(move |n| {
      n.parent.as_deref() == Some(parent_id.as_str()) && (n.flags.is_task || n.flags.is_attached)
    })
  }

  /// The attached child of `parent_id` playing `role`.
  pub fn attached_child(&self, parent_id: &str, role: AttachedRole) -> Option<&NodeDef> {
    self
      .children(parent_id)
      .find(|n| n.flags.is_attached && n.attached_role() == Some(role))
  }

  /// Edges ending at the given input handle of `node_id`.
  pub fn edges_into<'a>(
    &'a self,
    node_id: &'a str,
    handle: &'a str,
  ) -> impl Iterator<Item = &'a EdgeDef> {
    self
      .edges
      .iter()
      .filter(move |e| e.target == node_id && e.target_handle == handle)
  }

  /// Nesting depth of a node: the number of enclosing iteration levels that
  /// give its instances an index segment.
  ///
  /// Input and output boundaries of an iteration share the iteration node's
  /// depth; its `next` boundary and body nodes sit one level deeper. Retry
  /// constructs never add depth. Returns `None` for unknown nodes or a
  /// cyclic parent chain.
  pub fn depth_of(&self, node_id: &str) -> Option<usize> {
    let mut current = self.node(node_id)?;
    let mut depth = 0;
    let mut hops = 0;

    while let Some(parent_id) = &current.parent {
      let parent = self.node(parent_id)?;
      let boundary = matches!(
        current.attached_role(),
        Some(AttachedRole::Input | AttachedRole::Output)
      );
      if parent.node_type == kinds::ITER_RUN && !boundary {
        depth += 1;
      }

      hops += 1;
      if hops > self.nodes.len() {
        return None;
      }
      current = parent;
    }

    Some(depth)
  }
}
