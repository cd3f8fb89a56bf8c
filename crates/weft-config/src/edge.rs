use serde::{Deserialize, Serialize};

/// A connection from a source node's output handle to a target node's input handle.
///
/// Edges are only meaningful between nodes that share the same nesting parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
  #[serde(default)]
  pub id: String,
  pub source: String,
  pub source_handle: String,
  pub target: String,
  pub target_handle: String,
}

impl EdgeDef {
  pub fn new(
    source: impl Into<String>,
    source_handle: impl Into<String>,
    target: impl Into<String>,
    target_handle: impl Into<String>,
  ) -> Self {
    let source = source.into();
    let target = target.into();
    Self {
      id: format!("{}->{}", source, target),
      source,
      source_handle: source_handle.into(),
      target,
      target_handle: target_handle.into(),
    }
  }
}
