use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use weft_config::NodeDef;
use weft_validator::{NodeChecker, VisibleVariables};

use crate::node::NodeKind;
use crate::nodes;

/// Lookup from type tag to node kind.
#[derive(Clone, Default)]
pub struct NodeRegistry {
  kinds: BTreeMap<String, Arc<dyn NodeKind>>,
}

impl NodeRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding every built-in kind.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    nodes::register_builtins(&mut registry);
    registry
  }

  /// Register a kind under its own name, replacing any previous kind.
  pub fn register<K: NodeKind + 'static>(&mut self, kind: K) -> &mut Self {
    self.kinds.insert(kind.name().to_string(), Arc::new(kind));
    self
  }

  pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeKind>> {
    self.kinds.get(node_type).cloned()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.kinds.keys().map(String::as_str)
  }

  /// `node_config` of every kind, keyed by type tag.
  pub fn configs(&self) -> BTreeMap<String, Value> {
    self
      .kinds
      .iter()
      .map(|(name, kind)| (name.clone(), kind.node_config()))
      .collect()
  }
}

impl NodeChecker for NodeRegistry {
  fn knows(&self, node_type: &str) -> bool {
    self.kinds.contains_key(node_type)
  }

  fn check(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
    match self.kinds.get(&node.node_type) {
      Some(kind) => kind.validate(node, visible),
      None => Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_config::kinds;

  #[test]
  fn test_builtins_are_registered() {
    let registry = NodeRegistry::with_builtins();
    for name in [
      kinds::ATTACHED_INPUT,
      kinds::ATTACHED_OUTPUT,
      kinds::ATTACHED_NEXT,
      kinds::ITER_RUN,
      kinds::RETRY_RUN,
      kinds::ITER_RETRY_RUN,
      kinds::TEXT_INPUT,
      kinds::COND_BRANCH,
      kinds::BRANCH_AGGREGATE,
      kinds::JINJA2_TEMPLATE,
    ] {
      assert!(registry.knows(name), "missing {}", name);
    }
    assert!(!registry.knows("python_code"));
    assert_eq!(registry.configs().len(), registry.names().count());
  }
}
