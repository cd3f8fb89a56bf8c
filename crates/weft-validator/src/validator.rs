use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use weft_config::{AttachedRole, NodeDef, WorkflowDef, kinds};

use crate::graph::HandleGraph;
use crate::variables::{VariableFinder, VisibleVariables};

/// All problems found for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
  pub node_id: String,
  pub errors: Vec<String>,
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.node_id, self.errors.join("; "))
  }
}

/// Per-type checks, supplied by whoever knows the node kinds.
pub trait NodeChecker {
  /// Whether `node_type` names a known kind.
  fn knows(&self, node_type: &str) -> bool;

  /// Problems with one node, given the variables it can see.
  fn check(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String>;
}

/// Validates one workflow definition.
pub struct Validator<'a, C: NodeChecker> {
  def: &'a WorkflowDef,
  checker: &'a C,
  graph: HandleGraph,
  finder: VariableFinder<'a>,
}

#[derive(Default)]
struct Errors(BTreeMap<String, Vec<String>>);

impl Errors {
  fn push(&mut self, node_id: &str, message: String) {
    self.0.entry(node_id.to_string()).or_default().push(message);
  }
}

impl<'a, C: NodeChecker> Validator<'a, C> {
  pub fn new(def: &'a WorkflowDef, checker: &'a C) -> Self {
    Self {
      def,
      checker,
      graph: HandleGraph::new(def),
      finder: VariableFinder::new(def),
    }
  }

  /// Run every check, returning one record per node with problems.
  ///
  /// An empty result means the workflow is valid.
  pub fn validate(&mut self) -> Vec<ValidationError> {
    let mut errors = Errors::default();

    self.check_nodes(&mut errors);
    self.check_edges(&mut errors);

    if let Some(node_id) = self.graph.detect_cycle() {
      errors.push(&node_id, format!("edge cycle through '{}'", node_id));
    }

    let def = self.def;
    for node in &def.nodes {
      if !self.checker.knows(&node.node_type) {
        continue;
      }
      let visible = self.finder.visible_for(node);
      for message in self.checker.check(node, &visible) {
        errors.push(&node.node_id, message);
      }
    }

    let records: Vec<ValidationError> = errors
      .0
      .into_iter()
      .map(|(node_id, errors)| ValidationError { node_id, errors })
      .collect();

    debug!(
      workflow_id = %def.workflow_id,
      invalid_nodes = records.len(),
      "workflow_validated"
    );

    records
  }

  /// Variables visible to one node, for reference pickers.
  pub fn variables(&mut self, node_id: &str) -> Option<VisibleVariables> {
    let node = self.def.node(node_id)?;
    Some(self.finder.visible_for(node))
  }

  /// `(source node, source handle)` pairs wired into an input handle.
  pub fn input_sources(&self, node_id: &str, handle: &str) -> &[(String, String)] {
    self.graph.upstream(node_id, handle)
  }

  fn check_nodes(&self, errors: &mut Errors) {
    let mut seen = HashSet::new();
    for node in &self.def.nodes {
      if !seen.insert(node.node_id.as_str()) {
        errors.push(&node.node_id, "duplicate node id".to_string());
      }
      if node.node_id.contains('#') || node.node_id.contains('/') {
        errors.push(
          &node.node_id,
          "node id may not contain '#' or '/'".to_string(),
        );
      }
      if !self.checker.knows(&node.node_type) {
        errors.push(
          &node.node_id,
          format!("unknown node type '{}'", node.node_type),
        );
      }
      if let Some(parent) = &node.parent {
        if self.def.node(parent).is_none() {
          errors.push(&node.node_id, format!("parent '{}' does not exist", parent));
        } else if self.def.depth_of(&node.node_id).is_none() {
          errors.push(&node.node_id, "parent chain is cyclic".to_string());
        }
      }
      for role in required_boundaries(&node.node_type) {
        if self.def.attached_child(&node.node_id, *role).is_none() {
          errors.push(
            &node.node_id,
            format!("missing attached {} boundary", role.node_type()),
          );
        }
      }
    }
  }

  fn check_edges(&self, errors: &mut Errors) {
    for edge in &self.def.edges {
      let source = self.def.node(&edge.source);
      let target = self.def.node(&edge.target);

      let (source, target) = match (source, target) {
        (Some(s), Some(t)) => (s, t),
        (s, t) => {
          let owner = s
            .or(t)
            .map(|n| n.node_id.as_str())
            .unwrap_or(edge.id.as_str());
          for (id, node) in [(&edge.source, s), (&edge.target, t)] {
            if node.is_none() {
              errors.push(
                owner,
                format!("edge '{}' references unknown node '{}'", edge.id, id),
              );
            }
          }
          continue;
        }
      };

      if !source.has_output(&edge.source_handle) {
        errors.push(
          &source.node_id,
          format!("edge '{}' leaves unknown output handle '{}'", edge.id, edge.source_handle),
        );
      }
      if !target.has_input(&edge.target_handle) {
        errors.push(
          &target.node_id,
          format!("edge '{}' enters unknown input handle '{}'", edge.id, edge.target_handle),
        );
      }
      if source.parent != target.parent {
        errors.push(
          &target.node_id,
          format!("edge from '{}' crosses nesting levels", source.node_id),
        );
      }
    }
  }
}

/// Boundary children a nested construct cannot run without.
fn required_boundaries(node_type: &str) -> &'static [AttachedRole] {
  match node_type {
    kinds::ITER_RUN | kinds::ITER_RETRY_RUN => &[
      AttachedRole::Input,
      AttachedRole::Output,
      AttachedRole::Next,
    ],
    kinds::RETRY_RUN => &[AttachedRole::Input, AttachedRole::Output],
    _ => &[],
  }
}
