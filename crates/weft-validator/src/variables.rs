//! Visible-variable analysis.
//!
//! A node sees the variables its `self` handles draw from. Each connection
//! source expands recursively: `FromInner` yields one of the node's own
//! entries, `FromOuter` follows the edges into an input handle back to the
//! feeding node's output handle, `FromAttached` descends into a boundary
//! child, and `FromParent` climbs one nesting level to the enclosing
//! construct's attach handles and inputs.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use weft_config::{
  AttachedRole, Connection, ConnectionSource, ContentGroup, ContentRef, NodeDef, WorkflowDef,
};

/// A variable a node may reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VarItem {
  pub reference: ContentRef,
  pub node_id: String,
  pub node_label: String,
  pub label: String,
  pub key: String,
  pub content_type: String,
}

/// Variables reaching one input handle from one upstream output handle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpstreamVars {
  pub input_handle: String,
  pub node_id: String,
  pub output_handle: String,
  pub vars: BTreeSet<VarItem>,
}

/// Everything a node's checks may consult.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VisibleVariables {
  /// Variables behind the node's `self` handles.
  pub self_vars: BTreeSet<VarItem>,
  /// Variables exposed by the node's attached output boundary, if it has one.
  pub attach_output: BTreeSet<VarItem>,
  /// Per input handle, what each wired predecessor exposes.
  pub upstream: Vec<UpstreamVars>,
}

impl VisibleVariables {
  pub fn can_see(&self, reference: &ContentRef) -> bool {
    self
      .self_vars
      .iter()
      .chain(self.attach_output.iter())
      .any(|v| &v.reference == reference)
  }

  /// Parse and look up a reference string, describing the failure.
  pub fn check_ref(&self, reference: &str) -> Result<ContentRef, String> {
    let parsed: ContentRef = reference.parse().map_err(|e| format!("{}", e))?;
    if self.can_see(&parsed) {
      Ok(parsed)
    } else {
      Err(format!("reference '{}' is not visible to this node", reference))
    }
  }

  pub fn upstream_of(&self, node_id: &str, output_handle: &str) -> Option<&UpstreamVars> {
    self
      .upstream
      .iter()
      .find(|u| u.node_id == node_id && u.output_handle == output_handle)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
  Self_,
  Attach,
  Inputs,
  Outputs,
}

impl HandleKind {
  fn of(self, node: &NodeDef) -> &std::collections::BTreeMap<String, Connection> {
    match self {
      HandleKind::Self_ => &node.connections.self_,
      HandleKind::Attach => &node.connections.attach,
      HandleKind::Inputs => &node.connections.inputs,
      HandleKind::Outputs => &node.connections.outputs,
    }
  }
}

type FindKey = (String, HandleKind, String);

/// Memoized recursive variable lookup over one workflow.
pub(crate) struct VariableFinder<'a> {
  def: &'a WorkflowDef,
  memo: HashMap<FindKey, BTreeSet<VarItem>>,
  active: HashSet<FindKey>,
}

impl<'a> VariableFinder<'a> {
  pub(crate) fn new(def: &'a WorkflowDef) -> Self {
    Self {
      def,
      memo: HashMap::new(),
      active: HashSet::new(),
    }
  }

  pub(crate) fn visible_for(&mut self, node: &NodeDef) -> VisibleVariables {
    let def = self.def;
    let mut visible = VisibleVariables::default();

    for handle in node.connections.self_.keys() {
      let found = self.find(&node.node_id, HandleKind::Self_, handle);
      visible.self_vars.extend(found);
    }

    if let Some(output) = def.attached_child(&node.node_id, AttachedRole::Output) {
      for handle in output.connections.self_.keys() {
        let found = self.find(&output.node_id, HandleKind::Self_, handle);
        visible.attach_output.extend(found);
      }
    }

    for input_handle in node.connections.inputs.keys() {
      for edge in def.edges_into(&node.node_id, input_handle) {
        let vars = self.find(&edge.source, HandleKind::Outputs, &edge.source_handle);
        visible.upstream.push(UpstreamVars {
          input_handle: input_handle.clone(),
          node_id: edge.source.clone(),
          output_handle: edge.source_handle.clone(),
          vars,
        });
      }
    }

    visible
  }

  /// Variables behind one handle of one node.
  pub(crate) fn find(&mut self, node_id: &str, kind: HandleKind, handle: &str) -> BTreeSet<VarItem> {
    let key = (node_id.to_string(), kind, handle.to_string());
    if let Some(hit) = self.memo.get(&key) {
      return hit.clone();
    }
    if !self.active.insert(key.clone()) {
      // Already on the stack: a wiring cycle, reported by the structural checks.
      return BTreeSet::new();
    }

    let def = self.def;
    let mut found = BTreeSet::new();

    let connection = def
      .node(node_id)
      .and_then(|node| kind.of(node).get(handle).map(|c| (node, c)));

    if let Some((node, connection)) = connection {
      for source in connection.data.values() {
        match source {
          ConnectionSource::FromInner { group, content_id } => {
            if let Some(item) = self.var_item(node, *group, content_id) {
              found.insert(item);
            }
          }
          ConnectionSource::FromOuter { input_key } => {
            for edge in def.edges_into(node_id, input_key) {
              found.extend(self.find(&edge.source, HandleKind::Outputs, &edge.source_handle));
            }
          }
          ConnectionSource::FromAttached { atype } => {
            if let Some(child) = def.attached_child(node_id, *atype) {
              let (child_kind, handles) = match atype {
                AttachedRole::Output => (HandleKind::Self_, &child.connections.self_),
                _ => (HandleKind::Outputs, &child.connections.outputs),
              };
              for child_handle in handles.keys() {
                found.extend(self.find(&child.node_id, child_kind, child_handle));
              }
            }
          }
          ConnectionSource::FromParent => {
            if let Some(parent) = node.parent.as_deref().and_then(|p| def.node(p)) {
              for parent_handle in parent.connections.attach.keys() {
                found.extend(self.find(&parent.node_id, HandleKind::Attach, parent_handle));
              }
              for parent_handle in parent.connections.inputs.keys() {
                found.extend(self.find(&parent.node_id, HandleKind::Inputs, parent_handle));
              }
            }
          }
        }
      }
    }

    self.active.remove(&key);
    self.memo.insert(key, found.clone());
    found
  }

  fn var_item(&self, node: &NodeDef, group: ContentGroup, content_id: &str) -> Option<VarItem> {
    let entry = node.content(group).get(content_id)?;
    let depth = self.def.depth_of(&node.node_id)?;
    Some(VarItem {
      reference: ContentRef::new(node.node_id.clone(), depth, group, content_id),
      node_id: node.node_id.clone(),
      node_label: node.display_label().to_string(),
      label: entry.label.clone(),
      key: entry.key.clone(),
      content_type: entry.content_type.as_str().to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  /// `iter` loops over a root list; `double` inside reads the current item.
  fn iteration_workflow() -> WorkflowDef {
    serde_json::from_value(json!({
      "workflow_id": "wf",
      "nodes": [
        {
          "node_id": "src", "node_type": "text_input", "flags": {"is_task": true},
          "connections": {
            "outputs": {"output": {"data": {"list": {"type": "FromInner", "group": "results", "content_id": "list"}}}}
          },
          "results": {"by_id": {"list": {"type": "Object", "data": [1, 2, 3]}}, "order": ["list"]}
        },
        {
          "node_id": "iter", "node_type": "iter_run", "flags": {"is_task": true},
          "connections": {
            "self": {"self": {"data": {"in": {"type": "FromOuter", "input_key": "input"}}}},
            "attach": {"attach": {"data": {"item": {"type": "FromInner", "group": "payloads", "content_id": "item"}}}},
            "inputs": {"input": {"data": {"outer": {"type": "FromOuter", "input_key": "input"}}}},
            "outputs": {"output": {}}
          },
          "payloads": {"by_id": {"item": {"type": "IterItem", "data": []}}, "order": ["item"]}
        },
        {
          "node_id": "iter_in", "node_type": "attached_node_input", "parent": "iter",
          "flags": {"is_attached": true},
          "connections": {"outputs": {"output": {"data": {"p": {"type": "FromParent"}}}}}
        },
        {
          "node_id": "iter_out", "node_type": "attached_node_output", "parent": "iter",
          "flags": {"is_attached": true},
          "connections": {
            "self": {"self": {"data": {"in": {"type": "FromOuter", "input_key": "input"}}}},
            "inputs": {"input": {}}
          }
        },
        {
          "node_id": "double", "node_type": "double", "parent": "iter", "flags": {"is_task": true},
          "connections": {
            "self": {"self": {"data": {"in": {"type": "FromOuter", "input_key": "input"}}}},
            "inputs": {"input": {}},
            "outputs": {"output": {"data": {"out": {"type": "FromInner", "group": "results", "content_id": "out"}}}}
          },
          "results": {"by_id": {"out": {"type": "Integer", "data": 0}}, "order": ["out"]}
        }
      ],
      "edges": [
        {"source": "src", "source_handle": "output", "target": "iter", "target_handle": "input"},
        {"source": "iter_in", "source_handle": "output", "target": "double", "target_handle": "input"},
        {"source": "double", "source_handle": "output", "target": "iter_out", "target_handle": "input"}
      ]
    }))
    .unwrap()
  }

  fn refs(vars: &BTreeSet<VarItem>) -> Vec<String> {
    vars.iter().map(|v| v.reference.to_string()).collect()
  }

  #[test]
  fn test_from_outer_follows_edges() {
    let def = iteration_workflow();
    let mut finder = VariableFinder::new(&def);
    let visible = finder.visible_for(def.node("iter").unwrap());
    assert_eq!(refs(&visible.self_vars), vec!["src/results/list"]);
  }

  #[test]
  fn test_body_sees_parent_inputs_and_attach() {
    let def = iteration_workflow();
    let mut finder = VariableFinder::new(&def);
    let visible = finder.visible_for(def.node("double").unwrap());
    assert_eq!(
      refs(&visible.self_vars),
      vec!["iter/payloads/item", "src/results/list"]
    );
  }

  #[test]
  fn test_attach_output_exposes_body_results_one_level_deeper() {
    let def = iteration_workflow();
    let mut finder = VariableFinder::new(&def);
    let visible = finder.visible_for(def.node("iter").unwrap());
    assert_eq!(refs(&visible.attach_output), vec!["double#/results/out"]);
    assert!(visible.check_ref("double#/results/out").is_ok());
    assert!(visible.check_ref("double/results/out").is_err());
  }

  #[test]
  fn test_upstream_vars_per_input() {
    let def = iteration_workflow();
    let mut finder = VariableFinder::new(&def);
    let visible = finder.visible_for(def.node("iter").unwrap());
    let upstream = visible.upstream_of("src", "output").unwrap();
    assert_eq!(upstream.input_handle, "input");
    assert_eq!(refs(&upstream.vars), vec!["src/results/list"]);
  }
}
