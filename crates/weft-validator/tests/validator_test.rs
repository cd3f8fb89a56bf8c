//! Whole-workflow validation scenarios.

use serde_json::{Value, json};
use weft_config::{NodeDef, WorkflowDef};
use weft_validator::{NodeChecker, Validator, VisibleVariables, check_content_refs};

struct RefChecker;

impl NodeChecker for RefChecker {
  fn knows(&self, node_type: &str) -> bool {
    matches!(
      node_type,
      "text_input" | "echo" | "iter_run" | "attached_node_input" | "attached_node_output" | "attached_node_next"
    )
  }

  fn check(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
    check_content_refs(node, visible)
  }
}

/// A task node reading everything wired into `input`, exposing `out`.
fn task(id: &str, node_type: &str, payloads: Value) -> Value {
  json!({
    "node_id": id,
    "node_type": node_type,
    "flags": {"is_task": true},
    "connections": {
      "self": {"self": {"data": {"in": {"type": "FromOuter", "input_key": "input"}}}},
      "inputs": {"input": {}},
      "outputs": {"output": {"data": {"out": {"type": "FromInner", "group": "results", "content_id": "out"}}}}
    },
    "payloads": payloads,
    "results": {"by_id": {"out": {"type": "String", "data": ""}}, "order": ["out"]}
  })
}

fn edge(source: &str, target: &str) -> Value {
  json!({"id": format!("{}-{}", source, target), "source": source, "source_handle": "output", "target": target, "target_handle": "input"})
}

fn workflow(nodes: Vec<Value>, edges: Vec<Value>) -> WorkflowDef {
  serde_json::from_value(json!({"workflow_id": "wf", "nodes": nodes, "edges": edges})).unwrap()
}

fn reads(reference: &str) -> Value {
  json!({"by_id": {"value": {"type": "Object", "data": {"ref": reference}}}, "order": ["value"]})
}

#[test]
fn test_valid_chain_has_no_errors() {
  let def = workflow(
    vec![
      task("a", "text_input", json!({})),
      task("b", "echo", reads("a/results/out")),
      task("c", "echo", reads("a/results/out")),
    ],
    vec![edge("a", "b"), edge("b", "c")],
  );

  let errors = Validator::new(&def, &RefChecker).validate();
  assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

#[test]
fn test_unreachable_reference_reports_once_per_node_in_one_pass() {
  // y is not on any path feeding x or z.
  let def = workflow(
    vec![
      task("a", "text_input", json!({})),
      task("y", "text_input", json!({})),
      task("x", "echo", reads("y/results/out")),
      task("z", "echo", reads("y/results/out")),
    ],
    vec![edge("a", "x"), edge("a", "z")],
  );

  let errors = Validator::new(&def, &RefChecker).validate();
  assert_eq!(errors.len(), 2);

  let x = errors.iter().find(|e| e.node_id == "x").unwrap();
  assert_eq!(x.errors.len(), 1);
  assert!(x.errors[0].contains("y/results/out"));
  assert!(errors.iter().any(|e| e.node_id == "z"));
}

#[test]
fn test_structural_problems_accumulate() {
  let mut def = workflow(
    vec![
      task("a", "text_input", json!({})),
      task("b", "mystery", json!({})),
      task("a", "text_input", json!({})),
    ],
    vec![edge("a", "ghost"), edge("a", "b")],
  );
  def.edges[1].source_handle = "nope".to_string();

  let errors = Validator::new(&def, &RefChecker).validate();
  let a = errors.iter().find(|e| e.node_id == "a").unwrap();
  assert!(a.errors.iter().any(|m| m.contains("duplicate")));
  assert!(a.errors.iter().any(|m| m.contains("ghost")));
  assert!(a.errors.iter().any(|m| m.contains("unknown output handle 'nope'")));

  let b = errors.iter().find(|e| e.node_id == "b").unwrap();
  assert!(b.errors.iter().any(|m| m.contains("unknown node type 'mystery'")));
}

#[test]
fn test_cycle_and_nesting_violations() {
  let mut nested = NodeDef::new("inner", "echo");
  nested.parent = Some("loop".to_string());
  nested.connections.inputs.insert("input".to_string(), Default::default());

  let mut def = workflow(
    vec![
      task("a", "echo", json!({})),
      task("b", "echo", json!({})),
      task("loop", "iter_run", json!({})),
    ],
    vec![edge("a", "b"), edge("b", "a"), edge("a", "inner")],
  );
  def.nodes.push(nested);

  let errors = Validator::new(&def, &RefChecker).validate();
  let all: Vec<String> = errors.iter().flat_map(|e| e.errors.clone()).collect();
  assert!(all.iter().any(|m| m.starts_with("edge cycle")));
  assert!(all.iter().any(|m| m.contains("crosses nesting levels")));
  assert!(all.iter().any(|m| m.contains("missing attached attached_node_input")));
}

#[test]
fn test_variables_lists_upstream_outputs() {
  let def = workflow(
    vec![
      task("a", "text_input", json!({})),
      task("b", "echo", json!({})),
    ],
    vec![edge("a", "b")],
  );

  let mut validator = Validator::new(&def, &RefChecker);
  let visible = validator.variables("b").unwrap();
  let refs: Vec<String> = visible
    .self_vars
    .iter()
    .map(|v| v.reference.to_string())
    .collect();
  assert_eq!(refs, vec!["a/results/out"]);
  assert_eq!(
    validator.input_sources("b", "input"),
    &[("a".to_string(), "output".to_string())]
  );
}
