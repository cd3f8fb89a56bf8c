mod common;

use std::time::Duration;

use common::*;
use serde_json::{Value, json};
use weft_runtime::{ChannelKey, ProgressEvent, ProgressRegistry, RunStatus, RunnerConfig, WorkflowRun};

async fn run_loop(list: serde_json::Value, parallel: bool) -> (weft_runtime::RunOutcome, Vec<ProgressEvent>) {
  let progress = ProgressRegistry::new();
  let run = WorkflowRun::build(
    iteration_workflow(list, parallel),
    &registry(),
    progress.clone(),
    RunnerConfig::default(),
  )
  .unwrap();
  progress.create(ChannelKey::graph(run.run_id()));

  let outcome = run.run().await.unwrap();
  let events = drain_events(&progress, run.run_id()).await;
  (outcome, events)
}

#[tokio::test]
async fn test_sequential_iteration_collects_in_order() {
  let (outcome, events) = run_loop(json!([1, 2, 3]), false).await;

  assert_eq!(outcome.status, RunStatus::Success);
  let results = &outcome.node("loop").unwrap().data["results"];
  assert_eq!(results["doubled"], json!([2, 4, 6]));

  for (i, expected) in [2, 4, 6].iter().enumerate() {
    let body = outcome.node(&format!("double#{}", i)).unwrap();
    assert_eq!(body.status, "Success");
    assert_eq!(body.original_id, "double");
    assert_eq!(body.parent.as_deref(), Some("loop"));
    assert_eq!(body.data["results"]["out"], *expected);
  }
  assert_eq!(finished_count(&events), 1);
}

#[tokio::test]
async fn test_parallel_iteration_keeps_index_order() {
  // Later items finish first, the aggregate still follows the list.
  let (outcome, _) = run_loop(json!([1, 2, 3]), true).await;

  assert_eq!(outcome.status, RunStatus::Success);
  assert_eq!(
    outcome.node("loop").unwrap().data["results"]["doubled"],
    json!([2, 4, 6])
  );
}

#[tokio::test]
async fn test_iteration_item_payload_holds_the_list() {
  let (outcome, _) = run_loop(json!([5, 7]), false).await;

  let payloads = &outcome.node("loop").unwrap().data["payloads"];
  assert_eq!(payloads["item"], json!([5, 7]));
  assert_eq!(
    outcome.node("double#1").unwrap().data["results"]["out"],
    json!(14)
  );
}

#[tokio::test]
async fn test_empty_list_yields_empty_results() {
  let (outcome, _) = run_loop(json!([]), false).await;

  assert_eq!(outcome.status, RunStatus::Success);
  assert_eq!(status(&outcome, "loop"), "Success");
  assert_eq!(outcome.node("loop").unwrap().data["results"]["doubled"], json!([]));
  assert!(outcome.node("double#0").is_none());
}

#[tokio::test]
async fn test_non_list_source_fails_the_construct() {
  let (outcome, events) = run_loop(json!("not a list"), false).await;

  assert_eq!(outcome.status, RunStatus::Error);
  assert_eq!(status(&outcome, "loop"), "Error");
  assert!(outcome.node("double#0").is_none());
  assert_eq!(finished_count(&events), 1);
}

#[tokio::test]
async fn test_iteration_limit_is_enforced() {
  let progress = ProgressRegistry::new();
  let config = RunnerConfig {
    max_iterations: 2,
    ..RunnerConfig::default()
  };
  let run = WorkflowRun::build(
    iteration_workflow(json!([1, 2, 3]), false),
    &registry(),
    progress.clone(),
    config,
  )
  .unwrap();

  let outcome = run.run().await.unwrap();
  assert_eq!(status(&outcome, "loop"), "Error");
  assert!(
    outcome.node("loop").unwrap().data["error"]
      .as_str()
      .unwrap()
      .contains('3')
  );
}

#[tokio::test]
async fn test_failing_body_fails_the_construct() {
  let def = iteration_workflow_with(json!([1, 2]), false, "fail");

  let progress = ProgressRegistry::new();
  let run = WorkflowRun::build(def, &registry(), progress.clone(), RunnerConfig::default()).unwrap();
  let outcome = run.run().await.unwrap();

  assert_eq!(outcome.status, RunStatus::Error);
  assert_eq!(status(&outcome, "loop"), "Error");
  assert_eq!(status(&outcome, "double#0"), "Error");
  assert_eq!(status(&outcome, "double#1"), "Error");
  assert_eq!(status(&outcome, "loop_out"), "Canceled");
  assert!(
    outcome.node("loop").unwrap().data["error"]
      .as_str()
      .unwrap()
      .contains("Canceled")
  );
  for node in &outcome.nodes {
    assert!(node.status != "Pending" && node.status != "Running", "{:?}", node);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_mid_iteration_settles_every_instance() {
  for parallel in [false, true] {
    let run = WorkflowRun::build(
      iteration_workflow_with(json!([1, 2, 3]), parallel, "sleep"),
      &registry(),
      ProgressRegistry::new(),
      RunnerConfig::default(),
    )
    .unwrap();

    let outcome = stop_after(run, Duration::from_millis(50)).await;
    assert_eq!(outcome.status, RunStatus::Canceled);
    assert!(unsettled(&outcome).is_empty(), "{:?}", unsettled(&outcome));
    assert_eq!(status(&outcome, "loop"), "Canceled");
    assert_eq!(status(&outcome, "double#0"), "Canceled");
    assert_eq!(status(&outcome, "loop_out"), "Canceled");
    if !parallel {
      // Later iterations are never created.
      assert!(outcome.node("double#1").is_none());
    }
  }
}

/// `outer` walks a list of lists; `inner` doubles each element of one list.
fn nested_workflow(lists: Value) -> weft_config::WorkflowDef {
  fn iterate(id: &str, list_ref: &str, result_ref: &str) -> Value {
    let mut node = task(
      id,
      "iter_run",
      contents(&[
        ("D_ITERLIST", "Object", json!({"ref": list_ref})),
        ("item", "IterItem", json!([])),
      ]),
      contents(&[("doubled", "Object", json!([]))]),
    );
    node["results"]["by_id"]["doubled"]["config"] = json!({"ref": result_ref});
    node
  }

  workflow(
    vec![
      task("src", "text_input", json!({}), contents(&[("list", "Object", lists)])),
      iterate("outer", "src/results/list", "inner#/results/doubled"),
      boundary("o_in", "attached_node_input", "outer"),
      boundary("o_out", "attached_node_output", "outer"),
      boundary("o_next", "attached_node_next", "outer"),
      child(iterate("inner", "outer/payloads/item", "double##/results/out"), "outer"),
      boundary("i_in", "attached_node_input", "inner"),
      boundary("i_out", "attached_node_output", "inner"),
      boundary("i_next", "attached_node_next", "inner"),
      child(task("double", "double", reads("inner#/payloads/item"), out(json!(0))), "inner"),
    ],
    vec![
      edge("src", "outer"),
      edge("o_in", "inner"),
      edge("inner", "o_out"),
      edge("inner", "o_next"),
      edge("i_in", "double"),
      edge("double", "i_out"),
      edge("double", "i_next"),
    ],
  )
}

#[tokio::test]
async fn test_nested_iteration_reads_the_layout_prefix() {
  let run = WorkflowRun::build(
    nested_workflow(json!([[1, 2], [3]])),
    &registry(),
    ProgressRegistry::new(),
    RunnerConfig::default(),
  )
  .unwrap();

  let outcome = run.run().await.unwrap();
  assert_eq!(outcome.status, RunStatus::Success);
  assert_eq!(
    outcome.node("outer").unwrap().data["results"]["doubled"],
    json!([[2, 4], [6]])
  );
  assert_eq!(outcome.node("inner#1").unwrap().data["results"]["doubled"], json!([6]));
  assert_eq!(outcome.node("double#0#1").unwrap().data["results"]["out"], 4);
  assert!(outcome.node("double#1#1").is_none());
  for node in &outcome.nodes {
    assert_eq!(node.status, "Success", "{}", node.instance_id);
  }
}

fn status(outcome: &weft_runtime::RunOutcome, id: &str) -> String {
  outcome.node(id).unwrap().status.clone()
}
