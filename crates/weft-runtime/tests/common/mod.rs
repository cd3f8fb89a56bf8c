//! Shared fixtures: test node kinds and workflow builders.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use weft_config::WorkflowDef;
use weft_runtime::{
  ChannelKey, NodeCtx, NodeError, NodeKind, NodeRegistry, NodeUpdate, ProgressEvent,
  ProgressRegistry, RunOutcome, WorkflowRun,
};

/// `out = 2 * value`. Smaller values sleep longer, so parallel iterations
/// finish out of order.
pub struct Double;

#[async_trait]
impl NodeKind for Double {
  fn name(&self) -> &'static str {
    "double"
  }

  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    let value = ctx
      .payload_value("value")?
      .as_i64()
      .ok_or_else(|| NodeError::failed("value is not an integer"))?;
    let delay = (4 - value).max(0) as u64 * 10;
    tokio::time::sleep(Duration::from_millis(delay)).await;
    Ok(vec![ctx.set_result("out", json!(value * 2))?])
  }
}

/// Always fails.
pub struct Fail;

#[async_trait]
impl NodeKind for Fail {
  fn name(&self) -> &'static str {
    "fail"
  }

  async fn run(&self, _ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    Err(NodeError::failed("boom"))
  }
}

/// Fails its first `failures` runs, then writes `out = "ok"`.
pub struct Flaky {
  failures: usize,
  calls: Arc<AtomicUsize>,
}

impl Flaky {
  pub fn new(failures: usize) -> (Self, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
      Self {
        failures,
        calls: calls.clone(),
      },
      calls,
    )
  }
}

#[async_trait]
impl NodeKind for Flaky {
  fn name(&self) -> &'static str {
    "flaky"
  }

  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    if call < self.failures {
      return Err(NodeError::failed(format!("flaky failure {}", call + 1)));
    }
    Ok(vec![ctx.set_result("out", json!("ok"))?])
  }
}

/// Sleeps far longer than any test waits.
pub struct Sleep;

#[async_trait]
impl NodeKind for Sleep {
  fn name(&self) -> &'static str {
    "sleep"
  }

  async fn run(&self, _ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(Vec::new())
  }
}

pub fn registry() -> NodeRegistry {
  let mut registry = NodeRegistry::with_builtins();
  registry.register(Double).register(Fail).register(Sleep);
  registry
}

pub fn registry_with_flaky(failures: usize) -> (NodeRegistry, Arc<AtomicUsize>) {
  let mut registry = registry();
  let (flaky, calls) = Flaky::new(failures);
  registry.register(flaky);
  (registry, calls)
}

/// A task node with one `input` and one `output` handle. Its `self` handle
/// sees everything wired into `input`; `output` exposes every result.
pub fn task(id: &str, node_type: &str, payloads: Value, results: Value) -> Value {
  let exposed: serde_json::Map<String, Value> = results
    .get("order")
    .and_then(Value::as_array)
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(|cid| {
      (
        cid.to_string(),
        json!({"type": "FromInner", "group": "results", "content_id": cid}),
      )
    })
    .collect();
  json!({
    "node_id": id,
    "node_type": node_type,
    "flags": {"is_task": true},
    "connections": {
      "self": {"self": {"data": {"in": {"type": "FromOuter", "input_key": "input"}}}},
      "inputs": {"input": {}},
      "outputs": {"output": {"data": exposed}}
    },
    "payloads": payloads,
    "results": results
  })
}

pub fn child(mut node: Value, parent: &str) -> Value {
  node["parent"] = json!(parent);
  node
}

/// Attached boundary node of `parent`.
pub fn boundary(id: &str, node_type: &str, parent: &str) -> Value {
  let connections = match node_type {
    "attached_node_input" => json!({
      "outputs": {"output": {"data": {"p": {"type": "FromParent"}}}}
    }),
    _ => json!({
      "self": {"self": {"data": {"in": {"type": "FromOuter", "input_key": "input"}}}},
      "inputs": {"input": {}}
    }),
  };
  json!({
    "node_id": id,
    "node_type": node_type,
    "parent": parent,
    "flags": {"is_attached": true},
    "connections": connections
  })
}

/// `{by_id, order}` from `(id, type, data)` triples.
pub fn contents(entries: &[(&str, &str, Value)]) -> Value {
  let by_id: serde_json::Map<String, Value> = entries
    .iter()
    .map(|(id, ty, data)| (id.to_string(), json!({"type": ty, "data": data})))
    .collect();
  let order: Vec<&str> = entries.iter().map(|(id, _, _)| *id).collect();
  json!({"by_id": by_id, "order": order})
}

pub fn reads(reference: &str) -> Value {
  contents(&[("value", "Object", json!({"ref": reference}))])
}

pub fn out(data: Value) -> Value {
  contents(&[("out", "Object", data)])
}

pub fn edge(source: &str, target: &str) -> Value {
  json!({
    "id": format!("{}->{}", source, target),
    "source": source,
    "source_handle": "output",
    "target": target,
    "target_handle": "input"
  })
}

pub fn workflow(nodes: Vec<Value>, edges: Vec<Value>) -> WorkflowDef {
  serde_json::from_value(json!({"workflow_id": "wf", "nodes": nodes, "edges": edges})).unwrap()
}

/// `loop` iterates `src.list`, doubling every item into `loop.doubled`.
pub fn iteration_workflow(list: Value, parallel: bool) -> WorkflowDef {
  iteration_workflow_with(list, parallel, "double")
}

/// [`iteration_workflow`] with the body node `double` of type `body_type`.
pub fn iteration_workflow_with(list: Value, parallel: bool, body_type: &str) -> WorkflowDef {
  let mut iter = task(
    "loop",
    "iter_run",
    contents(&[
      ("D_ITERLIST", "Object", json!({"ref": "src/results/list"})),
      ("item", "IterItem", json!([])),
      ("index", "IterIndex", Value::Null),
      ("D_ITER_CONFIG", "Object", json!({"parallel": parallel})),
    ]),
    contents(&[("doubled", "Object", json!([]))]),
  );
  iter["results"]["by_id"]["doubled"]["config"] = json!({"ref": "double#/results/out"});
  iter["connections"]["attach"] = json!({
    "attach": {"data": {
      "item": {"type": "FromInner", "group": "payloads", "content_id": "item"},
      "index": {"type": "FromInner", "group": "payloads", "content_id": "index"}
    }}
  });
  iter["connections"]["inputs"]["input"] =
    json!({"data": {"outer": {"type": "FromOuter", "input_key": "input"}}});

  workflow(
    vec![
      task("src", "text_input", json!({}), contents(&[("list", "Object", list)])),
      iter,
      boundary("loop_in", "attached_node_input", "loop"),
      boundary("loop_out", "attached_node_output", "loop"),
      boundary("loop_next", "attached_node_next", "loop"),
      child(task("double", body_type, reads("loop/payloads/item"), out(json!(0))), "loop"),
    ],
    vec![
      edge("src", "loop"),
      edge("loop_in", "double"),
      edge("double", "loop_out"),
      edge("double", "loop_next"),
    ],
  )
}

/// `retry` re-runs `flaky` until it succeeds, copying its result.
/// Without `num_retries` the runner default applies.
pub fn retry_workflow(num_retries: Option<u64>) -> WorkflowDef {
  retry_workflow_with(num_retries, "flaky")
}

/// [`retry_workflow`] with the body node `flaky` of type `body_type`.
pub fn retry_workflow_with(num_retries: Option<u64>, body_type: &str) -> WorkflowDef {
  let config = match num_retries {
    Some(n) => contents(&[("D_RETRY_CONFIG", "Object", json!({"num_retries": n}))]),
    None => contents(&[]),
  };
  let mut retry = task(
    "retry",
    "retry_run",
    config,
    contents(&[("value", "String", json!(""))]),
  );
  retry["results"]["by_id"]["value"]["config"] = json!({"ref": "flaky/results/out"});

  workflow(
    vec![
      retry,
      boundary("retry_in", "attached_node_input", "retry"),
      boundary("retry_out", "attached_node_output", "retry"),
      child(task("flaky", body_type, json!({}), out(json!(""))), "retry"),
    ],
    vec![edge("retry_in", "flaky"), edge("flaky", "retry_out")],
  )
}

/// Read the graph channel until `FlowFinished`.
pub async fn drain_events(progress: &ProgressRegistry, run_id: &str) -> Vec<ProgressEvent> {
  let key = ChannelKey::graph(run_id);
  let mut events = Vec::new();
  loop {
    let event = tokio::time::timeout(Duration::from_secs(5), progress.get(&key))
      .await
      .expect("timed out waiting for progress")
      .expect("graph channel closed");
    let finished = event.is_finished();
    events.push(event);
    if finished {
      return events;
    }
  }
}

/// Start `run` in the background, stop it after `after`, and return its
/// outcome.
pub async fn stop_after(run: WorkflowRun, after: Duration) -> RunOutcome {
  let run = Arc::new(run);
  let handle = {
    let run = run.clone();
    tokio::spawn(async move { run.run().await })
  };
  tokio::time::sleep(after).await;
  run.stop();
  tokio::time::timeout(Duration::from_secs(5), handle)
    .await
    .expect("run did not settle after stop")
    .unwrap()
    .unwrap()
}

/// Instances left `Pending` or `Running`.
pub fn unsettled(outcome: &RunOutcome) -> Vec<String> {
  outcome
    .nodes
    .iter()
    .filter(|n| n.status == "Pending" || n.status == "Running")
    .map(|n| format!("{}={}", n.instance_id, n.status))
    .collect()
}

pub fn finished_count(events: &[ProgressEvent]) -> usize {
  events.iter().filter(|e| e.is_finished()).count()
}
