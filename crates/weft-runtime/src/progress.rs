//! Progress events and the channel registry that carries them.
//!
//! One [`ProgressRegistry`] serves the whole process. Each run owns a graph
//! channel plus one channel per live-view node, all keyed by [`ChannelKey`].
//! Publishing to a key nobody created is a silent drop, so a late observer of
//! a finished run never sees stray partial events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::trace;
use weft_reactive::{Mutation, Operation, PathSegment};

use crate::status::RunStatus;

/// Kind of change carried by a [`NodeUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOp {
  Overwrite,
  Append,
  Remove,
  /// Informational; observers need not apply it.
  DontCare,
}

impl From<Operation> for UpdateOp {
  fn from(op: Operation) -> Self {
    match op {
      Operation::Overwrite => UpdateOp::Overwrite,
      Operation::Append => UpdateOp::Append,
      Operation::Remove => UpdateOp::Remove,
    }
  }
}

/// One incremental change to a node instance's observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
  pub operation: UpdateOp,
  pub path: Vec<PathSegment>,
  pub value: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub old_value: Option<Value>,
}

impl NodeUpdate {
  pub fn overwrite(path: Vec<PathSegment>, value: Value) -> Self {
    Self {
      operation: UpdateOp::Overwrite,
      path,
      value,
      old_value: None,
    }
  }

  pub fn append(path: Vec<PathSegment>, value: Value) -> Self {
    Self {
      operation: UpdateOp::Append,
      path,
      value,
      old_value: None,
    }
  }

  /// `state.status` overwrite.
  pub fn status(status: RunStatus) -> Self {
    Self::overwrite(
      vec!["state".into(), "status".into()],
      Value::String(status.to_string()),
    )
  }

  /// Path of a result entry's data.
  pub fn result_path(content_id: &str) -> Vec<PathSegment> {
    vec![
      "results".into(),
      "by_id".into(),
      content_id.into(),
      "data".into(),
    ]
  }

  /// A reactive mutation, re-rooted under `prefix`.
  pub fn from_mutation(prefix: &[PathSegment], mutation: &Mutation) -> Self {
    let mut path = prefix.to_vec();
    path.extend(mutation.path.iter().cloned());
    Self {
      operation: mutation.operation.into(),
      path,
      value: mutation.new_value.clone(),
      old_value: Some(mutation.old_value.clone()),
    }
  }
}

/// Events delivered to progress readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
  UpdateNode {
    run_id: String,
    instance_id: String,
    original_id: String,
    updates: Vec<NodeUpdate>,
  },
  BatchUpdateNode {
    run_id: String,
    instance_id: String,
    original_id: String,
    updates: Vec<NodeUpdate>,
  },
  /// Terminal event of a run.
  FlowFinished { run_id: String, status: RunStatus },
  InternalError { run_id: String, message: String },
}

impl ProgressEvent {
  pub fn is_finished(&self) -> bool {
    matches!(self, ProgressEvent::FlowFinished { .. })
  }
}

/// Logical subscription within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
  /// Status and result updates of every node.
  Graph,
  /// Live view of one node instance.
  Node(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
  pub run_id: String,
  pub channel: Channel,
}

impl ChannelKey {
  pub fn graph(run_id: impl Into<String>) -> Self {
    Self {
      run_id: run_id.into(),
      channel: Channel::Graph,
    }
  }

  pub fn node(run_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
    Self {
      run_id: run_id.into(),
      channel: Channel::Node(instance_id.into()),
    }
  }
}

struct Queue {
  tx: mpsc::UnboundedSender<ProgressEvent>,
  rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<ProgressEvent>>>,
}

/// Process-wide registry of per-subscription FIFO queues.
#[derive(Clone, Default)]
pub struct ProgressRegistry {
  queues: Arc<Mutex<HashMap<ChannelKey, Queue>>>,
}

impl ProgressRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<ChannelKey, Queue>> {
    self.queues.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Open a queue. Re-creating an existing key keeps the queue and its backlog.
  pub fn create(&self, key: ChannelKey) {
    self.lock().entry(key).or_insert_with(|| {
      let (tx, rx) = mpsc::unbounded_channel();
      Queue {
        tx,
        rx: Arc::new(AsyncMutex::new(rx)),
      }
    });
  }

  pub fn has(&self, key: &ChannelKey) -> bool {
    self.lock().contains_key(key)
  }

  /// Enqueue without blocking. Returns `false` when the key was never created.
  pub fn put(&self, key: &ChannelKey, event: ProgressEvent) -> bool {
    let queues = self.lock();
    match queues.get(key) {
      Some(queue) => queue.tx.send(event).is_ok(),
      None => {
        trace!(run_id = %key.run_id, channel = ?key.channel, "progress_event_dropped");
        false
      }
    }
  }

  /// Enqueue on every channel belonging to `run_id`.
  pub fn broadcast(&self, run_id: &str, event: ProgressEvent) {
    let queues = self.lock();
    for (key, queue) in queues.iter() {
      if key.run_id == run_id {
        let _ = queue.tx.send(event.clone());
      }
    }
  }

  /// Next event in FIFO order.
  ///
  /// Returns `None` if the key does not exist, or once it has been removed
  /// and its backlog drained.
  pub async fn get(&self, key: &ChannelKey) -> Option<ProgressEvent> {
    let rx = self.lock().get(key).map(|q| q.rx.clone())?;
    let mut rx = rx.lock().await;
    rx.recv().await
  }

  pub fn remove(&self, key: &ChannelKey) {
    self.lock().remove(key);
  }

  /// Drop every channel of a run.
  pub fn remove_run(&self, run_id: &str) {
    self.lock().retain(|key, _| key.run_id != run_id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn finished(run_id: &str) -> ProgressEvent {
    ProgressEvent::FlowFinished {
      run_id: run_id.to_string(),
      status: RunStatus::Success,
    }
  }

  fn update(n: i64) -> ProgressEvent {
    ProgressEvent::UpdateNode {
      run_id: "r".to_string(),
      instance_id: "a".to_string(),
      original_id: "a".to_string(),
      updates: vec![NodeUpdate::overwrite(vec![], Value::from(n))],
    }
  }

  #[tokio::test]
  async fn test_fifo_order() {
    let registry = ProgressRegistry::new();
    let key = ChannelKey::graph("r");
    registry.create(key.clone());

    for n in 0..3 {
      assert!(registry.put(&key, update(n)));
    }
    for n in 0..3 {
      assert_eq!(registry.get(&key).await, Some(update(n)));
    }
  }

  #[tokio::test]
  async fn test_put_before_create_is_dropped() {
    let registry = ProgressRegistry::new();
    let key = ChannelKey::graph("r");

    assert!(!registry.put(&key, update(1)));
    registry.create(key.clone());
    registry.put(&key, update(2));

    assert_eq!(registry.get(&key).await, Some(update(2)));
    assert!(registry.get(&ChannelKey::graph("other")).await.is_none());
  }

  #[tokio::test]
  async fn test_get_blocks_until_put() {
    let registry = ProgressRegistry::new();
    let key = ChannelKey::graph("r");
    registry.create(key.clone());

    let reader = {
      let registry = registry.clone();
      let key = key.clone();
      tokio::spawn(async move { registry.get(&key).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    registry.put(&key, finished("r"));

    let event = tokio::time::timeout(Duration::from_millis(100), reader)
      .await
      .unwrap()
      .unwrap();
    assert!(event.unwrap().is_finished());
  }

  #[tokio::test]
  async fn test_broadcast_reaches_every_channel_of_the_run() {
    let registry = ProgressRegistry::new();
    let graph = ChannelKey::graph("r");
    let node = ChannelKey::node("r", "view");
    let other = ChannelKey::graph("s");
    for key in [&graph, &node, &other] {
      registry.create(key.clone());
    }

    registry.broadcast("r", finished("r"));

    assert!(registry.get(&graph).await.unwrap().is_finished());
    assert!(registry.get(&node).await.unwrap().is_finished());

    registry.remove(&other);
    assert!(!registry.has(&other));
    registry.remove_run("r");
    assert!(!registry.has(&graph));
  }

  #[test]
  fn test_event_wire_format() {
    let event = ProgressEvent::UpdateNode {
      run_id: "r".to_string(),
      instance_id: "body#1".to_string(),
      original_id: "body".to_string(),
      updates: vec![NodeUpdate::status(RunStatus::Running)],
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "update_node");
    assert_eq!(value["updates"][0]["operation"], "overwrite");
    assert_eq!(value["updates"][0]["path"], serde_json::json!(["state", "status"]));
    assert_eq!(value["updates"][0]["value"], "Running");
  }
}
