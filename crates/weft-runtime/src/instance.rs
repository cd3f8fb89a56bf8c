//! Node instances: one materialized copy of a template node at a nest layout.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value, json};
use weft_config::{ContentEntry, ContentGroup, ContentType, Contents, NodeDef};
use weft_reactive::{Reactive, SubscriptionId};
use weft_store::NodeSnapshot;

use crate::layout::InstanceKey;
use crate::node::NodeKind;
use crate::progress::NodeUpdate;
use crate::signal::CompletionSignal;
use crate::status::RunStatus;

/// Runtime copy of one content entry. `data` is the shared, observable value.
#[derive(Debug)]
pub struct ContentSlot {
  pub label: String,
  pub content_type: ContentType,
  pub key: String,
  pub data: Reactive,
  /// `config.ref` of the authored entry.
  pub reference: Option<String>,
}

impl ContentSlot {
  fn from_entry(entry: &ContentEntry) -> Self {
    Self {
      label: entry.label.clone(),
      content_type: entry.content_type.clone(),
      key: entry.key.clone(),
      data: Reactive::new(entry.data.clone()),
      reference: entry.config.reference.clone(),
    }
  }

  fn deep_copy(&self) -> Self {
    Self {
      label: self.label.clone(),
      content_type: self.content_type.clone(),
      key: self.key.clone(),
      data: self.data.deep_copy(),
      reference: self.reference.clone(),
    }
  }
}

/// Ordered content slots of one group.
#[derive(Debug, Default)]
pub struct ContentSlots {
  by_id: BTreeMap<String, ContentSlot>,
  order: Vec<String>,
}

impl ContentSlots {
  pub fn from_contents(contents: &Contents) -> Self {
    let mut slots = Self::default();
    for (id, entry) in contents.iter() {
      slots.order.push(id.clone());
      slots.by_id.insert(id.clone(), ContentSlot::from_entry(entry));
    }
    slots
  }

  /// Independent copy; observers are not carried over.
  pub fn deep_copy(&self) -> Self {
    Self {
      by_id: self
        .by_id
        .iter()
        .map(|(id, slot)| (id.clone(), slot.deep_copy()))
        .collect(),
      order: self.order.clone(),
    }
  }

  pub fn get(&self, content_id: &str) -> Option<&ContentSlot> {
    self.by_id.get(content_id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &ContentSlot)> {
    self
      .order
      .iter()
      .filter_map(|id| self.by_id.get_key_value(id))
  }

  pub fn find_type(&self, content_type: &ContentType) -> Option<(&String, &ContentSlot)> {
    self.iter().find(|(_, slot)| &slot.content_type == content_type)
  }

  /// Current data of every slot, keyed by content id.
  pub fn values(&self) -> Value {
    let map: Map<String, Value> = self
      .iter()
      .map(|(id, slot)| (id.clone(), slot.data.value()))
      .collect();
    Value::Object(map)
  }
}

#[derive(Debug, Default)]
struct InstanceState {
  status: RunStatus,
  outputs: BTreeMap<String, RunStatus>,
  error: Option<String>,
}

/// A dependency on one output handle of another instance.
#[derive(Debug, Clone)]
pub struct WaitEdge {
  pub source: InstanceKey,
  pub handle: String,
  pub(crate) signal: CompletionSignal,
}

pub struct NodeInstance {
  key: InstanceKey,
  def: Arc<NodeDef>,
  kind: Arc<dyn NodeKind>,
  payloads: ContentSlots,
  results: ContentSlots,
  state: Mutex<InstanceState>,
  waits: Mutex<Vec<WaitEdge>>,
  signal: CompletionSignal,
  subscriptions: Mutex<Vec<(Reactive, SubscriptionId)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NodeInstance {
  pub(crate) fn new(
    key: InstanceKey,
    def: Arc<NodeDef>,
    kind: Arc<dyn NodeKind>,
    payloads: ContentSlots,
    results: ContentSlots,
  ) -> Self {
    let outputs = def
      .output_handles()
      .map(|handle| (handle.clone(), RunStatus::Pending))
      .collect();
    Self {
      key,
      def,
      kind,
      payloads,
      results,
      state: Mutex::new(InstanceState {
        outputs,
        ..InstanceState::default()
      }),
      waits: Mutex::new(Vec::new()),
      signal: CompletionSignal::new(),
      subscriptions: Mutex::new(Vec::new()),
    }
  }

  pub fn key(&self) -> &InstanceKey {
    &self.key
  }

  /// Display id, `template#i#j`.
  pub fn id(&self) -> String {
    self.key.to_string()
  }

  pub fn template_id(&self) -> &str {
    &self.key.template_id
  }

  pub fn def(&self) -> &NodeDef {
    &self.def
  }

  pub fn kind(&self) -> &Arc<dyn NodeKind> {
    &self.kind
  }

  pub fn payloads(&self) -> &ContentSlots {
    &self.payloads
  }

  pub fn results(&self) -> &ContentSlots {
    &self.results
  }

  pub fn content(&self, group: ContentGroup) -> &ContentSlots {
    match group {
      ContentGroup::Payloads => &self.payloads,
      ContentGroup::Results => &self.results,
    }
  }

  pub fn status(&self) -> RunStatus {
    lock(&self.state).status
  }

  /// Status of one output handle. Unknown handles read as `Pending`.
  pub fn output_status(&self, handle: &str) -> RunStatus {
    lock(&self.state)
      .outputs
      .get(handle)
      .copied()
      .unwrap_or_default()
  }

  pub fn output_statuses(&self) -> BTreeMap<String, RunStatus> {
    lock(&self.state).outputs.clone()
  }

  pub fn error(&self) -> Option<String> {
    lock(&self.state).error.clone()
  }

  pub fn set_output_status(&self, handle: &str, status: RunStatus) {
    lock(&self.state).outputs.insert(handle.to_string(), status);
  }

  pub(crate) fn set_status(&self, status: RunStatus) {
    let mut state = lock(&self.state);
    state.status = status;
    if status == RunStatus::Running {
      for output in state.outputs.values_mut() {
        *output = RunStatus::Running;
      }
    }
  }

  /// Set the node and every output handle to `status`.
  pub(crate) fn finish(&self, status: RunStatus, error: Option<String>) {
    let mut state = lock(&self.state);
    state.status = status;
    state.error = error;
    for output in state.outputs.values_mut() {
      *output = status;
    }
  }

  /// Mark success; handles the body did not settle become `Success` too.
  pub(crate) fn succeed(&self) {
    let mut state = lock(&self.state);
    state.status = RunStatus::Success;
    for output in state.outputs.values_mut() {
      if !output.is_terminal() {
        *output = RunStatus::Success;
      }
    }
  }

  pub fn signal(&self) -> &CompletionSignal {
    &self.signal
  }

  /// Record a dependency. A given source handle is recorded once.
  pub(crate) fn add_wait(&self, edge: WaitEdge) {
    let mut waits = lock(&self.waits);
    if waits
      .iter()
      .any(|w| w.source == edge.source && w.handle == edge.handle)
    {
      return;
    }
    waits.push(edge);
  }

  pub fn wait_edges(&self) -> Vec<WaitEdge> {
    lock(&self.waits).clone()
  }

  /// Keep a subscription alive until [`NodeInstance::detach`].
  pub(crate) fn track_subscription(&self, reactive: Reactive, id: SubscriptionId) {
    lock(&self.subscriptions).push((reactive, id));
  }

  pub(crate) fn detach(&self) {
    for (reactive, id) in lock(&self.subscriptions).drain(..) {
      reactive.unsubscribe(id);
    }
  }

  fn outputs_value(outputs: &BTreeMap<String, RunStatus>) -> Value {
    let map: Map<String, Value> = outputs
      .iter()
      .map(|(handle, status)| (handle.clone(), Value::from(status.as_str())))
      .collect();
    Value::Object(map)
  }

  /// Status and output-handle updates for the current state.
  pub fn status_updates(&self) -> Vec<NodeUpdate> {
    let state = lock(&self.state);
    let mut updates = vec![
      NodeUpdate::status(state.status),
      NodeUpdate::overwrite(
        vec!["state".into(), "outputs".into()],
        Self::outputs_value(&state.outputs),
      ),
    ];
    if let Some(error) = &state.error {
      updates.push(NodeUpdate::overwrite(
        vec!["state".into(), "error".into()],
        Value::from(error.as_str()),
      ));
    }
    updates
  }

  /// Status updates followed by an overwrite of every result entry.
  pub fn state_updates(&self) -> Vec<NodeUpdate> {
    let mut updates = self.status_updates();
    for (id, slot) in self.results.iter() {
      updates.push(NodeUpdate::overwrite(
        NodeUpdate::result_path(id),
        slot.data.value(),
      ));
    }
    updates
  }

  pub fn snapshot(&self) -> NodeSnapshot {
    let (status, outputs, error) = {
      let state = lock(&self.state);
      (
        state.status,
        Self::outputs_value(&state.outputs),
        state.error.clone(),
      )
    };
    NodeSnapshot {
      instance_id: self.id(),
      original_id: self.key.template_id.clone(),
      node_type: self.def.node_type.clone(),
      parent: self.def.parent.clone(),
      status: status.to_string(),
      data: json!({
        "layout": self.key.layout.indices(),
        "outputs": outputs,
        "error": error,
        "payloads": self.payloads.values(),
        "results": self.results.values(),
      }),
    }
  }
}

impl std::fmt::Debug for NodeInstance {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NodeInstance")
      .field("key", &self.key)
      .field("node_type", &self.def.node_type)
      .field("status", &self.status())
      .finish()
  }
}
