//! Per-run state: templates, the live instance table, and reference resolution.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_config::{ContentRef, ContentType, WorkflowDef};
use weft_reactive::Reactive;

use crate::config::RunnerConfig;
use crate::error::RuntimeError;
use crate::instance::{ContentSlots, NodeInstance, WaitEdge};
use crate::layout::{InstanceKey, NestLayout};
use crate::node::NodeKind;
use crate::progress::{ChannelKey, NodeUpdate, ProgressEvent, ProgressRegistry};
use crate::registry::NodeRegistry;

/// A template node with its kind resolved and its content prototypes built.
struct Template {
  def: Arc<weft_config::NodeDef>,
  kind: Arc<dyn NodeKind>,
  payloads: ContentSlots,
  results: ContentSlots,
}

pub struct RunContext {
  run_id: String,
  workflow: Arc<WorkflowDef>,
  progress: ProgressRegistry,
  config: RunnerConfig,
  templates: HashMap<String, Template>,
  instances: RwLock<HashMap<InstanceKey, Arc<NodeInstance>>>,
  cancel: CancellationToken,
}

impl RunContext {
  pub(crate) fn new(
    run_id: String,
    workflow: Arc<WorkflowDef>,
    registry: &NodeRegistry,
    progress: ProgressRegistry,
    config: RunnerConfig,
  ) -> Result<Self, RuntimeError> {
    let mut templates = HashMap::new();
    for node in &workflow.nodes {
      let kind = registry
        .get(&node.node_type)
        .ok_or_else(|| RuntimeError::UnknownNodeType {
          node_id: node.node_id.clone(),
          node_type: node.node_type.clone(),
        })?;
      templates.insert(
        node.node_id.clone(),
        Template {
          def: Arc::new(node.clone()),
          kind,
          payloads: ContentSlots::from_contents(&node.payloads),
          results: ContentSlots::from_contents(&node.results),
        },
      );
    }

    Ok(Self {
      run_id,
      workflow,
      progress,
      config,
      templates,
      instances: RwLock::new(HashMap::new()),
      cancel: CancellationToken::new(),
    })
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn workflow(&self) -> &WorkflowDef {
    &self.workflow
  }

  pub fn config(&self) -> &RunnerConfig {
    &self.config
  }

  pub fn progress(&self) -> &ProgressRegistry {
    &self.progress
  }

  pub fn cancel_token(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn instance(&self, key: &InstanceKey) -> Option<Arc<NodeInstance>> {
    self
      .instances
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(key)
      .cloned()
  }

  /// Look up an instance by its display id (`template#i#j`).
  pub fn instance_by_id(&self, instance_id: &str) -> Option<Arc<NodeInstance>> {
    self
      .instances
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .find(|inst| inst.id() == instance_id)
      .cloned()
  }

  /// Every live instance, ordered by key.
  pub fn instances(&self) -> Vec<Arc<NodeInstance>> {
    let mut all: Vec<_> = self
      .instances
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect();
    all.sort_by(|a, b| a.key().cmp(b.key()));
    all
  }

  pub fn instance_count(&self) -> usize {
    self
      .instances
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  /// Materialize a template at `layout` with fresh copies of its content.
  pub(crate) fn create_instance(
    &self,
    template_id: &str,
    layout: NestLayout,
  ) -> Result<Arc<NodeInstance>, RuntimeError> {
    let template = self
      .templates
      .get(template_id)
      .ok_or_else(|| RuntimeError::UnknownNode {
        node_id: template_id.to_string(),
      })?;
    let key = InstanceKey::new(template_id, layout);

    let mut instances = self
      .instances
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    if instances.contains_key(&key) {
      return Err(RuntimeError::DuplicateInstance {
        instance_id: key.to_string(),
      });
    }

    let instance = Arc::new(NodeInstance::new(
      key.clone(),
      template.def.clone(),
      template.kind.clone(),
      template.payloads.deep_copy(),
      template.results.deep_copy(),
    ));
    instances.insert(key, instance.clone());
    debug!(run_id = %self.run_id, instance_id = %instance.id(), "instance_created");
    Ok(instance)
  }

  pub(crate) fn remove_instance(&self, key: &InstanceKey) -> Option<Arc<NodeInstance>> {
    let removed = self
      .instances
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(key);
    if let Some(instance) = &removed {
      instance.detach();
      debug!(run_id = %self.run_id, instance_id = %key, "instance_removed");
    }
    removed
  }

  /// Connect every template edge whose endpoints are both in `scope`.
  ///
  /// `scope` maps template ids to the concrete instances that stand for
  /// them in the subgraph being built.
  pub(crate) fn wire(&self, scope: &HashMap<String, InstanceKey>) -> Result<(), RuntimeError> {
    for edge in &self.workflow.edges {
      let (Some(source_key), Some(target_key)) = (scope.get(&edge.source), scope.get(&edge.target))
      else {
        continue;
      };
      let source = self.require(source_key)?;
      let target = self.require(target_key)?;
      target.add_wait(WaitEdge {
        source: source_key.clone(),
        handle: edge.source_handle.clone(),
        signal: source.signal().clone(),
      });
    }
    Ok(())
  }

  fn require(&self, key: &InstanceKey) -> Result<Arc<NodeInstance>, RuntimeError> {
    self
      .instance(key)
      .ok_or_else(|| RuntimeError::InstanceNotFound {
        instance_id: key.to_string(),
      })
  }

  /// Emit on the run's graph channel.
  pub fn publish(&self, event: ProgressEvent) {
    self.progress.put(&ChannelKey::graph(&self.run_id), event);
  }

  pub(crate) fn publish_updates(&self, instance: &NodeInstance, updates: Vec<NodeUpdate>, batch: bool) {
    let run_id = self.run_id.clone();
    let instance_id = instance.id();
    let original_id = instance.template_id().to_string();
    let event = if batch {
      ProgressEvent::BatchUpdateNode {
        run_id,
        instance_id,
        original_id,
        updates,
      }
    } else {
      ProgressEvent::UpdateNode {
        run_id,
        instance_id,
        original_id,
        updates,
      }
    };
    self.publish(event);
  }

  /// Resolve a reference string as read from `reader`.
  pub fn resolve(&self, reference: &str, reader: &NestLayout) -> Result<Value, RuntimeError> {
    let reference: ContentRef = reference.parse()?;
    self.resolve_ref(&reference, reader)
  }

  /// Resolve a parsed reference.
  ///
  /// The target instance is the referenced template at the first
  /// `reference.depth` indices of the reader's layout. Loop-index and
  /// loop-item entries answer with the reader's own index at that level.
  pub fn resolve_ref(&self, reference: &ContentRef, reader: &NestLayout) -> Result<Value, RuntimeError> {
    let (content_type, data) = self.locate(reference, reader)?;
    match content_type {
      ContentType::IterIndex => {
        let index = self.index_at(reference, reader)?;
        Ok(Value::from(index))
      }
      ContentType::IterItem => {
        let index = self.index_at(reference, reader)?;
        data
          .get(&[index.into()])
          .ok_or_else(|| RuntimeError::InvalidValue {
            reference: reference.to_string(),
            message: format!("iteration list has no element {}", index),
          })
      }
      _ => Ok(data.value()),
    }
  }

  /// The live, shared value behind a reference.
  pub(crate) fn reactive(&self, reference: &ContentRef, reader: &NestLayout) -> Result<Reactive, RuntimeError> {
    self.locate(reference, reader).map(|(_, data)| data)
  }

  fn index_at(&self, reference: &ContentRef, reader: &NestLayout) -> Result<usize, RuntimeError> {
    reader
      .get(reference.depth)
      .ok_or_else(|| RuntimeError::NestingMismatch {
        reference: reference.to_string(),
        reader: format!("{:?}", reader.indices()),
        needed: reference.depth + 1,
        available: reader.len(),
      })
  }

  fn locate(
    &self,
    reference: &ContentRef,
    reader: &NestLayout,
  ) -> Result<(ContentType, Reactive), RuntimeError> {
    if reference.depth > reader.len() {
      return Err(RuntimeError::NestingMismatch {
        reference: reference.to_string(),
        reader: format!("{:?}", reader.indices()),
        needed: reference.depth,
        available: reader.len(),
      });
    }

    let key = InstanceKey::new(reference.template_id.clone(), reader.prefix(reference.depth));
    let instance = self.require(&key)?;
    let slot = instance
      .content(reference.group)
      .get(&reference.content_id)
      .ok_or_else(|| RuntimeError::ContentNotFound {
        instance_id: key.to_string(),
        content: format!("{}/{}", reference.group, reference.content_id),
      })?;
    Ok((slot.content_type.clone(), slot.data.clone()))
  }
}
