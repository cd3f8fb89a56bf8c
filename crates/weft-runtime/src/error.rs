//! Runtime error types.

use weft_config::ConfigError;
use weft_reactive::ReactiveError;
use weft_store::Error as StoreError;
use weft_validator::ValidationError;

/// Errors raised by the run machinery itself.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// A node id is not part of the workflow definition.
  #[error("node '{node_id}' not found in workflow")]
  UnknownNode { node_id: String },

  /// No kind is registered for a node's type tag.
  #[error("no node kind registered for type '{node_type}' (node '{node_id}')")]
  UnknownNodeType { node_id: String, node_type: String },

  /// An instance key is already present in the instance table.
  #[error("instance '{instance_id}' already exists")]
  DuplicateInstance { instance_id: String },

  /// An instance key is missing from the instance table.
  #[error("instance '{instance_id}' not found")]
  InstanceNotFound { instance_id: String },

  /// A referenced content entry does not exist on its instance.
  #[error("instance '{instance_id}' has no content '{content}'")]
  ContentNotFound {
    instance_id: String,
    content: String,
  },

  /// A reference needs more loop indices than the reader has.
  #[error(
    "reference '{reference}' needs nesting depth {needed}, reader '{reader}' only has {available}"
  )]
  NestingMismatch {
    reference: String,
    reader: String,
    needed: usize,
    available: usize,
  },

  /// A reference resolved, but its value has the wrong shape.
  #[error("reference '{reference}': {message}")]
  InvalidValue { reference: String, message: String },

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Reactive(#[from] ReactiveError),

  /// The workflow failed pre-flight validation.
  #[error("workflow has {} invalid node(s)", .errors.len())]
  Validation { errors: Vec<ValidationError> },

  /// A run for this workflow is still active.
  #[error("workflow '{workflow_id}' is already running")]
  AlreadyRunning { workflow_id: String },

  /// No active run for this workflow.
  #[error("workflow '{workflow_id}' is not running")]
  NotRunning { workflow_id: String },

  /// No store is configured, or the store failed.
  #[error("store unavailable: {message}")]
  StoreUnavailable { message: String },

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Errors a node body reports back to the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
  /// The node's own logic failed.
  #[error("{message}")]
  Failed { message: String },

  /// A nested construct's body did not converge.
  #[error("iteration failed: {message}")]
  IterationFailed { message: String },

  /// Every retry attempt failed.
  #[error("retry budget exhausted after {attempts} attempt(s)")]
  RetryExhausted { attempts: u32 },

  /// The run was cancelled while the body was executing.
  #[error("node cancelled")]
  Cancelled,

  /// The kind does not support an optional operation.
  #[error("node kind '{kind}' does not support {operation}")]
  Unsupported {
    kind: &'static str,
    operation: &'static str,
  },

  #[error(transparent)]
  Runtime(#[from] RuntimeError),
}

impl NodeError {
  pub fn failed(message: impl Into<String>) -> Self {
    NodeError::Failed {
      message: message.into(),
    }
  }
}

impl From<ReactiveError> for NodeError {
  fn from(e: ReactiveError) -> Self {
    NodeError::Runtime(RuntimeError::Reactive(e))
  }
}
