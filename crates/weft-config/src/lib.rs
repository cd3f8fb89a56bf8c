//! Weft Config
//!
//! This crate contains the serializable workflow definition types for weft.
//! A workflow is plain data: a list of node definitions and the edges that
//! connect their output handles to input handles. Nesting is expressed by a
//! node's `parent` field, so iteration and retry bodies live in the same flat
//! node list as root-level nodes.
//!
//! Definitions are loaded from JSON files by the CLI and stored as JSON blobs
//! alongside run records.

mod connection;
mod content;
mod edge;
mod error;
mod node;
mod reference;
mod workflow;

pub use connection::{Connection, ConnectionSource, Connections};
pub use content::{ContentConfig, ContentEntry, ContentGroup, ContentType, Contents};
pub use edge::EdgeDef;
pub use error::ConfigError;
pub use node::{AttachedRole, NodeDef, NodeFlags};
pub use reference::ContentRef;
pub use workflow::WorkflowDef;

/// Type tags of the built-in node kinds.
pub mod kinds {
  pub const ATTACHED_INPUT: &str = "attached_node_input";
  pub const ATTACHED_OUTPUT: &str = "attached_node_output";
  pub const ATTACHED_NEXT: &str = "attached_node_next";
  pub const ITER_RUN: &str = "iter_run";
  pub const RETRY_RUN: &str = "retry_run";
  pub const ITER_RETRY_RUN: &str = "iter_retry_run";
  pub const TEXT_INPUT: &str = "text_input";
  pub const COND_BRANCH: &str = "cond_branch";
  pub const BRANCH_AGGREGATE: &str = "branch_aggregate";
  pub const JINJA2_TEMPLATE: &str = "jinja2_template";
}
