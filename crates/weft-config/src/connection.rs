use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::ContentGroup;
use crate::node::AttachedRole;

/// Where a connection handle draws its variables from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConnectionSource {
  /// One of the node's own content entries.
  FromInner {
    group: ContentGroup,
    content_id: String,
  },
  /// Whatever is wired into the named input handle.
  FromOuter { input_key: String },
  /// A boundary child of a nested construct.
  FromAttached { atype: AttachedRole },
  /// The enclosing construct's attach handles and inputs.
  FromParent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
  #[serde(default)]
  pub label: String,
  #[serde(default)]
  pub data: BTreeMap<String, ConnectionSource>,
}

/// Handle wiring of a node, grouped by handle kind.
///
/// The keys of `inputs` and `outputs` are the node's input and output handle names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connections {
  #[serde(rename = "self", default)]
  pub self_: BTreeMap<String, Connection>,
  #[serde(default)]
  pub attach: BTreeMap<String, Connection>,
  #[serde(default)]
  pub inputs: BTreeMap<String, Connection>,
  #[serde(default)]
  pub outputs: BTreeMap<String, Connection>,
}
