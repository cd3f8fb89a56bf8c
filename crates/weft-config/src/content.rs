use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which content map of a node an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentGroup {
  Payloads,
  Results,
}

impl ContentGroup {
  pub fn as_str(&self) -> &'static str {
    match self {
      ContentGroup::Payloads => "payloads",
      ContentGroup::Results => "results",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "payloads" => Some(ContentGroup::Payloads),
      "results" => Some(ContentGroup::Results),
      _ => None,
    }
  }
}

impl fmt::Display for ContentGroup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Type tag of a content entry.
///
/// Unknown tags are kept verbatim so a definition survives a load/store cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
  #[default]
  String,
  Integer,
  Number,
  Boolean,
  Object,
  ConditionDict,
  VarsInput,
  Branches,
  /// Resolves to the caller's loop index at the referenced iteration level.
  IterIndex,
  /// Holds the iteration source list; resolves to the caller's current element.
  IterItem,
  /// Holds the current item of an iterate-retry loop.
  RetryItem,
  Other(String),
}

impl ContentType {
  pub fn as_str(&self) -> &str {
    match self {
      ContentType::String => "String",
      ContentType::Integer => "Integer",
      ContentType::Number => "Number",
      ContentType::Boolean => "Boolean",
      ContentType::Object => "Object",
      ContentType::ConditionDict => "ConditionDict",
      ContentType::VarsInput => "VarsInput",
      ContentType::Branches => "Branches",
      ContentType::IterIndex => "IterIndex",
      ContentType::IterItem => "IterItem",
      ContentType::RetryItem => "RetryItem",
      ContentType::Other(s) => s,
    }
  }
}

impl From<String> for ContentType {
  fn from(s: String) -> Self {
    match s.as_str() {
      "String" => ContentType::String,
      "Integer" => ContentType::Integer,
      "Number" => ContentType::Number,
      "Boolean" => ContentType::Boolean,
      "Object" => ContentType::Object,
      "ConditionDict" => ContentType::ConditionDict,
      "VarsInput" => ContentType::VarsInput,
      "Branches" => ContentType::Branches,
      "IterIndex" => ContentType::IterIndex,
      "IterItem" => ContentType::IterItem,
      "RetryItem" => ContentType::RetryItem,
      _ => ContentType::Other(s),
    }
  }
}

impl From<ContentType> for String {
  fn from(t: ContentType) -> Self {
    t.as_str().to_string()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
  /// Reference to another entry whose values are aggregated into this one.
  #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
  pub reference: Option<String>,
}

/// One named, typed slot of a node's payloads or results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
  #[serde(default)]
  pub label: String,
  #[serde(rename = "type", default)]
  pub content_type: ContentType,
  #[serde(default)]
  pub key: String,
  #[serde(default)]
  pub data: serde_json::Value,
  #[serde(default)]
  pub config: ContentConfig,
}

impl ContentEntry {
  pub fn new(content_type: ContentType, data: serde_json::Value) -> Self {
    Self {
      label: String::new(),
      content_type,
      key: String::new(),
      data,
      config: ContentConfig::default(),
    }
  }

  /// The reference held by a `{"ref": "..."}` data value, if any.
  pub fn data_ref(&self) -> Option<&str> {
    self.data.get("ref").and_then(|v| v.as_str())
  }
}

/// Ordered mapping from content id to entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contents {
  #[serde(default)]
  pub by_id: BTreeMap<String, ContentEntry>,
  #[serde(default)]
  pub order: Vec<String>,
}

impl Contents {
  pub fn get(&self, content_id: &str) -> Option<&ContentEntry> {
    self.by_id.get(content_id)
  }

  pub fn insert(&mut self, content_id: impl Into<String>, entry: ContentEntry) {
    let content_id = content_id.into();
    if !self.by_id.contains_key(&content_id) {
      self.order.push(content_id.clone());
    }
    self.by_id.insert(content_id, entry);
  }

  /// Entries in authored order, followed by any entries missing from `order`.
  pub fn iter(&self) -> impl Iterator<Item = (&String, &ContentEntry)> {
    let ordered = self
      .order
      .iter()
      .filter_map(|id| self.by_id.get_key_value(id));
    let unordered = self
      .by_id
      .iter()
      .filter(|(id, _)| !self.order.contains(*id));
    ordered.chain(unordered)
  }

  /// First entry carrying the given type tag.
  pub fn find_type(&self, content_type: &ContentType) -> Option<(&String, &ContentEntry)> {
    self.iter().find(|(_, e)| &e.content_type == content_type)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_unknown_content_type_round_trips() {
    let entry: ContentEntry =
      serde_json::from_value(json!({"type": "ArrayImage", "data": []})).unwrap();
    assert_eq!(entry.content_type, ContentType::Other("ArrayImage".into()));

    let back = serde_json::to_value(&entry).unwrap();
    assert_eq!(back["type"], "ArrayImage");
  }

  #[test]
  fn test_contents_iterate_in_authored_order() {
    let mut contents = Contents::default();
    contents.insert("b", ContentEntry::new(ContentType::String, json!("b")));
    contents.insert("a", ContentEntry::new(ContentType::String, json!("a")));

    let ids: Vec<&String> = contents.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["b", "a"]);
  }

  #[test]
  fn test_data_ref() {
    let entry = ContentEntry::new(ContentType::Object, json!({"ref": "a/results/out"}));
    assert_eq!(entry.data_ref(), Some("a/results/out"));

    let entry = ContentEntry::new(ContentType::String, json!("plain"));
    assert_eq!(entry.data_ref(), None);
  }
}
