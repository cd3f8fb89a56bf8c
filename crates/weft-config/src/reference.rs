//! Content references.
//!
//! A reference names one content entry of one node: `<template_id><placeholders>/<group>/<content_id>`.
//! Each `#` placeholder segment stands for one enclosing iteration level of
//! the referenced node, so `double#/results/out` is the `out` result of
//! whichever `double` instance shares the reader's current loop index.
//! A placeholder may carry a word token (`#i`, `#0`); the token is ignored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::content::ContentGroup;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentRef {
  pub template_id: String,
  /// Number of placeholder segments, i.e. the nesting depth of the referenced node.
  pub depth: usize,
  pub group: ContentGroup,
  pub content_id: String,
}

impl ContentRef {
  pub fn new(
    template_id: impl Into<String>,
    depth: usize,
    group: ContentGroup,
    content_id: impl Into<String>,
  ) -> Self {
    Self {
      template_id: template_id.into(),
      depth,
      group,
      content_id: content_id.into(),
    }
  }
}

fn invalid(reference: &str, message: &str) -> ConfigError {
  ConfigError::InvalidReference {
    reference: reference.to_string(),
    message: message.to_string(),
  }
}

impl FromStr for ContentRef {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.splitn(3, '/');
    let (Some(node_part), Some(group), Some(content_id)) = (parts.next(), parts.next(), parts.next())
    else {
      return Err(invalid(s, "expected <node>/<group>/<content>"));
    };

    let group = ContentGroup::parse(group)
      .ok_or_else(|| invalid(s, "group must be 'payloads' or 'results'"))?;
    if content_id.is_empty() || content_id.contains('/') {
      return Err(invalid(s, "content id must be a single non-empty segment"));
    }

    let mut segments = node_part.split('#');
    let template_id = segments.next().unwrap_or_default();
    if template_id.is_empty() {
      return Err(invalid(s, "node id is empty"));
    }

    let mut depth = 0;
    for token in segments {
      if !token.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(invalid(s, "placeholder tokens may only contain word characters"));
      }
      depth += 1;
    }

    Ok(Self::new(template_id, depth, group, content_id))
  }
}

impl fmt::Display for ContentRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}{}/{}/{}",
      self.template_id,
      "#".repeat(self.depth),
      self.group,
      self.content_id
    )
  }
}

impl TryFrom<String> for ContentRef {
  type Error = ConfigError;

  fn try_from(s: String) -> Result<Self, Self::Error> {
    s.parse()
  }
}

impl From<ContentRef> for String {
  fn from(r: ContentRef) -> Self {
    r.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_root_reference() {
    let r: ContentRef = "llm/results/answer".parse().unwrap();
    assert_eq!(r.template_id, "llm");
    assert_eq!(r.depth, 0);
    assert_eq!(r.group, ContentGroup::Results);
    assert_eq!(r.content_id, "answer");
  }

  #[test]
  fn test_placeholder_tokens_are_ignored() {
    let a: ContentRef = "double#i#j/results/out".parse().unwrap();
    let b: ContentRef = "double##/results/out".parse().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.depth, 2);
    assert_eq!(a.to_string(), "double##/results/out");
  }

  #[test]
  fn test_rejects_malformed_references() {
    assert!("nogroup".parse::<ContentRef>().is_err());
    assert!("a/state/x".parse::<ContentRef>().is_err());
    assert!("#0/results/x".parse::<ContentRef>().is_err());
    assert!("a#-1/results/x".parse::<ContentRef>().is_err());
    assert!("a/results/".parse::<ContentRef>().is_err());
  }
}
