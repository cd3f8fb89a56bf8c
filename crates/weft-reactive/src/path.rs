use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a path into a value tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
  Index(usize),
  Key(String),
}

impl From<&str> for PathSegment {
  fn from(key: &str) -> Self {
    PathSegment::Key(key.to_string())
  }
}

impl From<String> for PathSegment {
  fn from(key: String) -> Self {
    PathSegment::Key(key)
  }
}

impl From<usize> for PathSegment {
  fn from(index: usize) -> Self {
    PathSegment::Index(index)
  }
}

impl fmt::Display for PathSegment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PathSegment::Index(i) => write!(f, "{}", i),
      PathSegment::Key(k) => f.write_str(k),
    }
  }
}

/// Dotted rendering of a path, `$` for the root.
pub fn display_path(path: &[PathSegment]) -> String {
  if path.is_empty() {
    return "$".to_string();
  }
  path
    .iter()
    .map(|s| s.to_string())
    .collect::<Vec<_>>()
    .join(".")
}
