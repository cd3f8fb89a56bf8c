use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ReactiveError;
use crate::path::{PathSegment, display_path};

/// Wrapped value tree. Containers hold wrapped children so every level is addressable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tree {
  Scalar(Value),
  List(Vec<Tree>),
  Map(BTreeMap<String, Tree>),
}

impl From<Value> for Tree {
  fn from(value: Value) -> Self {
    match value {
      Value::Array(items) => Tree::List(items.into_iter().map(Tree::from).collect()),
      Value::Object(map) => Tree::Map(map.into_iter().map(|(k, v)| (k, Tree::from(v))).collect()),
      other => Tree::Scalar(other),
    }
  }
}

impl Tree {
  pub(crate) fn to_value(&self) -> Value {
    match self {
      Tree::Scalar(v) => v.clone(),
      Tree::List(items) => Value::Array(items.iter().map(Tree::to_value).collect()),
      Tree::Map(map) => Value::Object(
        map
          .iter()
          .map(|(k, v)| (k.clone(), v.to_value()))
          .collect(),
      ),
    }
  }

  pub(crate) fn get(&self, path: &[PathSegment]) -> Option<&Tree> {
    path.iter().try_fold(self, |node, segment| match (node, segment) {
      (Tree::Map(map), PathSegment::Key(k)) => map.get(k),
      (Tree::List(items), PathSegment::Index(i)) => items.get(*i),
      _ => None,
    })
  }

  pub(crate) fn get_mut(&mut self, path: &[PathSegment]) -> Result<&mut Tree, ReactiveError> {
    let mut node = self;
    for (depth, segment) in path.iter().enumerate() {
      let here = &path[..=depth];
      node = match (node, segment) {
        (Tree::Map(map), PathSegment::Key(k)) => {
          map.get_mut(k).ok_or_else(|| ReactiveError::NotFound {
            path: display_path(here),
          })?
        }
        (Tree::List(items), PathSegment::Index(i)) => {
          let len = items.len();
          items
            .get_mut(*i)
            .ok_or_else(|| ReactiveError::IndexOutOfRange {
              path: display_path(&path[..depth]),
              index: *i,
              len,
            })?
        }
        (_, PathSegment::Key(_)) => {
          return Err(ReactiveError::TypeMismatch {
            path: display_path(&path[..depth]),
            expected: "map",
          });
        }
        (_, PathSegment::Index(_)) => {
          return Err(ReactiveError::TypeMismatch {
            path: display_path(&path[..depth]),
            expected: "list",
          });
        }
      };
    }
    Ok(node)
  }
}
