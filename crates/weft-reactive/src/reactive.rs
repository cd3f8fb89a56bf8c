use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::trace;

use crate::error::ReactiveError;
use crate::path::{PathSegment, display_path};
use crate::tree::Tree;

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
  Overwrite,
  Append,
  Remove,
}

/// A single mutation as seen by observers.
///
/// For `Append` the path names the list and `new_value` is the appended item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
  pub path: Vec<PathSegment>,
  pub operation: Operation,
  pub new_value: Value,
  pub old_value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&Mutation) + Send + Sync>;

struct Inner {
  root: Tree,
  observers: Vec<(SubscriptionId, Observer)>,
  next_id: u64,
}

/// Shared handle to an observable value tree.
///
/// Cloning the handle shares the tree and its observers. Use
/// [`Reactive::deep_copy`] for an independent copy.
#[derive(Clone)]
pub struct Reactive {
  inner: Arc<Mutex<Inner>>,
}

impl Reactive {
  pub fn new(value: Value) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        root: Tree::from(value),
        observers: Vec::new(),
        next_id: 0,
      })),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Copy of the current value tree with no observers attached.
  pub fn deep_copy(&self) -> Self {
    Self::new(self.value())
  }

  /// Current value of the whole tree.
  pub fn value(&self) -> Value {
    self.lock().root.to_value()
  }

  pub fn get(&self, path: &[PathSegment]) -> Option<Value> {
    self.lock().root.get(path).map(Tree::to_value)
  }

  /// Assign `value` at `path`, creating a missing map key.
  ///
  /// Assigning a value equal to the current one does nothing and notifies no one.
  pub fn set(&self, path: &[PathSegment], value: Value) -> Result<(), ReactiveError> {
    let (old_value, observers) = {
      let mut inner = self.lock();
      let old_value = match path.split_last() {
        None => {
          let old = inner.root.to_value();
          if old == value {
            return Ok(());
          }
          inner.root = Tree::from(value.clone());
          old
        }
        Some((last, parent_path)) => {
          let parent = inner.root.get_mut(parent_path)?;
          match (parent, last) {
            (Tree::Map(map), PathSegment::Key(key)) => {
              let old = map.get(key).map(Tree::to_value);
              if old.as_ref() == Some(&value) {
                return Ok(());
              }
              map.insert(key.clone(), Tree::from(value.clone()));
              old.unwrap_or(Value::Null)
            }
            (Tree::List(items), PathSegment::Index(index)) => {
              let len = items.len();
              let slot = items
                .get_mut(*index)
                .ok_or_else(|| ReactiveError::IndexOutOfRange {
                  path: display_path(parent_path),
                  index: *index,
                  len,
                })?;
              let old = slot.to_value();
              if old == value {
                return Ok(());
              }
              *slot = Tree::from(value.clone());
              old
            }
            (_, PathSegment::Key(_)) => {
              return Err(ReactiveError::TypeMismatch {
                path: display_path(parent_path),
                expected: "map",
              });
            }
            (_, PathSegment::Index(_)) => {
              return Err(ReactiveError::TypeMismatch {
                path: display_path(parent_path),
                expected: "list",
              });
            }
          }
        }
      };
      (old_value, snapshot(&inner))
    };

    notify(
      &observers,
      Mutation {
        path: path.to_vec(),
        operation: Operation::Overwrite,
        new_value: value,
        old_value,
      },
    );
    Ok(())
  }

  /// Append `value` to the list at `path`.
  pub fn push(&self, path: &[PathSegment], value: Value) -> Result<(), ReactiveError> {
    let observers = {
      let mut inner = self.lock();
      match inner.root.get_mut(path)? {
        Tree::List(items) => items.push(Tree::from(value.clone())),
        _ => {
          return Err(ReactiveError::TypeMismatch {
            path: display_path(path),
            expected: "list",
          });
        }
      }
      snapshot(&inner)
    };

    notify(
      &observers,
      Mutation {
        path: path.to_vec(),
        operation: Operation::Append,
        new_value: value,
        old_value: Value::Null,
      },
    );
    Ok(())
  }

  /// Delete the map key or list element at `path`, returning the removed value.
  pub fn remove(&self, path: &[PathSegment]) -> Result<Value, ReactiveError> {
    let Some((last, parent_path)) = path.split_last() else {
      return Err(ReactiveError::RemoveRoot);
    };

    let (removed, observers) = {
      let mut inner = self.lock();
      let removed = match (inner.root.get_mut(parent_path)?, last) {
        (Tree::Map(map), PathSegment::Key(key)) => {
          map.remove(key).ok_or_else(|| ReactiveError::NotFound {
            path: display_path(path),
          })?
        }
        (Tree::List(items), PathSegment::Index(index)) => {
          if *index >= items.len() {
            return Err(ReactiveError::IndexOutOfRange {
              path: display_path(parent_path),
              index: *index,
              len: items.len(),
            });
          }
          items.remove(*index)
        }
        (_, PathSegment::Key(_)) => {
          return Err(ReactiveError::TypeMismatch {
            path: display_path(parent_path),
            expected: "map",
          });
        }
        (_, PathSegment::Index(_)) => {
          return Err(ReactiveError::TypeMismatch {
            path: display_path(parent_path),
            expected: "list",
          });
        }
      };
      (removed.to_value(), snapshot(&inner))
    };

    notify(
      &observers,
      Mutation {
        path: path.to_vec(),
        operation: Operation::Remove,
        new_value: Value::Null,
        old_value: removed.clone(),
      },
    );
    Ok(removed)
  }

  /// Register an observer called once per mutation.
  pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
  where
    F: Fn(&Mutation) + Send + Sync + 'static,
  {
    let mut inner = self.lock();
    let id = SubscriptionId(inner.next_id);
    inner.next_id += 1;
    inner.observers.push((id, Arc::new(observer)));
    id
  }

  /// Returns `false` when the subscription was already gone.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut inner = self.lock();
    let before = inner.observers.len();
    inner.observers.retain(|(sid, _)| *sid != id);
    inner.observers.len() != before
  }

  pub fn observer_count(&self) -> usize {
    self.lock().observers.len()
  }
}

fn snapshot(inner: &Inner) -> Vec<Observer> {
  inner.observers.iter().map(|(_, o)| o.clone()).collect()
}

fn notify(observers: &[Observer], mutation: Mutation) {
  trace!(
    path = %display_path(&mutation.path),
    operation = ?mutation.operation,
    observers = observers.len(),
    "reactive_mutation"
  );
  for observer in observers {
    observer(&mutation);
  }
}

impl Default for Reactive {
  fn default() -> Self {
    Self::new(Value::Null)
  }
}

impl From<Value> for Reactive {
  fn from(value: Value) -> Self {
    Self::new(value)
  }
}

impl PartialEq for Reactive {
  fn eq(&self, other: &Self) -> bool {
    self.value() == other.value()
  }
}

impl fmt::Debug for Reactive {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.lock();
    f.debug_struct("Reactive")
      .field("value", &inner.root.to_value())
      .field("observers", &inner.observers.len())
      .finish()
  }
}

impl Serialize for Reactive {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for Reactive {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Value::deserialize(deserializer).map(Reactive::new)
  }
}
