//! Weft Reactive
//!
//! Observable JSON value trees. A [`Reactive`] wraps a scalar, list or map
//! value; lists and maps inserted anywhere in the tree are wrapped
//! recursively, so a mutation at any depth is reported to the root's
//! observers with its full path, the operation, and the old and new values.
//!
//! Observers run synchronously before the mutating call returns. They run
//! outside the internal lock, so an observer may read the value it watches.
//!
//! ```
//! use serde_json::json;
//! use weft_reactive::{Operation, PathSegment, Reactive};
//!
//! let value = Reactive::new(json!({"items": [1, 2]}));
//! value.subscribe(|m| assert_eq!(m.operation, Operation::Append));
//! value.push(&[PathSegment::from("items")], json!(3)).unwrap();
//! assert_eq!(value.get(&[PathSegment::from("items"), 2.into()]), Some(json!(3)));
//! ```

mod error;
mod path;
mod reactive;
mod tree;

pub use error::ReactiveError;
pub use path::{PathSegment, display_path};
pub use reactive::{Mutation, Operation, Reactive, SubscriptionId};
