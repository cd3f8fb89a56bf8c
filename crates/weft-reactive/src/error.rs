use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
  #[error("no value at '{path}'")]
  NotFound { path: String },

  #[error("value at '{path}' is not a {expected}")]
  TypeMismatch { path: String, expected: &'static str },

  #[error("index {index} out of range at '{path}' (len {len})")]
  IndexOutOfRange {
    path: String,
    index: usize,
    len: usize,
  },

  #[error("the root value cannot be removed")]
  RemoveRoot,
}
