use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("invalid reference '{reference}': {message}")]
  InvalidReference { reference: String, message: String },
}
