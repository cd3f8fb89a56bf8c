use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a node instance and of each of its output handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
  #[default]
  Pending,
  Running,
  Success,
  Error,
  Canceled,
  /// Never executes; only reports derived state.
  Passive,
}

impl RunStatus {
  /// Whether the status is final for a non-passive instance.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      RunStatus::Success | RunStatus::Error | RunStatus::Canceled
    )
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Pending => "Pending",
      RunStatus::Running => "Running",
      RunStatus::Success => "Success",
      RunStatus::Error => "Error",
      RunStatus::Canceled => "Canceled",
      RunStatus::Passive => "Passive",
    }
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How predecessor output-handle statuses combine into "may run".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinPolicy {
  /// Every predecessor handle must read `Success`.
  #[default]
  And,
  /// At least one predecessor handle must read `Success`.
  Or,
}

impl JoinPolicy {
  /// Evaluate over predecessor handle statuses. No predecessors always passes.
  pub fn admits(&self, statuses: &[RunStatus]) -> bool {
    if statuses.is_empty() {
      return true;
    }
    match self {
      JoinPolicy::And => statuses.iter().all(|s| *s == RunStatus::Success),
      JoinPolicy::Or => statuses.iter().any(|s| *s == RunStatus::Success),
    }
  }
}
