/// Limits applied to every run a runner starts.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
  /// Upper bound on the list length an iteration node will expand.
  pub max_iterations: usize,
  /// Attempts a retry construct makes when its config does not say.
  pub default_retries: u32,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      max_iterations: 10_000,
      default_retries: 3,
    }
  }
}
