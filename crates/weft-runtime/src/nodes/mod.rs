//! Built-in node kinds.

mod attached;
mod branch_aggregate;
mod cond_branch;
mod iter_retry_run;
mod iter_run;
mod jinja2_template;
mod retry_run;
mod text_input;

pub use attached::Boundary;
pub use branch_aggregate::BranchAggregate;
pub use cond_branch::CondBranch;
pub use iter_retry_run::IterRetryRun;
pub use iter_run::IterRun;
pub use jinja2_template::Jinja2Template;
pub use retry_run::RetryRun;
pub use text_input::TextInput;

use weft_config::AttachedRole;

use crate::registry::NodeRegistry;

/// Content ids the built-in kinds read and write.
pub mod ids {
  pub const ITER_LIST: &str = "D_ITERLIST";
  pub const ITER_CONFIG: &str = "D_ITER_CONFIG";
  pub const RETRY_CONFIG: &str = "D_RETRY_CONFIG";
  pub const RETRY_INOUT: &str = "D_RETRY_INOUT";
  pub const CONDITIONS: &str = "D_CONDITIONS";
  pub const BRANCHES: &str = "D_BRANCHES";
  pub const VARS_INPUT: &str = "D_VARSINPUT";
  pub const TEMPLATE: &str = "D_TEMPLATE";
  pub const OUTPUT: &str = "D_OUTPUT";
}

pub(crate) fn register_builtins(registry: &mut NodeRegistry) {
  registry
    .register(Boundary::new(AttachedRole::Input))
    .register(Boundary::new(AttachedRole::Output))
    .register(Boundary::new(AttachedRole::Next))
    .register(TextInput)
    .register(CondBranch)
    .register(BranchAggregate)
    .register(Jinja2Template)
    .register(IterRun)
    .register(RetryRun)
    .register(IterRetryRun);
}
