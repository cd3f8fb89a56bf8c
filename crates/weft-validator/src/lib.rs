//! Weft Validator
//!
//! Design-time checks for a [`WorkflowDef`](weft_config::WorkflowDef), run
//! before any execution starts:
//!
//! - structural wiring: unknown nodes, parents and handles, edges that cross
//!   nesting levels, and edge-level cycles
//! - per-node checks through a [`NodeChecker`], fed with the set of variable
//!   references each node can see
//!
//! Every problem found is collected into a [`ValidationError`] record for
//! its node. Validation never stops at the first failure.

mod checks;
mod graph;
mod validator;
mod variables;

pub use checks::{check_content_refs, collect_content_refs};
pub use graph::HandleGraph;
pub use validator::{NodeChecker, ValidationError, Validator};
pub use variables::{HandleKind, UpstreamVars, VarItem, VisibleVariables};
