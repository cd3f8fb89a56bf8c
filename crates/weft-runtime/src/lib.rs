//! Workflow execution core.
//!
//! A [`WorkflowRun`] materializes every root-level node of a
//! [`WorkflowDef`](weft_config::WorkflowDef) as a [`NodeInstance`] and runs
//! each one as its own task. An instance waits for the completion signals of
//! its predecessors, evaluates its [`JoinPolicy`] over their output-handle
//! statuses, and then either runs its [`NodeKind`] body or settles as
//! `Canceled`.
//!
//! Iteration and retry kinds expand the graph while it runs: they create
//! fresh instances of their children at a deeper [`NestLayout`], wire them to
//! their boundary nodes, and remove them again when an attempt fails.
//!
//! Progress is reported as [`ProgressEvent`]s on per-run channels of a
//! shared [`ProgressRegistry`]. The [`RunManager`] is the front door that
//! validates, starts, observes and stops runs.

mod config;
mod context;
mod error;
mod expand;
mod instance;
mod layout;
mod manager;
mod node;
pub mod nodes;
mod progress;
mod registry;
mod run;
mod scheduler;
mod signal;
mod status;

pub use config::RunnerConfig;
pub use context::RunContext;
pub use error::{NodeError, RuntimeError};
pub use instance::{ContentSlot, ContentSlots, NodeInstance, WaitEdge};
pub use layout::{InstanceKey, NestLayout};
pub use manager::{RunManager, RunRequest, RunResponse};
pub use node::{NodeCtx, NodeKind};
pub use progress::{Channel, ChannelKey, NodeUpdate, ProgressEvent, ProgressRegistry, UpdateOp};
pub use registry::NodeRegistry;
pub use run::{RunOutcome, WorkflowRun};
pub use signal::CompletionSignal;
pub use status::{JoinPolicy, RunStatus};
