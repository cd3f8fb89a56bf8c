//! The per-instance lifecycle: wait, join, run, settle, signal.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::context::RunContext;
use crate::error::NodeError;
use crate::instance::NodeInstance;
use crate::node::NodeCtx;
use crate::progress::NodeUpdate;
use crate::signal::FireOnDrop;
use crate::status::RunStatus;

impl NodeInstance {
  /// Drive this instance to a terminal status.
  ///
  /// The completion signal fires when this future finishes or is dropped,
  /// whatever the outcome.
  #[instrument(
    name = "node",
    skip_all,
    fields(run_id = %run.run_id(), instance_id = %self.key())
  )]
  pub async fn invoke(self: Arc<Self>, run: Arc<RunContext>, cancel: CancellationToken) {
    let _fire = FireOnDrop(self.signal().clone());
    let ctx = NodeCtx {
      instance: self.clone(),
      run: run.clone(),
      cancel: cancel.clone(),
    };
    let kind = self.kind().clone();

    if kind.is_passive() {
      self.finish(RunStatus::Passive, None);
      let mut updates = self.status_updates();
      match kind.attach(&ctx) {
        Ok(extra) => updates.extend(extra),
        Err(e) => warn!(error = %e, "passive_attach_failed"),
      }
      run.publish_updates(&self, updates, true);
      return;
    }

    let waits = self.wait_edges();
    let ready = tokio::select! {
      biased;
      _ = cancel.cancelled() => false,
      _ = join_all(waits.iter().map(|w| w.signal.wait())) => true,
    };
    if !ready {
      debug!("node_canceled_while_waiting");
      self.settle(&run, RunStatus::Canceled, None);
      return;
    }

    let statuses: Vec<RunStatus> = waits
      .iter()
      .map(|w| {
        run
          .instance(&w.source)
          .map(|source| source.output_status(&w.handle))
          .unwrap_or(RunStatus::Canceled)
      })
      .collect();
    let policy = kind.join_policy();
    if !policy.admits(&statuses) {
      debug!(policy = ?policy, "node_skipped");
      self.settle(&run, RunStatus::Canceled, None);
      return;
    }

    self.set_status(RunStatus::Running);
    run.publish_updates(&self, vec![NodeUpdate::status(RunStatus::Running)], false);
    info!(node_type = %kind.name(), "node_started");

    let outcome = if kind.observes_cancel() {
      Some(kind.run(&ctx).await)
    } else {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = kind.run(&ctx) => Some(result),
      }
    };

    match outcome {
      Some(Ok(updates)) => {
        self.succeed();
        info!("node_completed");
        let mut all = self.status_updates();
        all.extend(updates);
        run.publish_updates(&self, all, true);
      }
      Some(Err(NodeError::Cancelled)) | None => {
        debug!("node_canceled");
        self.settle(&run, RunStatus::Canceled, None);
      }
      Some(Err(e)) => {
        error!(error = %e, "node_failed");
        self.settle(&run, RunStatus::Error, Some(e.to_string()));
      }
    }
  }

  /// Settle an instance that was created but will never be invoked.
  pub(crate) fn cancel_unstarted(&self, run: &RunContext) {
    if self.signal().is_fired() {
      return;
    }
    self.settle(run, RunStatus::Canceled, None);
    self.signal().fire();
  }

  fn settle(&self, run: &RunContext, status: RunStatus, error: Option<String>) {
    self.finish(status, error);
    run.publish_updates(self, self.status_updates(), true);
  }
}

