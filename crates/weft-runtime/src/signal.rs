use std::sync::Arc;

use tokio::sync::watch;

/// Fire-once, observed-many completion signal.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
  tx: Arc<watch::Sender<bool>>,
}

impl Default for CompletionSignal {
  fn default() -> Self {
    Self::new()
  }
}

impl CompletionSignal {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(false);
    Self { tx: Arc::new(tx) }
  }

  /// Fire the signal. Returns `true` only for the call that actually fired it.
  pub fn fire(&self) -> bool {
    self.tx.send_if_modified(|fired| {
      if *fired {
        false
      } else {
        *fired = true;
        true
      }
    })
  }

  pub fn is_fired(&self) -> bool {
    *self.tx.borrow()
  }

  /// Wait until the signal has fired. Returns immediately if it already has.
  pub async fn wait(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives as long as `self`, so the channel cannot close here.
    let _ = rx.wait_for(|fired| *fired).await;
  }
}

/// Fires its signal when dropped, so a finished, failed or aborted task
/// never leaves waiters blocked.
pub(crate) struct FireOnDrop(pub(crate) CompletionSignal);

impl Drop for FireOnDrop {
  fn drop(&mut self) {
    self.0.fire();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_fires_exactly_once() {
    let signal = CompletionSignal::new();
    assert!(!signal.is_fired());
    assert!(signal.fire());
    assert!(!signal.fire());
    assert!(signal.is_fired());
  }

  #[tokio::test]
  async fn test_wait_after_fire_returns() {
    let signal = CompletionSignal::new();
    signal.fire();
    tokio::time::timeout(Duration::from_millis(100), signal.wait())
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_many_waiters_unblock() {
    let signal = CompletionSignal::new();
    let waiters: Vec<_> = (0..4)
      .map(|_| {
        let s = signal.clone();
        tokio::spawn(async move { s.wait().await })
      })
      .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    signal.fire();

    for waiter in waiters {
      tokio::time::timeout(Duration::from_millis(100), waiter)
        .await
        .unwrap()
        .unwrap();
    }
  }

  #[tokio::test]
  async fn test_drop_guard_fires() {
    let signal = CompletionSignal::new();
    {
      let _guard = FireOnDrop(signal.clone());
    }
    assert!(signal.is_fired());
  }
}
