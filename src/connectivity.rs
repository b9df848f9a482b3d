//! Connectivity monitor: reachability plus the pending-mutation badge
//! count, exposed as observable state.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheGateway;

/// How often the pending-action count is refreshed.
const PENDING_POLL_PERIOD: Duration = Duration::from_secs(5);

/// Tracks online/offline transitions and periodically reports how many
/// mutations are queued for replay.
///
/// The embedder feeds platform transition events through [`set_online`];
/// observers subscribe to watch channels and see each flip immediately,
/// without polling. A background task refreshes the pending count for
/// the monitor's lifetime and stops on [`shutdown`] or drop, so no timer
/// outlives the consuming view.
///
/// [`set_online`]: ConnectivityMonitor::set_online
/// [`shutdown`]: ConnectivityMonitor::shutdown
pub struct ConnectivityMonitor {
  online_tx: watch::Sender<bool>,
  pending_rx: watch::Receiver<u64>,
  poll_task: JoinHandle<()>,
}

impl ConnectivityMonitor {
  /// Start a monitor with the platform's current reachability.
  pub fn new(gateway: CacheGateway, initial_online: bool) -> Self {
    Self::with_poll_period(gateway, initial_online, PENDING_POLL_PERIOD)
  }

  /// Same, with a custom pending-count poll period.
  pub fn with_poll_period(
    gateway: CacheGateway,
    initial_online: bool,
    period: Duration,
  ) -> Self {
    let (online_tx, _) = watch::channel(initial_online);
    let (pending_tx, pending_rx) = watch::channel(0u64);

    // First tick fires immediately, so the count is primed before the
    // first full period elapses.
    let poll_task = tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      loop {
        interval.tick().await;
        match gateway.pending_action_count() {
          Ok(count) => {
            pending_tx.send_replace(count);
          }
          Err(e) => warn!(error = %e, "pending count poll failed"),
        }
      }
    });

    Self {
      online_tx,
      pending_rx,
      poll_task,
    }
  }

  /// Record a platform reachability transition. Applied immediately,
  /// no debounce.
  pub fn set_online(&self, online: bool) {
    let changed = self.online_tx.send_if_modified(|current| {
      if *current != online {
        *current = online;
        true
      } else {
        false
      }
    });
    if changed {
      debug!(online, "reachability changed");
    }
  }

  /// Current reachability.
  pub fn is_online(&self) -> bool {
    *self.online_tx.borrow()
  }

  /// Subscribe to reachability transitions.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.online_tx.subscribe()
  }

  /// Most recently polled pending-action count.
  pub fn pending_actions(&self) -> u64 {
    *self.pending_rx.borrow()
  }

  /// Subscribe to pending-count updates.
  pub fn subscribe_pending(&self) -> watch::Receiver<u64> {
    self.pending_rx.clone()
  }

  /// Cancel the poll task. Idempotent; also runs on drop.
  pub fn shutdown(&self) {
    self.poll_task.abort();
  }
}

impl Drop for ConnectivityMonitor {
  fn drop(&mut self) {
    self.poll_task.abort();
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::sync::Arc;

  use super::*;
  use crate::cache::Collection;
  use crate::models::{ActionKind, NewPendingAction};
  use crate::store::Store;

  fn gateway() -> CacheGateway {
    CacheGateway::new(Arc::new(Store::open_in_memory().unwrap()))
  }

  #[tokio::test]
  async fn reachability_flips_are_observed_without_polling() {
    let monitor = ConnectivityMonitor::new(gateway(), false);
    assert!(!monitor.is_online());

    let mut rx = monitor.subscribe();
    monitor.set_online(true);

    // The transition lands within one event-loop tick.
    rx.changed().await.unwrap();
    assert!(*rx.borrow());
    assert!(monitor.is_online());
  }

  #[tokio::test]
  async fn redundant_transitions_do_not_notify() {
    let monitor = ConnectivityMonitor::new(gateway(), true);
    let mut rx = monitor.subscribe();

    monitor.set_online(true);
    assert!(!rx.has_changed().unwrap());
  }

  #[tokio::test(start_paused = true)]
  async fn pending_count_is_polled_on_the_interval() {
    let gateway = gateway();
    gateway
      .add_pending_action(NewPendingAction {
        kind: ActionKind::Create,
        collection: Collection::Farms,
        payload: serde_json::json!({}),
        url: "https://api.example.com/rest/v1/farms".into(),
        method: "POST".into(),
        headers: BTreeMap::new(),
      })
      .unwrap();

    let monitor = ConnectivityMonitor::new(gateway.clone(), true);
    let mut rx = monitor.subscribe_pending();

    // First poll fires immediately.
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), 1);

    gateway
      .add_pending_action(NewPendingAction {
        kind: ActionKind::Delete,
        collection: Collection::Farms,
        payload: serde_json::json!({}),
        url: "https://api.example.com/rest/v1/farms?id=eq.f1".into(),
        method: "DELETE".into(),
        headers: BTreeMap::new(),
      })
      .unwrap();

    // Next poll lands after the period elapses.
    tokio::time::advance(Duration::from_secs(5)).await;
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), 2);

    monitor.shutdown();
  }
}
