//! Replay of queued pending actions against the remote, plus the
//! best-effort background sync trigger.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheGateway;
use crate::error::{CacheError, RemoteFetchError, SyncTriggerUnavailable};
use crate::models::PendingAction;

// ============================================================================
// Background sync trigger
// ============================================================================

/// Best-effort "replay soon" notification, fired after each enqueue.
///
/// Modeled as fail-silent: success is unobservable to the enqueuer and
/// failure never propagates. This is a nudge, not a guaranteed trigger.
pub trait SyncTrigger: Send + Sync {
  fn request_sync(&self) -> Result<(), SyncTriggerUnavailable>;
}

/// Trigger used when the platform offers no background sync capability.
/// Absence of the capability is not an error.
pub struct NoopTrigger;

impl SyncTrigger for NoopTrigger {
  fn request_sync(&self) -> Result<(), SyncTriggerUnavailable> {
    Ok(())
  }
}

/// Trigger that nudges a channel; pair its receiver with
/// [`SyncEngine::run`] to replay whenever an enqueue happens.
pub struct ChannelTrigger {
  tx: mpsc::UnboundedSender<()>,
}

impl ChannelTrigger {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

impl SyncTrigger for ChannelTrigger {
  fn request_sync(&self) -> Result<(), SyncTriggerUnavailable> {
    self
      .tx
      .send(())
      .map_err(|_| SyncTriggerUnavailable("sync channel closed".into()))
  }
}

// ============================================================================
// Replay transport
// ============================================================================

/// Transport that delivers one recorded mutation to the remote.
pub trait SyncTransport: Send + Sync {
  fn send(
    &self,
    action: &PendingAction,
  ) -> impl std::future::Future<Output = Result<(), RemoteFetchError>> + Send;
}

/// HTTP transport: replays each action's recorded request envelope
/// (method, URL, headers, JSON payload) verbatim.
#[derive(Clone, Default)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl SyncTransport for HttpTransport {
  async fn send(&self, action: &PendingAction) -> Result<(), RemoteFetchError> {
    let url = Url::parse(&action.url)
      .map_err(|e| RemoteFetchError(format!("invalid target URL {}: {}", action.url, e)))?;
    let method = Method::from_bytes(action.method.as_bytes())
      .map_err(|e| RemoteFetchError(format!("invalid method {}: {}", action.method, e)))?;

    let mut headers = HeaderMap::new();
    for (name, value) in &action.headers {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| RemoteFetchError(format!("invalid header {}: {}", name, e)))?;
      let value = HeaderValue::from_str(value)
        .map_err(|e| RemoteFetchError(format!("invalid header value: {}", e)))?;
      headers.insert(name, value);
    }

    let mut request = self.client.request(method, url).headers(headers);
    if !action.payload.is_null() {
      request = request.json(&action.payload);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(RemoteFetchError(format!(
        "replay of action {} rejected: {}",
        action.id, status
      )));
    }

    Ok(())
  }
}

// ============================================================================
// Replay engine
// ============================================================================

/// Outcome of one replay run.
#[derive(Debug)]
pub struct SyncReport {
  /// Actions confirmed by the remote and removed from the queue.
  pub replayed: usize,
  /// Actions still queued when the run ended.
  pub remaining: usize,
  /// The failure that stopped the run, if it did not drain the queue.
  pub error: Option<RemoteFetchError>,
}

impl SyncReport {
  pub fn is_complete(&self) -> bool {
    self.remaining == 0
  }
}

/// Drains the pending-action queue against a transport.
///
/// Replay order is global insertion order (increasing sequence id), which
/// keeps dependent mutations correct: a record created offline is always
/// replayed before mutations that reference it. Each confirmed action is
/// deleted individually; the first failure stops the run so later actions
/// are never replayed ahead of an earlier one. No retry or backoff here.
pub struct SyncEngine<T: SyncTransport> {
  gateway: CacheGateway,
  transport: T,
}

impl<T: SyncTransport> SyncEngine<T> {
  pub fn new(gateway: CacheGateway, transport: T) -> Self {
    Self { gateway, transport }
  }

  /// Replay the queue once, front to back.
  pub async fn replay(&self) -> Result<SyncReport, CacheError> {
    let actions = self.gateway.pending_actions()?;
    let total = actions.len();

    if total == 0 {
      return Ok(SyncReport {
        replayed: 0,
        remaining: 0,
        error: None,
      });
    }

    info!(total, "replaying pending actions");

    let mut replayed = 0;
    for action in &actions {
      match self.transport.send(action).await {
        Ok(()) => {
          self.gateway.delete_pending_action(action.id)?;
          replayed += 1;
          debug!(id = action.id, kind = %action.kind, "pending action replayed");
        }
        Err(e) => {
          warn!(id = action.id, error = %e, "replay stopped");
          return Ok(SyncReport {
            replayed,
            remaining: total - replayed,
            error: Some(e),
          });
        }
      }
    }

    info!(replayed, "pending queue drained");
    Ok(SyncReport {
      replayed,
      remaining: 0,
      error: None,
    })
  }

  /// Replay whenever the trigger channel fires, until it closes.
  ///
  /// Collapses bursts: nudges that arrive during a run are drained before
  /// the next replay starts.
  pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<()>) {
    while rx.recv().await.is_some() {
      while rx.try_recv().is_ok() {}
      if let Err(e) = self.replay().await {
        warn!(error = %e, "replay run failed");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use super::*;
  use crate::cache::Collection;
  use crate::models::{ActionKind, NewPendingAction};
  use crate::store::Store;

  fn gateway() -> CacheGateway {
    CacheGateway::new(std::sync::Arc::new(Store::open_in_memory().unwrap()))
  }

  fn queue_action(gateway: &CacheGateway, collection: Collection, note: &str) -> i64 {
    gateway
      .add_pending_action(NewPendingAction {
        kind: ActionKind::Create,
        collection,
        payload: serde_json::json!({ "note": note }),
        url: format!("https://api.example.com/rest/v1/{}", collection.name()),
        method: "POST".into(),
        headers: BTreeMap::new(),
      })
      .unwrap()
  }

  /// Transport that records every delivery and accepts them all.
  struct RecordingTransport {
    sent: Mutex<Vec<i64>>,
  }

  impl SyncTransport for RecordingTransport {
    async fn send(&self, action: &PendingAction) -> Result<(), RemoteFetchError> {
      self.sent.lock().unwrap().push(action.id);
      Ok(())
    }
  }

  /// Transport that rejects the nth delivery.
  struct FailingTransport {
    calls: AtomicUsize,
    fail_at: usize,
  }

  impl SyncTransport for FailingTransport {
    async fn send(&self, _action: &PendingAction) -> Result<(), RemoteFetchError> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst);
      if call == self.fail_at {
        Err(RemoteFetchError("remote said no".into()))
      } else {
        Ok(())
      }
    }
  }

  #[tokio::test]
  async fn replay_drains_queue_in_insertion_order() {
    let gateway = gateway();
    queue_action(&gateway, Collection::Farms, "first");
    queue_action(&gateway, Collection::CropRecords, "second");
    queue_action(&gateway, Collection::Expenses, "third");

    let transport = RecordingTransport {
      sent: Mutex::new(Vec::new()),
    };
    let engine = SyncEngine::new(gateway.clone(), transport);

    let report = engine.replay().await.unwrap();
    assert_eq!(report.replayed, 3);
    assert_eq!(report.remaining, 0);
    assert!(report.is_complete());
    assert_eq!(gateway.pending_action_count().unwrap(), 0);

    // Deliveries happened in increasing sequence id order.
    let sent = engine.transport.sent.lock().unwrap().clone();
    let mut sorted = sent.clone();
    sorted.sort();
    assert_eq!(sent, sorted);
    assert_eq!(sent.len(), 3);
  }

  #[tokio::test]
  async fn replay_stops_at_first_failure() {
    let gateway = gateway();
    let first = queue_action(&gateway, Collection::Farms, "a");
    let second = queue_action(&gateway, Collection::Farms, "b");
    let third = queue_action(&gateway, Collection::Farms, "c");

    let engine = SyncEngine::new(
      gateway.clone(),
      FailingTransport {
        calls: AtomicUsize::new(0),
        fail_at: 1,
      },
    );

    let report = engine.replay().await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(report.remaining, 2);
    assert!(report.error.is_some());

    // The accepted action is gone; the failed one and everything after
    // it stay queued in order.
    let left: Vec<i64> = gateway.pending_actions().unwrap().iter().map(|a| a.id).collect();
    assert_eq!(left, vec![second, third]);
    assert!(!left.contains(&first));
  }

  #[tokio::test]
  async fn replay_of_empty_queue_is_a_noop() {
    let engine = SyncEngine::new(
      gateway(),
      RecordingTransport {
        sent: Mutex::new(Vec::new()),
      },
    );
    let report = engine.replay().await.unwrap();
    assert_eq!(report.replayed, 0);
    assert!(report.is_complete());
  }

  #[test]
  fn channel_trigger_fails_silently_when_closed() {
    let (trigger, rx) = ChannelTrigger::new();
    drop(rx);
    assert!(trigger.request_sync().is_err());
  }
}
