//! Offline-aware query: one logical read that transparently works
//! online or offline.
//!
//! An `OfflineQuery<T>` owns a remote fetcher and a handle to the cache.
//! While reachable it fetches from the remote and mirrors the rows into
//! the local store; while unreachable it serves the cached rows instead.
//! Loading and error states are tracked so a consuming view can render
//! spinners and failures.
//!
//! # Example
//!
//! ```ignore
//! let mut query = OfflineQuery::new(gateway, monitor.subscribe(), move || {
//!   let client = client.clone();
//!   async move { client.list_expenses().await }
//! });
//!
//! // Kick off a read
//! query.refresh();
//!
//! // In the event loop tick
//! if query.poll() {
//!   // State changed, re-render
//! }
//! ```

use std::future::Future;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::cache::{CacheGateway, CachedRecord};
use crate::error::{CacheError, QueryError, RemoteFetchError};

/// A boxed future producing a remote reply.
///
/// `Ok(Some(rows))` is a reply with data, `Ok(None)` is the remote's
/// "no data, no error" shape (the current result is left untouched),
/// `Err` is a remote failure.
type FetchFuture<T> = BoxFuture<'static, Result<Option<Vec<T>>, RemoteFetchError>>;

/// A factory producing fetch futures, called once per online refresh.
type FetcherFn<T> = Box<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// How a refresh resolved, delivered back from the worker task.
enum Outcome<T> {
  Resolved {
    rows: Option<Vec<T>>,
    /// A mirror-to-store failure. Nonfatal: the fetched rows stand.
    cache_error: Option<CacheError>,
  },
  Failed(QueryError),
}

/// Offline-aware read with loading/error state.
pub struct OfflineQuery<T: CachedRecord> {
  gateway: CacheGateway,
  online_rx: watch::Receiver<bool>,
  fetcher: FetcherFn<T>,
  data: Option<Vec<T>>,
  error: Option<QueryError>,
  cache_error: Option<CacheError>,
  loading: bool,
  receiver: Option<mpsc::UnboundedReceiver<Outcome<T>>>,
}

impl<T: CachedRecord + 'static> OfflineQuery<T> {
  /// Create a query over the given gateway and reachability stream.
  ///
  /// The fetcher is a closure returning a future; it is invoked on each
  /// refresh that happens while online.
  pub fn new<F, Fut>(
    gateway: CacheGateway,
    online_rx: watch::Receiver<bool>,
    fetcher: F,
  ) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Vec<T>>, RemoteFetchError>> + Send + 'static,
  {
    Self {
      gateway,
      online_rx,
      fetcher: Box::new(move || Box::pin(fetcher())),
      data: None,
      error: None,
      cache_error: None,
      loading: false,
      receiver: None,
    }
  }

  /// Current result set. None before the first resolution.
  pub fn data(&self) -> Option<&[T]> {
    self.data.as_deref()
  }

  /// True exactly while a fetch or cache read is in flight.
  pub fn is_loading(&self) -> bool {
    self.loading
  }

  /// Last failure; cleared by the next resolution that carries rows.
  pub fn error(&self) -> Option<&QueryError> {
    self.error.as_ref()
  }

  /// Failure of the last cache mirror, if any. The fetched result it
  /// accompanied was still delivered.
  pub fn cache_error(&self) -> Option<&CacheError> {
    self.cache_error.as_ref()
  }

  /// Current reachability, as the monitor reports it.
  pub fn is_online(&self) -> bool {
    *self.online_rx.borrow()
  }

  /// Start a refresh. Cancels a still-pending one: when reachability
  /// flips mid-flight, the newer resolution wins.
  ///
  /// Online: run the fetcher; rows replace the result and are mirrored
  /// into the store (a mirror failure is logged and kept visible through
  /// [`cache_error`], the fetched result stands). A remote failure sets
  /// the error and leaves the result at its previous value; there is no
  /// fallback to cached rows on a fetch error.
  ///
  /// Offline: the cached rows become the result; a store failure is the
  /// query's error.
  ///
  /// [`cache_error`]: OfflineQuery::cache_error
  pub fn refresh(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.loading = true;

    let gateway = self.gateway.clone();
    let fetch = self.is_online().then(|| (self.fetcher)());

    tokio::spawn(async move {
      let outcome = match fetch {
        Some(future) => match future.await {
          Ok(Some(rows)) => {
            let cache_error = gateway.cache_records(&rows).err();
            if let Some(e) = &cache_error {
              warn!(error = %e, "failed to mirror fetched rows into cache");
            }
            Outcome::Resolved {
              rows: Some(rows),
              cache_error,
            }
          }
          Ok(None) => Outcome::Resolved {
            rows: None,
            cache_error: None,
          },
          Err(e) => Outcome::Failed(QueryError::Remote(e)),
        },
        None => match gateway.cached_records::<T>() {
          Ok(rows) => Outcome::Resolved {
            rows: Some(rows),
            cache_error: None,
          },
          Err(e) => Outcome::Failed(QueryError::Cache(e)),
        },
      };

      // Ignore send errors: the refresh may have been superseded.
      let _ = tx.send(outcome);
    });
  }

  /// Poll for the result of a pending refresh.
  ///
  /// Returns true if the state changed. Call from the event loop tick.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(outcome) => {
        self.apply(outcome);
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.error = Some(QueryError::Remote(RemoteFetchError(
          "query was cancelled".into(),
        )));
        self.loading = false;
        self.receiver = None;
        true
      }
    }
  }

  /// Refresh and wait for the resolution to land.
  pub async fn resolve(&mut self) {
    self.refresh();
    // The receiver was just installed by refresh().
    if let Some(mut rx) = self.receiver.take() {
      match rx.recv().await {
        Some(outcome) => self.apply(outcome),
        None => {
          self.error = Some(QueryError::Remote(RemoteFetchError(
            "query was cancelled".into(),
          )));
          self.loading = false;
        }
      }
    }
  }

  /// Wait for the next reachability transition, then re-resolve.
  ///
  /// Returns false once the monitor side of the channel is gone; loop on
  /// this for the lifetime of the consuming view.
  pub async fn on_reachability_change(&mut self) -> bool {
    if self.online_rx.changed().await.is_err() {
      return false;
    }
    self.resolve().await;
    true
  }

  fn apply(&mut self, outcome: Outcome<T>) {
    match outcome {
      Outcome::Resolved { rows, cache_error } => {
        if let Some(rows) = rows {
          self.data = Some(rows);
          self.error = None;
        }
        // A dataless reply leaves both result and error untouched.
        self.cache_error = cache_error;
      }
      Outcome::Failed(e) => {
        self.error = Some(e);
      }
    }
    self.loading = false;
    self.receiver = None;
  }
}

impl<T: CachedRecord + std::fmt::Debug> std::fmt::Debug for OfflineQuery<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OfflineQuery")
      .field("data", &self.data)
      .field("loading", &self.loading)
      .field("error", &self.error)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chrono::{NaiveDate, TimeZone, Utc};

  use super::*;
  use crate::cache::RecordIndex;
  use crate::models::Expense;
  use crate::store::Store;

  fn gateway() -> CacheGateway {
    CacheGateway::new(Arc::new(Store::open_in_memory().unwrap()))
  }

  fn expense(id: &str, amount: f64) -> Expense {
    Expense {
      id: id.into(),
      farm_id: "farm-1".into(),
      crop_record_id: None,
      user_id: "user-1".into(),
      expense_type: "seeds".into(),
      amount,
      description: None,
      expense_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
      created_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    }
  }

  fn online_channel(initial: bool) -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(initial)
  }

  #[tokio::test]
  async fn online_fetch_replaces_result_and_mirrors_to_cache() {
    let gateway = gateway();
    let (_tx, rx) = online_channel(true);

    let mut query = OfflineQuery::new(gateway.clone(), rx, || async {
      Ok(Some(vec![expense("e1", 120.0), expense("e2", 80.5)]))
    });

    query.resolve().await;

    assert!(!query.is_loading());
    assert!(query.error().is_none());
    assert_eq!(query.data().unwrap().len(), 2);

    // The fetched rows were mirrored for offline use.
    let cached: Vec<Expense> = gateway.cached_records().unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0].id, "e1");
  }

  #[tokio::test]
  async fn offline_read_serves_cached_rows() {
    let gateway = gateway();
    gateway
      .cache_records(&[expense("e1", 42.0)])
      .unwrap();

    let (_tx, rx) = online_channel(false);
    let mut query: OfflineQuery<Expense> = OfflineQuery::new(gateway, rx, || async {
      panic!("fetcher must not run while offline")
    });

    query.resolve().await;

    assert!(!query.is_online());
    assert!(query.error().is_none());
    let rows = query.data().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount, 42.0);
  }

  #[tokio::test]
  async fn remote_failure_keeps_previous_result() {
    let gateway = gateway();
    let (_tx, rx) = online_channel(true);

    let mut query: OfflineQuery<Expense> = OfflineQuery::new(gateway, rx, || async {
      Err(RemoteFetchError("boom".into()))
    });

    query.resolve().await;

    // No silent fallback to cache on a fetch error.
    assert!(query.data().is_none());
    assert!(matches!(query.error(), Some(QueryError::Remote(_))));
  }

  #[tokio::test]
  async fn dataless_reply_leaves_result_untouched() {
    let gateway = gateway();
    let (_tx, rx) = online_channel(true);

    let mut query = OfflineQuery::new(gateway, rx, || async { Ok(None) });
    query.resolve().await;
    assert!(query.data().is_none());
    assert!(query.error().is_none());

    // Seed a result, then a dataless reply must not clobber it.
    let rows = vec![expense("e1", 5.0)];
    query.data = Some(rows);
    query.resolve().await;
    assert_eq!(query.data().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn error_clears_on_next_successful_resolution() {
    let gateway = gateway();
    let (tx, rx) = online_channel(true);

    let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = attempts.clone();
    let mut query = OfflineQuery::new(gateway, rx, move || {
      let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      async move {
        if n == 0 {
          Err(RemoteFetchError("first call fails".into()))
        } else {
          Ok(Some(vec![expense("e1", 9.0)]))
        }
      }
    });

    query.resolve().await;
    assert!(query.error().is_some());

    query.resolve().await;
    assert!(query.error().is_none());
    assert_eq!(query.data().unwrap().len(), 1);

    drop(tx);
  }

  #[tokio::test]
  async fn loading_is_true_while_in_flight() {
    let gateway = gateway();
    let (_tx, rx) = online_channel(true);

    let mut query = OfflineQuery::new(gateway, rx, || async {
      tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      Ok(Some(vec![expense("e1", 1.0)]))
    });

    query.refresh();
    assert!(query.is_loading());
    assert!(!query.poll());

    tokio::time::sleep(std::time::Duration::from_millis(80)).await;
    assert!(query.poll());
    assert!(!query.is_loading());
    assert_eq!(query.data().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn reachability_flip_triggers_requery() {
    let gateway = gateway();
    gateway.cache_records(&[expense("e1", 3.0)]).unwrap();

    let (tx, rx) = online_channel(true);
    let mut query = OfflineQuery::new(gateway, rx, || async {
      Ok(Some(vec![expense("e1", 3.0), expense("e2", 4.0)]))
    });

    query.resolve().await;
    assert_eq!(query.data().unwrap().len(), 2);

    // Going offline: the next resolution is served from cache.
    tx.send(false).unwrap();
    assert!(query.on_reachability_change().await);
    assert!(!query.is_online());
    assert_eq!(query.data().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn index_filtered_reads_match_query_results() {
    let gateway = gateway();
    let mut other = expense("e9", 7.0);
    other.user_id = "user-2".into();
    gateway
      .cache_records(&[expense("e1", 1.0), expense("e2", 2.0), other])
      .unwrap();

    let mine: Vec<Expense> = gateway
      .cached_records_by(RecordIndex::Owner, "user-1")
      .unwrap();
    assert_eq!(mine.len(), 2);

    let theirs: Vec<Expense> = gateway
      .cached_records_by(RecordIndex::Owner, "user-3")
      .unwrap();
    assert!(theirs.is_empty());
  }
}
