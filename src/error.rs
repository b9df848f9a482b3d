//! Error taxonomy for the offline cache.

use thiserror::Error;

/// Errors raised by the local store and cache gateway.
#[derive(Error, Debug)]
pub enum CacheError {
  /// The store could not be opened or initialized at all.
  /// Fatal for every cache operation; never retried internally.
  #[error("local store unavailable: {0}")]
  StorageUnavailable(String),

  /// A read/write transaction failed after the store was opened.
  #[error("cache transaction failed: {0}")]
  Transaction(#[from] rusqlite::Error),

  /// The store's connection lock was poisoned by a panicking holder.
  #[error("local store lock poisoned")]
  LockPoisoned,

  /// A record or pending-action payload could not be (de)serialized.
  #[error("cache serialization failed: {0}")]
  Serialize(#[from] serde_json::Error),

  /// The requested secondary index does not exist on the collection.
  #[error("collection {collection} has no index {index}")]
  IndexUnknown {
    collection: &'static str,
    index: &'static str,
  },

  /// A persisted row no longer decodes (unknown tag, bad header map).
  #[error("corrupt cache row: {0}")]
  Corrupt(String),
}

/// Error from a remote fetch or replay request.
///
/// The cache core consumes `{ data, error }` shaped replies, not a specific
/// transport, so the remote failure is carried as a message.
#[derive(Error, Debug, Clone)]
#[error("remote request failed: {0}")]
pub struct RemoteFetchError(pub String);

impl From<reqwest::Error> for RemoteFetchError {
  fn from(e: reqwest::Error) -> Self {
    RemoteFetchError(e.to_string())
  }
}

/// The platform's background sync capability is absent or refused the
/// registration. Always swallowed after logging, never surfaced.
#[derive(Error, Debug, Clone)]
#[error("background sync trigger unavailable: {0}")]
pub struct SyncTriggerUnavailable(pub String);

/// Error surfaced by an offline-aware query, tagged with its source
/// so consumers can render remote and cache failures differently.
#[derive(Error, Debug)]
pub enum QueryError {
  #[error(transparent)]
  Remote(#[from] RemoteFetchError),

  #[error(transparent)]
  Cache(#[from] CacheError),
}
