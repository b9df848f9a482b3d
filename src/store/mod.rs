//! The local store: one SQLite database mirroring the remote tables,
//! plus the pending-action queue.

pub mod records;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use rusqlite::Connection;

use crate::error::CacheError;

/// Shared handle for the process-wide store. Opened once and reused so
/// schema setup runs a single time.
static SHARED: OnceLock<Arc<Store>> = OnceLock::new();

/// Handle to the on-device cache database.
pub struct Store {
  conn: Mutex<Connection>,
  path: Option<PathBuf>,
}

impl Store {
  /// Open or create the store at the given path.
  ///
  /// Creates parent directories and runs schema setup on first use;
  /// opening an existing database never recreates its tables.
  pub fn open(path: &Path) -> Result<Self, CacheError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        CacheError::StorageUnavailable(format!("cannot create {}: {}", parent.display(), e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      CacheError::StorageUnavailable(format!("cannot open {}: {}", path.display(), e))
    })?;

    let store = Self {
      conn: Mutex::new(conn),
      path: Some(path.to_path_buf()),
    };
    store.init_schema()?;

    Ok(store)
  }

  /// Open a fresh in-memory store. Used by tests for isolation: every
  /// case gets its own backing store instead of the shared handle.
  pub fn open_in_memory() -> Result<Self, CacheError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| CacheError::StorageUnavailable(format!("cannot open in-memory store: {}", e)))?;

    let store = Self {
      conn: Mutex::new(conn),
      path: None,
    };
    store.init_schema()?;

    Ok(store)
  }

  /// Process-wide store handle, lazily opened at the default location
  /// (or `path` if given) on first call. Subsequent calls return the
  /// same handle and ignore `path`.
  pub fn shared(path: Option<&Path>) -> Result<Arc<Store>, CacheError> {
    if let Some(store) = SHARED.get() {
      return Ok(Arc::clone(store));
    }

    let resolved = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };
    let store = Arc::new(Self::open(&resolved)?);

    // A concurrent first call may have won the race; hand back whichever
    // handle landed in the slot.
    Ok(Arc::clone(SHARED.get_or_init(|| store)))
  }

  /// Default database path: `<data_dir>/agrosync/cache.db`.
  pub fn default_path() -> Result<PathBuf, CacheError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| CacheError::StorageUnavailable("could not determine data directory".into()))?;

    Ok(data_dir.join("agrosync").join("cache.db"))
  }

  /// Path of the backing database file, if on disk.
  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  fn init_schema(&self) -> Result<(), CacheError> {
    let conn = self.lock()?;
    conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| CacheError::StorageUnavailable(format!("schema setup failed: {}", e)))?;
    Ok(())
  }

  /// Lock the underlying connection for one operation.
  pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
    self.conn.lock().map_err(|_| CacheError::LockPoisoned)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn open_in_memory_creates_schema() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.lock().unwrap();
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
           ('farms', 'crop_records', 'expenses', 'crop_recommendations', 'pending_actions')",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(count, 5);
  }

  #[test]
  fn reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let store = Store::open(&path).unwrap();
      let conn = store.lock().unwrap();
      conn
        .execute(
          "INSERT INTO farms (id, user_id, data) VALUES ('f1', 'u1', '{}')",
          [],
        )
        .unwrap();
    }

    // Second open must not recreate tables or lose rows.
    let store = Store::open(&path).unwrap();
    let conn = store.lock().unwrap();
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM farms", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 1);
  }
}
