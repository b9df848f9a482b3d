//! Cache gateway: translates domain-level cache operations into local
//! store transactions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::Value;
use tracing::{debug, warn};

use super::traits::{CachedRecord, Collection, RecordIndex};
use crate::error::CacheError;
use crate::models::{ActionKind, NewPendingAction, PendingAction};
use crate::store::Store;
use crate::sync::{NoopTrigger, SyncTrigger};

/// Read/write API over the local store.
///
/// Record operations are merge-style upserts keyed by the record's remote
/// id; queue operations manage the pending mutations recorded while
/// offline. Every mutating call runs inside one transaction that commits
/// or rolls back before the call returns.
#[derive(Clone)]
pub struct CacheGateway {
  store: Arc<Store>,
  trigger: Arc<dyn SyncTrigger>,
}

impl CacheGateway {
  /// Create a gateway over the given store, with no background sync
  /// trigger (the capability is optional).
  pub fn new(store: Arc<Store>) -> Self {
    Self {
      store,
      trigger: Arc::new(NoopTrigger),
    }
  }

  /// Attach a background sync trigger, nudged after each enqueue.
  pub fn with_trigger(mut self, trigger: Arc<dyn SyncTrigger>) -> Self {
    self.trigger = trigger;
    self
  }

  pub fn store(&self) -> &Arc<Store> {
    &self.store
  }

  // ==========================================================================
  // Record collections
  // ==========================================================================

  /// Upsert records into their collection, keyed by id.
  ///
  /// This is a merge, not a replace-all: rows absent from `records` are
  /// left in place, rows with a matching id are overwritten.
  pub fn cache_records<T: CachedRecord>(&self, records: &[T]) -> Result<(), CacheError> {
    let collection = T::collection();
    let sql = upsert_sql(collection);

    let mut conn = self.store.lock()?;
    let tx = conn.transaction()?;
    {
      let mut stmt = tx.prepare(&sql)?;
      for record in records {
        let mut values: Vec<SqlValue> = Vec::with_capacity(collection.indexes().len() + 2);
        values.push(SqlValue::from(record.cache_id().to_string()));
        for index in collection.indexes() {
          values.push(match record.index_value(*index) {
            Some(v) => SqlValue::from(v.to_string()),
            None => SqlValue::Null,
          });
        }
        values.push(SqlValue::from(serde_json::to_string(record)?));
        stmt.execute(params_from_iter(values))?;
      }
    }
    tx.commit()?;

    debug!(collection = %collection, count = records.len(), "cached records");
    Ok(())
  }

  /// All records of a collection, in storage (id) order.
  ///
  /// A collection that has never been written to yields an empty list,
  /// not an error.
  pub fn cached_records<T: CachedRecord>(&self) -> Result<Vec<T>, CacheError> {
    let collection = T::collection();
    let conn = self.store.lock()?;
    let mut stmt = conn.prepare(&format!(
      "SELECT data FROM {} ORDER BY id",
      collection.table()
    ))?;

    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut records = Vec::new();
    for data in rows {
      records.push(serde_json::from_str(&data?)?);
    }
    Ok(records)
  }

  /// Records of a collection whose indexed attribute equals `value`.
  pub fn cached_records_by<T: CachedRecord>(
    &self,
    index: RecordIndex,
    value: &str,
  ) -> Result<Vec<T>, CacheError> {
    let collection = T::collection();
    if !collection.indexes().contains(&index) {
      return Err(CacheError::IndexUnknown {
        collection: collection.name(),
        index: index.name(),
      });
    }

    let conn = self.store.lock()?;
    let mut stmt = conn.prepare(&format!(
      "SELECT data FROM {} WHERE {} = ?1 ORDER BY id",
      collection.table(),
      index.column()
    ))?;

    let rows = stmt.query_map(params![value], |row| row.get::<_, String>(0))?;
    let mut records = Vec::new();
    for data in rows {
      records.push(serde_json::from_str(&data?)?);
    }
    Ok(records)
  }

  /// Number of cached rows in a collection.
  pub fn cached_record_count(&self, collection: Collection) -> Result<u64, CacheError> {
    let conn = self.store.lock()?;
    let count: i64 = conn.query_row(
      &format!("SELECT COUNT(*) FROM {}", collection.table()),
      [],
      |row| row.get(0),
    )?;
    Ok(count as u64)
  }

  // ==========================================================================
  // Pending-action queue
  // ==========================================================================

  /// Append a mutation to the pending queue and return its assigned
  /// sequence id.
  ///
  /// After the row is persisted, the background sync trigger is nudged;
  /// that part is best-effort and its failure never fails the enqueue.
  pub fn add_pending_action(&self, action: NewPendingAction) -> Result<i64, CacheError> {
    let timestamp = Utc::now();
    let id = {
      let mut conn = self.store.lock()?;
      let tx = conn.transaction()?;
      tx.execute(
        "INSERT INTO pending_actions (kind, collection, payload, timestamp, url, method, headers)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
          action.kind.as_str(),
          action.collection.name(),
          action.payload,
          timestamp,
          action.url,
          action.method,
          serde_json::to_string(&action.headers)?,
        ],
      )?;
      let id = tx.last_insert_rowid();
      tx.commit()?;
      id
    };

    debug!(id, kind = %action.kind, collection = %action.collection, "queued pending action");

    if let Err(e) = self.trigger.request_sync() {
      // Absence of the capability is not an error for the enqueue.
      debug!("background sync trigger unavailable: {}", e);
    }

    Ok(id)
  }

  /// Number of queued actions.
  pub fn pending_action_count(&self) -> Result<u64, CacheError> {
    let conn = self.store.lock()?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM pending_actions", [], |row| row.get(0))?;
    Ok(count as u64)
  }

  /// All queued actions in storage order. Keys auto-increment, so this
  /// is insertion order.
  pub fn pending_actions(&self) -> Result<Vec<PendingAction>, CacheError> {
    let conn = self.store.lock()?;
    let mut stmt = conn.prepare(
      "SELECT id, kind, collection, payload, timestamp, url, method, headers
       FROM pending_actions ORDER BY id",
    )?;

    let rows = stmt.query_map([], |row| {
      Ok(RawAction {
        id: row.get(0)?,
        kind: row.get(1)?,
        collection: row.get(2)?,
        payload: row.get(3)?,
        timestamp: row.get(4)?,
        url: row.get(5)?,
        method: row.get(6)?,
        headers: row.get(7)?,
      })
    })?;

    let mut actions = Vec::new();
    for raw in rows {
      actions.push(raw?.into_action()?);
    }
    Ok(actions)
  }

  /// One queued action by id, if still present.
  pub fn pending_action(&self, id: i64) -> Result<Option<PendingAction>, CacheError> {
    let conn = self.store.lock()?;
    let raw = conn
      .query_row(
        "SELECT id, kind, collection, payload, timestamp, url, method, headers
         FROM pending_actions WHERE id = ?1",
        params![id],
        |row| {
          Ok(RawAction {
            id: row.get(0)?,
            kind: row.get(1)?,
            collection: row.get(2)?,
            payload: row.get(3)?,
            timestamp: row.get(4)?,
            url: row.get(5)?,
            method: row.get(6)?,
            headers: row.get(7)?,
          })
        },
      )
      .optional()?;

    raw.map(RawAction::into_action).transpose()
  }

  /// Empty the queue. Used after a confirmed full successful sync.
  pub fn clear_pending_actions(&self) -> Result<(), CacheError> {
    let conn = self.store.lock()?;
    conn.execute("DELETE FROM pending_actions", [])?;
    Ok(())
  }

  /// Remove one queued action by its sequence id. Returns whether a row
  /// was actually removed. Used after a confirmed per-action replay.
  pub fn delete_pending_action(&self, id: i64) -> Result<bool, CacheError> {
    let conn = self.store.lock()?;
    let removed = conn.execute("DELETE FROM pending_actions WHERE id = ?1", params![id])?;
    Ok(removed > 0)
  }
}

/// Row shape read back from the queue before decoding enums/headers.
struct RawAction {
  id: i64,
  kind: String,
  collection: String,
  payload: Value,
  timestamp: DateTime<Utc>,
  url: String,
  method: String,
  headers: String,
}

impl RawAction {
  fn into_action(self) -> Result<PendingAction, CacheError> {
    let kind = ActionKind::from_name(&self.kind).ok_or_else(|| {
      warn!(id = self.id, kind = %self.kind, "unknown action kind in queue");
      CacheError::Corrupt(format!("pending action {} has kind {}", self.id, self.kind))
    })?;
    let collection = Collection::from_name(&self.collection).ok_or_else(|| {
      warn!(id = self.id, collection = %self.collection, "unknown collection in queue");
      CacheError::Corrupt(format!(
        "pending action {} targets unknown collection {}",
        self.id, self.collection
      ))
    })?;

    Ok(PendingAction {
      id: self.id,
      kind,
      collection,
      payload: self.payload,
      timestamp: self.timestamp,
      url: self.url,
      method: self.method,
      headers: serde_json::from_str(&self.headers)?,
    })
  }
}

/// Build the upsert statement for a collection: id, its index columns,
/// then the serialized row.
fn upsert_sql(collection: Collection) -> String {
  let mut columns = vec!["id"];
  columns.extend(collection.indexes().iter().map(|i| i.column()));
  columns.push("data");

  let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

  format!(
    "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
    collection.table(),
    columns.join(", "),
    placeholders.join(", ")
  )
}
