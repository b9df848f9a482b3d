//! On-device schema for the offline cache.
//!
//! Creation is idempotent (IF NOT EXISTS throughout) and upgrades are
//! additive only: never drop, rename, or recreate a table or index here,
//! or previously cached offline data is destroyed on upgrade.

/// Schema for the record collections and the pending-action queue.
pub const SCHEMA: &str = r#"
-- Farms, keyed by remote id
CREATE TABLE IF NOT EXISTS farms (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_farms_by_user ON farms(user_id);

-- Crop records, keyed by remote id
CREATE TABLE IF NOT EXISTS crop_records (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    farm_id TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crop_records_by_user ON crop_records(user_id);
CREATE INDEX IF NOT EXISTS idx_crop_records_by_farm ON crop_records(farm_id);

-- Expenses, keyed by remote id
CREATE TABLE IF NOT EXISTS expenses (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    crop_record_id TEXT,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_expenses_by_user ON expenses(user_id);
CREATE INDEX IF NOT EXISTS idx_expenses_by_crop ON expenses(crop_record_id);

-- Crop recommendations: global reference data, no secondary index
CREATE TABLE IF NOT EXISTS crop_recommendations (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

-- Pending mutations queued while offline. Keys auto-increment, so key
-- order is insertion order and replay walks increasing id.
CREATE TABLE IF NOT EXISTS pending_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    collection TEXT NOT NULL,
    payload TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    headers TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pending_actions_by_timestamp
    ON pending_actions(timestamp);
"#;
