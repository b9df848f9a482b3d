//! Domain record types mirrored from the remote farm-records schema.
//!
//! These are the rows the cache keeps locally so the app keeps working
//! without connectivity. Field names match the remote tables exactly,
//! since cached rows must round-trip through the same JSON shape the
//! remote serves.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Collection;

/// A farm owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Farm {
  pub id: String,
  pub user_id: String,
  pub name: String,
  pub location: String,
  pub total_area_acres: f64,
  pub soil_type: Option<String>,
  pub water_source: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a crop record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropStatus {
  Planned,
  Growing,
  Harvested,
  Failed,
}

/// A single planting on a farm, from planning through harvest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecord {
  pub id: String,
  pub farm_id: String,
  pub user_id: String,
  pub crop_name: String,
  pub crop_type: String,
  pub area_acres: f64,
  pub planting_date: NaiveDate,
  pub expected_harvest_date: Option<NaiveDate>,
  pub actual_harvest_date: Option<NaiveDate>,
  pub expected_yield_kg: Option<f64>,
  pub actual_yield_kg: Option<f64>,
  pub status: CropStatus,
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// An expense booked against a farm, optionally tied to one crop record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
  pub id: String,
  pub farm_id: String,
  pub crop_record_id: Option<String>,
  pub user_id: String,
  pub expense_type: String,
  pub amount: f64,
  pub description: Option<String>,
  pub expense_date: NaiveDate,
  pub created_at: DateTime<Utc>,
}

/// Advisory reference data about a crop. Global, not owner-scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecommendation {
  pub id: String,
  pub crop_name: String,
  pub best_season: String,
  #[serde(default)]
  pub suitable_soils: Vec<String>,
  #[serde(default)]
  pub companion_crops: Vec<String>,
  #[serde(default)]
  pub rotation_crops: Vec<String>,
  pub planting_tips: Option<String>,
  pub care_instructions: Option<String>,
  pub avg_yield_per_acre: Option<f64>,
  pub market_price_range: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// The kind of mutation a queued action represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
  Create,
  Update,
  Delete,
}

impl ActionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Create => "CREATE",
      Self::Update => "UPDATE",
      Self::Delete => "DELETE",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "CREATE" => Some(Self::Create),
      "UPDATE" => Some(Self::Update),
      "DELETE" => Some(Self::Delete),
      _ => None,
    }
  }
}

impl std::fmt::Display for ActionKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A mutation attempted while offline, queued for replay.
///
/// The action records the full request envelope (target URL, method,
/// headers, payload) so replay needs no knowledge of the remote schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
  /// Auto-assigned sequence number; replay order is increasing id.
  pub id: i64,
  pub kind: ActionKind,
  /// The record collection the mutation targets.
  pub collection: Collection,
  /// Opaque serialized mutation payload.
  pub payload: Value,
  pub timestamp: DateTime<Utc>,
  pub url: String,
  pub method: String,
  pub headers: BTreeMap<String, String>,
}

/// A pending action before the queue assigns its id and timestamp.
#[derive(Debug, Clone)]
pub struct NewPendingAction {
  pub kind: ActionKind,
  pub collection: Collection,
  pub payload: Value,
  pub url: String,
  pub method: String,
  pub headers: BTreeMap<String, String>,
}
