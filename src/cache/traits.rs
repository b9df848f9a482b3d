//! Core traits and types for the offline cache.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// The record collections the local store mirrors.
///
/// Collection names are stable on-device state: add new variants, never
/// rename or remove existing ones, or previously cached offline data is
/// orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Collection {
  #[serde(rename = "farms")]
  Farms,
  #[serde(rename = "crop-records")]
  CropRecords,
  #[serde(rename = "expenses")]
  Expenses,
  #[serde(rename = "crop-recommendations")]
  CropRecommendations,
}

impl Collection {
  /// Wire name, as the remote and the pending-action queue spell it.
  pub fn name(&self) -> &'static str {
    match self {
      Self::Farms => "farms",
      Self::CropRecords => "crop-records",
      Self::Expenses => "expenses",
      Self::CropRecommendations => "crop-recommendations",
    }
  }

  /// SQL table backing this collection. The remote spells its table
  /// names the same way.
  pub fn table(&self) -> &'static str {
    match self {
      Self::Farms => "farms",
      Self::CropRecords => "crop_records",
      Self::Expenses => "expenses",
      Self::CropRecommendations => "crop_recommendations",
    }
  }

  /// Secondary indexes this collection carries.
  pub fn indexes(&self) -> &'static [RecordIndex] {
    match self {
      Self::Farms => &[RecordIndex::Owner],
      Self::CropRecords => &[RecordIndex::Owner, RecordIndex::Farm],
      Self::Expenses => &[RecordIndex::Owner, RecordIndex::CropRecord],
      Self::CropRecommendations => &[],
    }
  }

  /// Parse a wire name back into a collection.
  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "farms" => Some(Self::Farms),
      "crop-records" => Some(Self::CropRecords),
      "expenses" => Some(Self::Expenses),
      "crop-recommendations" => Some(Self::CropRecommendations),
      _ => None,
    }
  }
}

impl std::fmt::Display for Collection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// Secondary lookup attributes a collection may be indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordIndex {
  /// Owning user (farms, crop records, expenses)
  Owner,
  /// Parent farm (crop records)
  Farm,
  /// Parent crop record (expenses)
  CropRecord,
}

impl RecordIndex {
  /// SQL column the index value is extracted into.
  pub(crate) fn column(&self) -> &'static str {
    match self {
      Self::Owner => "user_id",
      Self::Farm => "farm_id",
      Self::CropRecord => "crop_record_id",
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Owner => "by-user",
      Self::Farm => "by-farm",
      Self::CropRecord => "by-crop",
    }
  }
}

/// Trait for records the cache gateway can mirror locally.
///
/// Implementors bind a record type to its collection, provide the identity
/// used for upserts, and expose the values of the collection's secondary
/// indexes.
pub trait CachedRecord: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Collection this record type lives in.
  fn collection() -> Collection;

  /// Remote identity of this row. Re-caching the same id overwrites in
  /// place, never duplicates.
  fn cache_id(&self) -> &str;

  /// Value of the given secondary index, or None when the attribute is
  /// unset on this row. Only called for indexes the collection declares.
  fn index_value(&self, index: RecordIndex) -> Option<&str>;
}
