//! Storage bindings for the domain record types.

use crate::cache::{CachedRecord, Collection, RecordIndex};
use crate::models::{CropRecommendation, CropRecord, Expense, Farm};

// ============================================================================
// CachedRecord implementations
// ============================================================================

impl CachedRecord for Farm {
  fn collection() -> Collection {
    Collection::Farms
  }

  fn cache_id(&self) -> &str {
    &self.id
  }

  fn index_value(&self, index: RecordIndex) -> Option<&str> {
    match index {
      RecordIndex::Owner => Some(&self.user_id),
      _ => None,
    }
  }
}

impl CachedRecord for CropRecord {
  fn collection() -> Collection {
    Collection::CropRecords
  }

  fn cache_id(&self) -> &str {
    &self.id
  }

  fn index_value(&self, index: RecordIndex) -> Option<&str> {
    match index {
      RecordIndex::Owner => Some(&self.user_id),
      RecordIndex::Farm => Some(&self.farm_id),
      _ => None,
    }
  }
}

impl CachedRecord for Expense {
  fn collection() -> Collection {
    Collection::Expenses
  }

  fn cache_id(&self) -> &str {
    &self.id
  }

  fn index_value(&self, index: RecordIndex) -> Option<&str> {
    match index {
      RecordIndex::Owner => Some(&self.user_id),
      RecordIndex::CropRecord => self.crop_record_id.as_deref(),
      _ => None,
    }
  }
}

impl CachedRecord for CropRecommendation {
  fn collection() -> Collection {
    Collection::CropRecommendations
  }

  fn cache_id(&self) -> &str {
    &self.id
  }

  fn index_value(&self, _index: RecordIndex) -> Option<&str> {
    // Reference data is global; no owner scoping, no secondary indexes.
    None
  }
}
