//! Cache gateway over the local store.
//!
//! This module provides the domain-facing cache surface:
//! - Merge-style upserts of fetched records, keyed by remote id
//! - Bulk reads, optionally filtered by a secondary index
//! - The pending-action queue for mutations recorded while offline

mod gateway;
mod traits;

pub use gateway::CacheGateway;
pub use traits::{CachedRecord, Collection, RecordIndex};
