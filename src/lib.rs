//! Offline cache and pending-action sync core for farm records.
//!
//! The crate mirrors remote farm/crop/expense tables into a local SQLite
//! store, queues mutations made while disconnected, and replays them when
//! connectivity returns. Reads go through [`OfflineQuery`], which serves
//! from the remote while reachable and from the cache while not.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod models;
pub mod query;
pub mod store;
pub mod sync;

pub use cache::{CacheGateway, CachedRecord, Collection, RecordIndex};
pub use connectivity::ConnectivityMonitor;
pub use error::{CacheError, QueryError, RemoteFetchError};
pub use query::OfflineQuery;
pub use store::Store;
pub use sync::{HttpTransport, SyncEngine, SyncReport};
