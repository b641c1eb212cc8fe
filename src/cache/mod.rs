//! Local read-through cache with timestamp-bounded reconciliation.
//!
//! This module provides a record-agnostic caching mechanism that:
//! - Stores per-key snapshots (a record or an ordered collection) in a
//!   key-value backend, stamped with when they were stored and last synced
//! - Expires snapshots after a fixed TTL and discards corrupt ones
//! - Reconciles cached collections by fetching only records newer than the
//!   last sync point and merging them by id
//! - Serves stale data when a reconciliation fetch fails

mod clock;
mod entry;
mod layer;
mod resource;
mod storage;
mod traits;

#[cfg(test)]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use layer::{merge_by_id, CacheLayer, DEFAULT_FRESH_SECS};
pub use resource::{EntryStatus, ResourceCache};
#[cfg(test)]
pub use storage::MemoryStorage;
pub use storage::{KeyValueStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Cacheable};
