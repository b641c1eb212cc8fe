//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for records that can be cached and reconciled.
///
/// Implementors provide a stable id used to merge reconciliation results into
/// a cached collection, and a modification time used to decide whether a
/// remote copy is newer than the cached one.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this record (e.g., document id)
  fn cache_key(&self) -> String;

  /// Newest of the creation and last-modification timestamps.
  /// Returns None if the record carries neither.
  fn updated_at(&self) -> Option<DateTime<Utc>>;

  /// Record type name, for log messages (e.g., "recipe", "category")
  fn entity_type() -> &'static str;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// Sync point of the returned data (if it came from cache)
  pub synced_at: Option<DateTime<Utc>>,
  /// Why a refresh was skipped, when stale data is served
  pub refresh_error: Option<String>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from a full remote fetch.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      synced_at: None,
      refresh_error: None,
    }
  }

  /// Create a new cache result from cached data that needed no update.
  pub fn from_cache(data: T, synced_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      synced_at: Some(synced_at),
      refresh_error: None,
    }
  }

  /// Create a new cache result from a baseline merged with newer records.
  pub fn reconciled(data: T, synced_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Reconciled,
      synced_at: Some(synced_at),
      refresh_error: None,
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, synced_at: DateTime<Utc>, error: String) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      synced_at: Some(synced_at),
      refresh_error: Some(error),
    }
  }

  /// Transform the data, keeping the metadata.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      synced_at: self.synced_at,
      refresh_error: self.refresh_error,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Full fetch from the remote store
  Network,
  /// Cached data, nothing newer upstream (or not checked yet)
  Cache,
  /// Cached baseline merged with newer remote records
  Reconciled,
  /// Refresh failed, serving cached data
  Offline,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      CacheSource::Network => "network",
      CacheSource::Cache => "cache",
      CacheSource::Reconciled => "cache+reconciled",
      CacheSource::Offline => "cache (offline)",
    };
    f.write_str(label)
  }
}
