//! Per-key snapshot store with a fixed time-to-live.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::clock::Clock;
use super::entry::CacheEntry;
use super::storage::KeyValueStorage;

/// Storage key prefix shared by every cache entry.
pub const NAMESPACE: &str = "resource_cache_";

/// Entries older than this are treated as absent.
pub const TTL_SECS: i64 = 60 * 60;

/// Live entry metadata, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStatus {
  pub key: String,
  pub stored_at: DateTime<Utc>,
  pub synced_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

/// Snapshot store keyed by logical resource name.
///
/// Reads never touch the network. Expired and corrupt entries are purged on
/// sight and reported as absent.
#[derive(Clone)]
pub struct ResourceCache {
  storage: Arc<dyn KeyValueStorage>,
  clock: Arc<dyn Clock>,
  ttl: Duration,
}

impl ResourceCache {
  pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      clock,
      ttl: Duration::seconds(TTL_SECS),
    }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  fn storage_key(key: &str) -> String {
    format!("{}{}", NAMESPACE, key)
  }

  /// Load the raw envelope for `key`, evicting it if it is expired or corrupt.
  fn envelope(&self, key: &str) -> Option<CacheEntry> {
    let storage_key = Self::storage_key(key);

    let blob = match self.storage.get(&storage_key) {
      Ok(Some(blob)) => blob,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "cache read failed, treating as miss");
        return None;
      }
    };

    let entry = match CacheEntry::decode(&blob) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "discarding corrupt cache entry");
        self.evict(&storage_key);
        return None;
      }
    };

    if self.clock.now() - entry.stored_at > self.ttl {
      debug!(key, stored_at = %entry.stored_at, "cache entry expired");
      self.evict(&storage_key);
      return None;
    }

    Some(entry)
  }

  fn evict(&self, storage_key: &str) {
    if let Err(e) = self.storage.remove(storage_key) {
      warn!(key = storage_key, error = %e, "failed to evict cache entry");
    }
  }

  /// Full entry for `key`, typed.
  pub fn entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
    let entry = self.envelope(key)?;

    match entry.into_typed() {
      Ok(entry) => Some(entry),
      Err(e) => {
        warn!(key, error = %e, "discarding corrupt cache entry");
        self.evict(&Self::storage_key(key));
        None
      }
    }
  }

  /// Cached payload for `key`, if present and unexpired.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.entry(key).map(|entry| entry.payload)
  }

  /// Overwrite `key` with a freshly stamped entry.
  pub fn put<T: Serialize>(&self, key: &str, payload: &T) -> Result<()> {
    self.put_synced(key, payload, self.clock.now())
  }

  /// Overwrite `key` but keep an earlier sync point. Used for local writes,
  /// so the next reconciliation still asks for everything after `synced_at`.
  pub fn put_synced<T: Serialize>(
    &self,
    key: &str,
    payload: &T,
    synced_at: DateTime<Utc>,
  ) -> Result<()> {
    let mut entry = CacheEntry::stamp(payload, self.clock.now())?;
    entry.synced_at = synced_at;
    self.storage.set(&Self::storage_key(key), &entry.encode()?)?;
    debug!(key, "cache entry written");
    Ok(())
  }

  /// When `key` was last reconciled against the remote source.
  pub fn last_synced_at(&self, key: &str) -> Option<DateTime<Utc>> {
    self.envelope(key).map(|entry| entry.synced_at)
  }

  /// Remove `key` unconditionally.
  pub fn invalidate(&self, key: &str) -> Result<()> {
    self.storage.remove(&Self::storage_key(key))
  }

  /// Remove every entry whose key starts with `prefix`. An empty prefix clears
  /// the whole cache namespace. Returns the number of entries removed.
  pub fn invalidate_all(&self, prefix: &str) -> Result<usize> {
    let keys = self.storage.keys_with_prefix(&Self::storage_key(prefix))?;
    for key in &keys {
      self.storage.remove(key)?;
    }
    Ok(keys.len())
  }

  /// Metadata for every live entry.
  pub fn status(&self) -> Result<Vec<EntryStatus>> {
    let keys = self.storage.keys_with_prefix(NAMESPACE)?;

    Ok(
      keys
        .iter()
        .filter_map(|storage_key| storage_key.strip_prefix(NAMESPACE))
        .filter_map(|key| {
          let entry: CacheEntry<Value> = self.envelope(key)?;
          Some(EntryStatus {
            key: key.to_string(),
            stored_at: entry.stored_at,
            synced_at: entry.synced_at,
            expires_at: entry.stored_at + self.ttl,
          })
        })
        .collect(),
    )
  }
}
