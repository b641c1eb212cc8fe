//! Cache layer that orchestrates read-through and reconciliation with the
//! remote store.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, warn};

use super::resource::ResourceCache;
use super::traits::{CacheResult, Cacheable};

/// Default window after a sync during which cached collections are served
/// without asking the remote store for changes.
pub const DEFAULT_FRESH_SECS: i64 = 60;

/// Cache layer that manages caching logic and remote fetching.
///
/// This layer sits between the application and the document store. A missing
/// entry triggers a full fetch; an existing entry is reconciled by fetching
/// only records newer than its sync point.
#[derive(Clone)]
pub struct CacheLayer {
  cache: ResourceCache,
  /// How long after a sync the cached data is served as-is
  fresh_for: Duration,
}

impl CacheLayer {
  /// Create a new cache layer over the given snapshot store.
  pub fn new(cache: ResourceCache) -> Self {
    Self {
      cache,
      fresh_for: Duration::seconds(DEFAULT_FRESH_SECS),
    }
  }

  /// Set the freshness window.
  pub fn with_fresh_window(mut self, fresh_for: Duration) -> Self {
    self.fresh_for = fresh_for;
    self
  }

  /// The underlying snapshot store.
  pub fn cache(&self) -> &ResourceCache {
    &self.cache
  }

  fn is_fresh(&self, synced_at: DateTime<Utc>) -> bool {
    self.cache.now() - synced_at <= self.fresh_for
  }

  /// Write through to the cache. A failed write costs a refetch later, not
  /// this read.
  fn store<P: serde::Serialize>(&self, key: &str, payload: &P) {
    if let Err(e) = self.cache.put(key, payload) {
      warn!(key, error = %e, "failed to write cache entry");
    }
  }

  /// Plain read-through, for derived data that has no "since" query.
  ///
  /// 1. Cache hit - return it
  /// 2. Miss - fetch, store, return
  pub async fn fetch_list<T, F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<Vec<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    if let Some(cached) = self.cache.entry::<Vec<T>>(key) {
      debug!(key, "cache hit");
      return Ok(CacheResult::from_cache(cached.payload, cached.synced_at));
    }

    debug!(key, "cache miss");
    let data = fetcher().await?;
    self.store(key, &data);
    Ok(CacheResult::from_network(data))
  }

  /// Fetch a collection with incremental reconciliation.
  ///
  /// The fetcher receives `None` for a full fetch, or the cached sync point to
  /// fetch only records created or modified strictly after it.
  ///
  /// 1. No cache - full fetch, store, return
  /// 2. Synced within the freshness window - return cache
  /// 3. Otherwise fetch records newer than the sync point
  /// 4. Nothing newer - return cache untouched
  /// 5. Newer records - merge by id, store, return merged
  /// 6. Incremental fetch failed - return stale cache with the error attached
  pub async fn fetch_incremental<T, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    T: Cacheable,
    F: FnOnce(Option<DateTime<Utc>>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let cached = match self.cache.entry::<Vec<T>>(key) {
      Some(cached) => cached,
      None => {
        debug!(key, "cache miss, full fetch");
        let data = fetcher(None).await?;
        self.store(key, &data);
        return Ok(CacheResult::from_network(data));
      }
    };

    if self.is_fresh(cached.synced_at) {
      debug!(key, synced_at = %cached.synced_at, "cache fresh");
      return Ok(CacheResult::from_cache(cached.payload, cached.synced_at));
    }

    match fetcher(Some(cached.synced_at)).await {
      Ok(updates) if updates.is_empty() => {
        debug!(key, "no {} records since last sync", T::entity_type());
        Ok(CacheResult::from_cache(cached.payload, cached.synced_at))
      }
      Ok(updates) => {
        debug!(
          key,
          count = updates.len(),
          "merging newer {} records",
          T::entity_type()
        );
        let merged = merge_by_id(cached.payload, updates);
        self.store(key, &merged);
        Ok(CacheResult::reconciled(merged, self.cache.now()))
      }
      Err(e) => {
        warn!(key, error = %e, "incremental fetch failed, serving cached data");
        Ok(CacheResult::offline(
          cached.payload,
          cached.synced_at,
          e.to_string(),
        ))
      }
    }
  }

  /// Fetch a single record with caching.
  ///
  /// Returns `Ok(None)` only when nothing is cached and the remote store has
  /// no such record. A cached record is replaced only by a remote copy whose
  /// modification time is newer than the sync point.
  pub async fn fetch_one<T, F, Fut>(&self, key: &str, fetcher: F) -> Result<Option<CacheResult<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
  {
    let cached = match self.cache.entry::<T>(key) {
      Some(cached) => cached,
      None => {
        debug!(key, "cache miss, fetching by id");
        return match fetcher().await? {
          Some(record) => {
            self.store(key, &record);
            Ok(Some(CacheResult::from_network(record)))
          }
          None => Ok(None),
        };
      }
    };

    if self.is_fresh(cached.synced_at) {
      return Ok(Some(CacheResult::from_cache(cached.payload, cached.synced_at)));
    }

    match fetcher().await {
      Ok(Some(remote)) if remote.updated_at().is_some_and(|t| t > cached.synced_at) => {
        debug!(key, "remote {} is newer than cache", T::entity_type());
        self.store(key, &remote);
        Ok(Some(CacheResult::reconciled(remote, self.cache.now())))
      }
      Ok(_) => Ok(Some(CacheResult::from_cache(cached.payload, cached.synced_at))),
      Err(e) => {
        warn!(key, error = %e, "refresh failed, serving cached data");
        Ok(Some(CacheResult::offline(
          cached.payload,
          cached.synced_at,
          e.to_string(),
        )))
      }
    }
  }

  /// Fold locally written records into a cached collection without moving
  /// its sync point. Does nothing when the collection isn't cached.
  pub fn write_through<T: Cacheable>(&self, key: &str, records: Vec<T>) {
    let Some(cached) = self.cache.entry::<Vec<T>>(key) else {
      return;
    };

    let merged = merge_by_id(cached.payload, records);
    if let Err(e) = self.cache.put_synced(key, &merged, cached.synced_at) {
      warn!(key, error = %e, "failed to write cache entry");
    }
  }
}

/// Merge newer records into a cached collection.
///
/// A record whose id is already in `baseline` replaces it in place; the rest
/// are prepended in the order given. When `updates` repeats an id, the later
/// copy wins.
pub fn merge_by_id<T: Cacheable>(baseline: Vec<T>, updates: Vec<T>) -> Vec<T> {
  let mut order: Vec<String> = Vec::new();
  let mut by_key: HashMap<String, T> = HashMap::new();

  for update in updates {
    let key = update.cache_key();
    if by_key.insert(key.clone(), update).is_none() {
      order.push(key);
    }
  }

  let existing: Vec<T> = baseline
    .into_iter()
    .map(|record| by_key.remove(&record.cache_key()).unwrap_or(record))
    .collect();

  let mut merged: Vec<T> = order
    .into_iter()
    .filter_map(|key| by_key.remove(&key))
    .collect();
  merged.extend(existing);
  merged
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::clock::ManualClock;
  use crate::cache::storage::{KeyValueStorage, MemoryStorage};
  use chrono::TimeZone;
  use color_eyre::eyre::eyre;
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Arc;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    id: String,
    body: String,
    updated: Option<DateTime<Utc>>,
  }

  impl Cacheable for Note {
    fn cache_key(&self) -> String {
      self.id.clone()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
      self.updated
    }

    fn entity_type() -> &'static str {
      "note"
    }
  }

  fn note(id: &str, body: &str) -> Note {
    Note {
      id: id.to_string(),
      body: body.to_string(),
      updated: None,
    }
  }

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
  }

  fn setup() -> (CacheLayer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let cache = ResourceCache::new(Arc::new(MemoryStorage::default()), clock.clone());
    (CacheLayer::new(cache), clock)
  }

  /// Storage that can be switched to reject every write.
  #[derive(Default)]
  struct ReadOnlyStorage {
    inner: MemoryStorage,
    read_only: AtomicBool,
  }

  impl KeyValueStorage for ReadOnlyStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
      self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
      if self.read_only.load(Ordering::SeqCst) {
        return Err(eyre!("disk full"));
      }
      self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
      self.inner.remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
      self.inner.keys_with_prefix(prefix)
    }
  }

  fn ids(notes: &[Note]) -> Vec<&str> {
    notes.iter().map(|n| n.id.as_str()).collect()
  }

  #[test]
  fn test_merge_replaces_in_place_and_prepends_new() {
    let baseline = vec![note("a", "1"), note("b", "1"), note("c", "1")];
    let updates = vec![note("d", "1"), note("b", "2"), note("e", "1")];

    let merged = merge_by_id(baseline, updates);
    assert_eq!(ids(&merged), vec!["d", "e", "a", "b", "c"]);
    assert_eq!(merged[3].body, "2");
  }

  #[test]
  fn test_merge_empty_updates_is_identity() {
    let baseline = vec![note("a", "1"), note("b", "1")];
    assert_eq!(merge_by_id(baseline.clone(), Vec::new()), baseline);
  }

  #[test]
  fn test_merge_repeated_update_keeps_later_copy() {
    let merged = merge_by_id(
      vec![note("a", "1")],
      vec![note("a", "2"), note("x", "1"), note("a", "3")],
    );
    assert_eq!(ids(&merged), vec!["x", "a"]);
    assert_eq!(merged[1].body, "3");
  }

  #[tokio::test]
  async fn test_incremental_miss_does_full_fetch() {
    let (layer, _) = setup();

    let result = layer
      .fetch_incremental("notes", |since| async move {
        assert!(since.is_none());
        Ok(vec![note("a", "1")])
      })
      .await
      .unwrap();

    assert_eq!(result.source, crate::cache::CacheSource::Network);
    assert_eq!(layer.cache().last_synced_at("notes"), Some(t0()));
  }

  #[tokio::test]
  async fn test_incremental_full_fetch_error_propagates() {
    let (layer, _) = setup();

    let result = layer
      .fetch_incremental::<Note, _, _>("notes", |_| async { Err(eyre!("offline")) })
      .await;

    assert!(result.is_err());
    assert!(layer.cache().get::<Vec<Note>>("notes").is_none());
  }

  #[tokio::test]
  async fn test_incremental_within_window_skips_remote() {
    let (layer, clock) = setup();
    layer.cache().put("notes", &vec![note("a", "1")]).unwrap();
    clock.advance(Duration::seconds(DEFAULT_FRESH_SECS));

    let calls = AtomicUsize::new(0);
    let result = layer
      .fetch_incremental("notes", |_| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::<Note>::new())
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(ids(&result.data), vec!["a"]);
  }

  #[tokio::test]
  async fn test_incremental_empty_result_leaves_entry_alone() {
    let (layer, clock) = setup();
    layer.cache().put("notes", &vec![note("a", "1")]).unwrap();
    clock.advance(Duration::minutes(5));

    let result = layer
      .fetch_incremental("notes", |since| async move {
        assert_eq!(since, Some(t0()));
        Ok(Vec::<Note>::new())
      })
      .await
      .unwrap();

    assert_eq!(result.source, crate::cache::CacheSource::Cache);
    assert_eq!(ids(&result.data), vec!["a"]);
    let entry = layer.cache().entry::<Vec<Note>>("notes").unwrap();
    assert_eq!(entry.synced_at, t0());
    assert_eq!(entry.stored_at, t0());
  }

  #[tokio::test]
  async fn test_incremental_merges_and_advances_sync_point() {
    let (layer, clock) = setup();
    layer
      .cache()
      .put("notes", &vec![note("a", "1"), note("b", "1")])
      .unwrap();
    clock.advance(Duration::minutes(5));

    let result = layer
      .fetch_incremental("notes", |_| async { Ok(vec![note("c", "1"), note("a", "2")]) })
      .await
      .unwrap();

    let now = t0() + Duration::minutes(5);
    assert_eq!(result.source, crate::cache::CacheSource::Reconciled);
    assert_eq!(ids(&result.data), vec!["c", "a", "b"]);
    assert_eq!(layer.cache().last_synced_at("notes"), Some(now));
    assert_eq!(layer.cache().get::<Vec<Note>>("notes").unwrap(), result.data);
  }

  #[tokio::test]
  async fn test_incremental_failure_serves_stale_baseline() {
    let (layer, clock) = setup();
    layer.cache().put("notes", &vec![note("a", "1")]).unwrap();
    clock.advance(Duration::minutes(5));

    let result = layer
      .fetch_incremental::<Note, _, _>("notes", |_| async { Err(eyre!("backend unavailable")) })
      .await
      .unwrap();

    assert_eq!(result.source, crate::cache::CacheSource::Offline);
    assert_eq!(ids(&result.data), vec!["a"]);
    assert!(result
      .refresh_error
      .as_deref()
      .is_some_and(|e| e.contains("backend unavailable")));
    assert_eq!(layer.cache().last_synced_at("notes"), Some(t0()));
  }

  #[test]
  fn test_write_through_keeps_sync_point() {
    let (layer, clock) = setup();
    layer.write_through("notes", vec![note("a", "1")]);
    assert!(layer.cache().get::<Vec<Note>>("notes").is_none());

    layer.cache().put("notes", &vec![note("a", "1")]).unwrap();
    clock.advance(Duration::seconds(5));
    layer.write_through("notes", vec![note("b", "1"), note("a", "2")]);

    let entry = layer.cache().entry::<Vec<Note>>("notes").unwrap();
    assert_eq!(ids(&entry.payload), vec!["b", "a"]);
    assert_eq!(entry.payload[1].body, "2");
    assert_eq!(entry.synced_at, t0());
  }

  #[tokio::test]
  async fn test_fetch_list_reads_through_once() {
    let (layer, _) = setup();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
      let result = layer
        .fetch_list("derived", || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(vec![note("a", "1")])
        })
        .await
        .unwrap();
      assert_eq!(ids(&result.data), vec!["a"]);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetch_one_miss_and_not_found() {
    let (layer, _) = setup();

    let missing = layer
      .fetch_one::<Note, _, _>("note_x", || async { Ok(None) })
      .await
      .unwrap();
    assert!(missing.is_none());

    let found = layer
      .fetch_one("note_a", || async { Ok(Some(note("a", "1"))) })
      .await
      .unwrap()
      .unwrap();
    assert_eq!(found.source, crate::cache::CacheSource::Network);
    assert_eq!(layer.cache().get::<Note>("note_a"), Some(note("a", "1")));
  }

  #[tokio::test]
  async fn test_fetch_one_replaces_only_when_remote_is_newer() {
    let (layer, clock) = setup();
    layer.cache().put("note_a", &note("a", "cached")).unwrap();
    clock.advance(Duration::minutes(5));

    let older = Note {
      updated: Some(t0() - Duration::minutes(1)),
      ..note("a", "older")
    };
    let result = layer
      .fetch_one("note_a", || async move { Ok(Some(older)) })
      .await
      .unwrap()
      .unwrap();
    assert_eq!(result.data.body, "cached");
    assert_eq!(result.source, crate::cache::CacheSource::Cache);

    let newer = Note {
      updated: Some(t0() + Duration::minutes(1)),
      ..note("a", "newer")
    };
    let result = layer
      .fetch_one("note_a", || async move { Ok(Some(newer)) })
      .await
      .unwrap()
      .unwrap();
    assert_eq!(result.data.body, "newer");
    assert_eq!(result.source, crate::cache::CacheSource::Reconciled);
    assert_eq!(layer.cache().get::<Note>("note_a").unwrap().body, "newer");
  }

  #[tokio::test]
  async fn test_fetch_one_keeps_cache_when_remote_gone_or_failing() {
    let (layer, clock) = setup();
    layer.cache().put("note_a", &note("a", "cached")).unwrap();
    clock.advance(Duration::minutes(5));

    let gone = layer
      .fetch_one::<Note, _, _>("note_a", || async { Ok(None) })
      .await
      .unwrap()
      .unwrap();
    assert_eq!(gone.data.body, "cached");

    let failed = layer
      .fetch_one::<Note, _, _>("note_a", || async { Err(eyre!("timeout")) })
      .await
      .unwrap()
      .unwrap();
    assert_eq!(failed.source, crate::cache::CacheSource::Offline);
    assert_eq!(failed.data.body, "cached");
  }

  #[tokio::test]
  async fn test_failed_cache_writes_do_not_fail_reads() {
    let storage = Arc::new(ReadOnlyStorage::default());
    let clock = Arc::new(ManualClock::new(t0()));
    let layer = CacheLayer::new(ResourceCache::new(storage.clone(), clock.clone()));

    storage.read_only.store(true, Ordering::SeqCst);
    let result = layer
      .fetch_incremental("notes", |_| async { Ok(vec![note("a", "1")]) })
      .await
      .unwrap();
    assert_eq!(result.source, crate::cache::CacheSource::Network);
    assert_eq!(ids(&result.data), vec!["a"]);
    assert!(layer.cache().get::<Vec<Note>>("notes").is_none());

    storage.read_only.store(false, Ordering::SeqCst);
    layer.cache().put("notes", &vec![note("a", "1")]).unwrap();
    storage.read_only.store(true, Ordering::SeqCst);
    clock.advance(Duration::minutes(5));

    let result = layer
      .fetch_incremental("notes", |_| async { Ok(vec![note("b", "1")]) })
      .await
      .unwrap();
    assert_eq!(result.source, crate::cache::CacheSource::Reconciled);
    assert_eq!(ids(&result.data), vec!["b", "a"]);

    layer.write_through("notes", vec![note("c", "1")]);
    assert_eq!(ids(&layer.cache().get::<Vec<Note>>("notes").unwrap()), vec!["a"]);
  }
}
