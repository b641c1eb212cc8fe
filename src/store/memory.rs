//! In-memory document store that counts remote calls.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{Collection, Document, DocumentStore, CREATED_FIELD, MODIFIED_FIELD};
use crate::recipes::parse_timestamp;

#[derive(Default)]
pub struct MemoryStore {
  docs: Mutex<BTreeMap<(&'static str, String), Map<String, Value>>>,
  next_id: AtomicUsize,
  pub full_fetches: AtomicUsize,
  pub since_fetches: AtomicUsize,
  pub id_fetches: AtomicUsize,
  pub fail_reads: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store a record under `id`, bypassing the call counters.
  pub fn insert<T: Serialize>(&self, collection: Collection, id: &str, record: &T) {
    let mut fields = match serde_json::to_value(record) {
      Ok(Value::Object(fields)) => fields,
      _ => panic!("record must serialize to an object"),
    };
    fields.remove("id");
    self
      .docs
      .lock()
      .unwrap()
      .insert((collection.id(), id.to_string()), fields);
  }

  pub fn remove(&self, collection: Collection, id: &str) {
    self
      .docs
      .lock()
      .unwrap()
      .remove(&(collection.id(), id.to_string()));
  }

  pub fn fields(&self, collection: Collection, id: &str) -> Option<Map<String, Value>> {
    self
      .docs
      .lock()
      .unwrap()
      .get(&(collection.id(), id.to_string()))
      .cloned()
  }

  pub fn remote_calls(&self) -> usize {
    self.full_fetches.load(Ordering::SeqCst)
      + self.since_fetches.load(Ordering::SeqCst)
      + self.id_fetches.load(Ordering::SeqCst)
  }

  pub fn set_failing(&self, failing: bool) {
    self.fail_reads.store(failing, Ordering::SeqCst);
  }

  fn check_available(&self) -> Result<()> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(eyre!("connection refused"));
    }
    Ok(())
  }

  fn documents(&self, collection: Collection) -> Vec<Document> {
    self
      .docs
      .lock()
      .unwrap()
      .iter()
      .filter(|((name, _), _)| *name == collection.id())
      .map(|((_, id), fields)| Document {
        id: id.clone(),
        fields: fields.clone(),
      })
      .collect()
  }
}

fn changed_after(fields: &Map<String, Value>, field: &str, since: DateTime<Utc>) -> bool {
  fields
    .get(field)
    .and_then(Value::as_str)
    .and_then(parse_timestamp)
    .is_some_and(|t| t > since)
}

#[async_trait]
impl DocumentStore for MemoryStore {
  async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>> {
    self.full_fetches.fetch_add(1, Ordering::SeqCst);
    self.check_available()?;
    Ok(self.documents(collection))
  }

  async fn fetch_since(
    &self,
    collection: Collection,
    since: DateTime<Utc>,
  ) -> Result<Vec<Document>> {
    self.since_fetches.fetch_add(1, Ordering::SeqCst);
    self.check_available()?;
    Ok(
      self
        .documents(collection)
        .into_iter()
        .filter(|doc| {
          changed_after(&doc.fields, CREATED_FIELD, since)
            || changed_after(&doc.fields, MODIFIED_FIELD, since)
        })
        .collect(),
    )
  }

  async fn fetch_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
    self.id_fetches.fetch_add(1, Ordering::SeqCst);
    self.check_available()?;
    Ok(self.fields(collection, id).map(|fields| Document {
      id: id.to_string(),
      fields,
    }))
  }

  async fn create(&self, collection: Collection, fields: Map<String, Value>) -> Result<String> {
    let id = format!("doc{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    self
      .docs
      .lock()
      .unwrap()
      .insert((collection.id(), id.clone()), fields);
    Ok(id)
  }

  async fn update(&self, collection: Collection, id: &str, fields: Map<String, Value>) -> Result<()> {
    let mut docs = self.docs.lock().unwrap();
    let existing = docs
      .get_mut(&(collection.id(), id.to_string()))
      .ok_or_else(|| eyre!("No {} document {}", collection.id(), id))?;
    existing.extend(fields);
    Ok(())
  }
}
