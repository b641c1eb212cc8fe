//! Remote document store boundary.
//!
//! The cache layer only needs full collection reads, "created or modified
//! since" reads and single-document reads; writes are plain create/update.

mod firestore;
#[cfg(test)]
pub mod memory;
mod value;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub use firestore::FirestoreStore;

/// Document collections used by the recipe book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  Recipes,
  Categories,
}

impl Collection {
  /// Collection id in the remote store.
  pub fn id(&self) -> &'static str {
    match self {
      Collection::Recipes => "recipes",
      Collection::Categories => "Category",
    }
  }
}

/// Fields that carry a record's creation and modification time.
pub const CREATED_FIELD: &str = "createdAt";
pub const MODIFIED_FIELD: &str = "lastModified";

/// A document with plain JSON fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  pub id: String,
  pub fields: Map<String, Value>,
}

impl Document {
  /// Decode into a typed record, with the document id as its `id` field.
  pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
    let mut fields = self.fields;
    fields.insert("id".to_string(), Value::String(self.id.clone()));

    serde_json::from_value(Value::Object(fields))
      .map_err(|e| eyre!("Failed to decode document {}: {}", self.id, e))
  }
}

/// Decode a batch of documents.
pub fn decode_all<T: DeserializeOwned>(documents: Vec<Document>) -> Result<Vec<T>> {
  documents.into_iter().map(Document::decode).collect()
}

/// Remote source of truth for recipes and categories.
#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// Every document in the collection.
  async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>>;

  /// Documents whose creation or modification time is strictly after `since`.
  async fn fetch_since(
    &self,
    collection: Collection,
    since: DateTime<Utc>,
  ) -> Result<Vec<Document>>;

  /// A single document, or `None` if it doesn't exist.
  async fn fetch_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>>;

  /// Create a document and return its generated id.
  async fn create(&self, collection: Collection, fields: Map<String, Value>) -> Result<String>;

  /// Overwrite the given fields of an existing document.
  async fn update(&self, collection: Collection, id: &str, fields: Map<String, Value>)
    -> Result<()>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::recipes::Recipe;
  use serde_json::json;

  #[test]
  fn test_decode_injects_id() {
    let fields = json!({ "title": "Shakshuka", "id": "stale" });
    let doc = Document {
      id: "abc".to_string(),
      fields: fields.as_object().unwrap().clone(),
    };

    let recipe: Recipe = doc.decode().unwrap();
    assert_eq!(recipe.id, "abc");
    assert_eq!(recipe.title, "Shakshuka");
  }

  #[test]
  fn test_decode_reports_document_id() {
    let doc = Document {
      id: "bad".to_string(),
      fields: json!({ "title": 42 }).as_object().unwrap().clone(),
    };

    let err = doc.decode::<Recipe>().unwrap_err();
    assert!(err.to_string().contains("bad"));
  }
}
