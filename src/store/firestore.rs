use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

use crate::config::FirestoreConfig;

use super::value::{decode_fields, encode_fields};
use super::{Collection, Document, DocumentStore, CREATED_FIELD, MODIFIED_FIELD};

const PAGE_SIZE: u32 = 300;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiDocument {
  name: String,
  #[serde(default)]
  fields: Map<String, Value>,
}

impl ApiDocument {
  fn into_document(self) -> Result<Document> {
    Ok(Document {
      id: document_id(&self.name)?,
      fields: decode_fields(&self.fields)
        .map_err(|e| eyre!("Failed to decode document {}: {}", self.name, e))?,
    })
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiListResponse {
  #[serde(default)]
  documents: Vec<ApiDocument>,
  next_page_token: Option<String>,
}

/// One element of a `runQuery` response stream. Elements without a document
/// only carry progress information.
#[derive(Debug, Deserialize)]
struct ApiQueryResult {
  document: Option<ApiDocument>,
}

/// Last path segment of a full document name
/// (`projects/p/databases/d/documents/recipes/<id>`).
fn document_id(name: &str) -> Result<String> {
  name
    .rsplit('/')
    .next()
    .filter(|id| !id.is_empty())
    .map(String::from)
    .ok_or_else(|| eyre!("Malformed document name: {}", name))
}

fn newer_than_query(collection: Collection, field: &str, since: &str) -> Value {
  json!({
    "structuredQuery": {
      "from": [{ "collectionId": collection.id() }],
      "where": {
        "fieldFilter": {
          "field": { "fieldPath": field },
          "op": "GREATER_THAN",
          "value": { "stringValue": since }
        }
      }
    }
  })
}

// ============================================================================
// Client
// ============================================================================

/// Firestore REST client
#[derive(Clone)]
pub struct FirestoreStore {
  http: reqwest::Client,
  /// `.../projects/{project}/databases/{database}/documents`
  documents_url: String,
  api_key: Option<String>,
  id_token: Option<String>,
}

impl FirestoreStore {
  pub fn new(config: &FirestoreConfig) -> Result<Self> {
    if config.project_id.trim().is_empty() {
      return Err(eyre!("firestore.project_id is not configured"));
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      documents_url: config.documents_url(),
      api_key: FirestoreConfig::api_key(),
      id_token: FirestoreConfig::id_token(),
    })
  }

  fn endpoint(&self, suffix: &str) -> Result<Url> {
    let raw = format!("{}{}", self.documents_url, suffix);
    let mut url = Url::parse(&raw).map_err(|e| eyre!("Invalid Firestore URL {}: {}", raw, e))?;
    if let Some(key) = &self.api_key {
      url.query_pairs_mut().append_pair("key", key);
    }
    Ok(url)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let request = self.http.request(method, url);
    match &self.id_token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Failed to {}: {}", action, e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(eyre!("Failed to {}: HTTP {}: {}", action, status, body.trim()));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse response to {}: {}", action, e))
  }

  async fn run_query(&self, collection: Collection, field: &str, since: &str) -> Result<Vec<Document>> {
    let url = self.endpoint(":runQuery")?;
    let body = newer_than_query(collection, field, since);

    let results: Vec<ApiQueryResult> = self
      .send_json(
        self.request(Method::POST, url).json(&body),
        &format!("query {} by {}", collection.id(), field),
      )
      .await?;

    results
      .into_iter()
      .filter_map(|result| result.document)
      .map(ApiDocument::into_document)
      .collect()
  }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
  async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
      let mut url = self.endpoint(&format!("/{}", collection.id()))?;
      {
        let mut query = url.query_pairs_mut();
        query.append_pair("pageSize", &PAGE_SIZE.to_string());
        if let Some(token) = &page_token {
          query.append_pair("pageToken", token);
        }
      }

      let page: ApiListResponse = self
        .send_json(
          self.request(Method::GET, url),
          &format!("list {}", collection.id()),
        )
        .await?;

      for doc in page.documents {
        documents.push(doc.into_document()?);
      }

      match page.next_page_token {
        Some(token) if !token.is_empty() => page_token = Some(token),
        _ => break,
      }
    }

    debug!("Fetched {} {} documents", documents.len(), collection.id());
    Ok(documents)
  }

  async fn fetch_since(
    &self,
    collection: Collection,
    since: DateTime<Utc>,
  ) -> Result<Vec<Document>> {
    let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);

    let (created, modified) = futures::try_join!(
      self.run_query(collection, CREATED_FIELD, &since),
      self.run_query(collection, MODIFIED_FIELD, &since),
    )?;

    // A document created and then edited shows up in both queries
    let mut seen = HashSet::new();
    let documents: Vec<Document> = created
      .into_iter()
      .chain(modified)
      .filter(|doc| seen.insert(doc.id.clone()))
      .collect();

    debug!(
      "Fetched {} {} documents changed since {}",
      documents.len(),
      collection.id(),
      since
    );
    Ok(documents)
  }

  async fn fetch_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
    let url = self.endpoint(&format!("/{}/{}", collection.id(), id))?;
    let action = format!("get {} {}", collection.id(), id);

    let response = self
      .request(Method::GET, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to {}: {}", action, e))?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(eyre!("Failed to {}: HTTP {}: {}", action, status, body.trim()));
    }

    let doc: ApiDocument = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response to {}: {}", action, e))?;

    doc.into_document().map(Some)
  }

  async fn create(&self, collection: Collection, fields: Map<String, Value>) -> Result<String> {
    let url = self.endpoint(&format!("/{}", collection.id()))?;
    let body = json!({ "fields": encode_fields(&fields) });

    let doc: ApiDocument = self
      .send_json(
        self.request(Method::POST, url).json(&body),
        &format!("create {} document", collection.id()),
      )
      .await?;

    document_id(&doc.name)
  }

  async fn update(&self, collection: Collection, id: &str, fields: Map<String, Value>) -> Result<()> {
    let mut url = self.endpoint(&format!("/{}/{}", collection.id(), id))?;
    {
      let mut query = url.query_pairs_mut();
      for field in fields.keys() {
        query.append_pair("updateMask.fieldPaths", field);
      }
      query.append_pair("currentDocument.exists", "true");
    }
    let body = json!({ "fields": encode_fields(&fields) });

    let _: Value = self
      .send_json(
        self.request(Method::PATCH, url).json(&body),
        &format!("update {} {}", collection.id(), id),
      )
      .await?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_document_id() {
    assert_eq!(
      document_id("projects/p/databases/(default)/documents/recipes/abc123").unwrap(),
      "abc123"
    );
    assert!(document_id("projects/p/documents/recipes/").is_err());
  }

  #[test]
  fn test_list_page_decodes_documents() {
    let page: ApiListResponse = serde_json::from_value(json!({
      "documents": [{
        "name": "projects/p/databases/(default)/documents/Category/c1",
        "fields": { "name": { "stringValue": "soups" } },
        "createTime": "2024-01-01T00:00:00Z"
      }],
      "nextPageToken": "next"
    }))
    .unwrap();

    assert_eq!(page.next_page_token.as_deref(), Some("next"));
    let doc = page.documents.into_iter().next().unwrap().into_document().unwrap();
    assert_eq!(doc.id, "c1");
    assert_eq!(doc.fields["name"], "soups");
  }

  #[test]
  fn test_empty_list_page() {
    let page: ApiListResponse = serde_json::from_value(json!({})).unwrap();
    assert!(page.documents.is_empty());
    assert!(page.next_page_token.is_none());
  }

  #[test]
  fn test_query_results_skip_progress_only_elements() {
    let results: Vec<ApiQueryResult> = serde_json::from_value(json!([
      { "readTime": "2024-01-01T00:00:00Z" }
    ]))
    .unwrap();
    assert!(results[0].document.is_none());
  }

  #[test]
  fn test_newer_than_query() {
    let body = newer_than_query(Collection::Recipes, "lastModified", "2024-01-01T00:00:00.000Z");
    let query = &body["structuredQuery"];
    assert_eq!(query["from"][0]["collectionId"], "recipes");
    assert_eq!(query["where"]["fieldFilter"]["op"], "GREATER_THAN");
    assert_eq!(
      query["where"]["fieldFilter"]["value"]["stringValue"],
      "2024-01-01T00:00:00.000Z"
    );
  }

  #[test]
  fn test_new_requires_project() {
    let config = FirestoreConfig::default();
    assert!(FirestoreStore::new(&config).is_err());
  }
}
