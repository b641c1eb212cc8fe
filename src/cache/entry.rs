//! Serialized form of a cache entry.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A cache entry as written to storage.
///
/// The payload is kept as a JSON value so the envelope can be inspected
/// (timestamps, expiry) without knowing the payload type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T = Value> {
  /// When this entry was written
  pub stored_at: DateTime<Utc>,
  /// Lower bound for the next "what's new" query
  pub synced_at: DateTime<Utc>,
  /// Hex SHA-256 of the canonical payload JSON
  pub checksum: String,
  pub payload: T,
}

impl CacheEntry<Value> {
  /// Build a freshly stamped entry.
  pub fn stamp<T: Serialize>(payload: &T, now: DateTime<Utc>) -> Result<Self> {
    let payload =
      serde_json::to_value(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;
    let checksum = checksum(&payload)?;

    Ok(Self {
      stored_at: now,
      synced_at: now,
      checksum,
      payload,
    })
  }

  /// Parse a stored blob and verify its checksum.
  pub fn decode(blob: &str) -> Result<Self> {
    let entry: Self =
      serde_json::from_str(blob).map_err(|e| eyre!("Unparseable cache blob: {}", e))?;

    let actual = checksum(&entry.payload)?;
    if actual != entry.checksum {
      return Err(eyre!(
        "Checksum mismatch (stored {}, computed {})",
        entry.checksum,
        actual
      ));
    }

    Ok(entry)
  }

  pub fn encode(&self) -> Result<String> {
    serde_json::to_string(self).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))
  }

  /// Convert the payload into a concrete type.
  pub fn into_typed<T: DeserializeOwned>(self) -> Result<CacheEntry<T>> {
    let payload = serde_json::from_value(self.payload)
      .map_err(|e| eyre!("Cached payload has unexpected shape: {}", e))?;

    Ok(CacheEntry {
      stored_at: self.stored_at,
      synced_at: self.synced_at,
      checksum: self.checksum,
      payload,
    })
  }
}

fn checksum(payload: &Value) -> Result<String> {
  // Hashed over the value form so a re-parsed blob reproduces the same bytes.
  let canonical =
    serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;
  let mut hasher = Sha256::new();
  hasher.update(&canonical);
  Ok(hex::encode(hasher.finalize()))
}
