//! Key-value storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for persistent key-value backends holding serialized blobs.
pub trait KeyValueStorage: Send + Sync {
  /// Read the blob stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Write `value` under `key`, replacing any previous blob.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// List all keys starting with `prefix`, in key order.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Storage implementation that doesn't keep anything.
/// Used when caching is disabled - every read misses.
pub struct NoopStorage;

impl KeyValueStorage for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
    Ok(Vec::new())
  }
}

/// SQLite-based key-value storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) the storage at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as the process.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("cache.db"))
  }

  /// Run database migrations for the key-value table.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the key-value table.
const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl KeyValueStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache key {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, written_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write cache key {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove cache key {}: {}", key, e))?;

    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // substr avoids LIKE wildcard escaping for keys containing '_' or '%'
    let mut stmt = conn
      .prepare(
        "SELECT key FROM kv_store
         WHERE substr(key, 1, length(?1)) = ?1
         ORDER BY key",
      )
      .map_err(|e| eyre!("Failed to prepare key listing: {}", e))?;

    let keys = stmt
      .query_map(params![prefix], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list cache keys: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache key: {}", e))?;

    Ok(keys)
  }
}

/// In-process storage for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<std::collections::BTreeMap<String, String>>,
}

#[cfg(test)]
impl KeyValueStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.entries.lock().unwrap().get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self
      .entries
      .lock()
      .unwrap()
      .insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.entries.lock().unwrap().remove(key);
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    Ok(
      self
        .entries
        .lock()
        .unwrap()
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect(),
    )
  }
}
