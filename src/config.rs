use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_FRESH_SECS;

const APP_NAME: &str = "recipebook";
const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub firestore: FirestoreConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreConfig {
  pub project_id: String,
  #[serde(default = "default_database")]
  pub database: String,
  /// Override for the REST root (emulators, proxies)
  pub base_url: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for FirestoreConfig {
  fn default() -> Self {
    Self {
      project_id: String::new(),
      database: default_database(),
      base_url: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_database() -> String {
  "(default)".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// SQLite file (defaults to the data directory)
  pub path: Option<PathBuf>,
  /// How long after a sync collections are served without asking the store
  #[serde(default = "default_fresh_for_secs")]
  pub fresh_for_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      fresh_for_secs: default_fresh_for_secs(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_fresh_for_secs() -> u64 {
  DEFAULT_FRESH_SECS as u64
}

impl FirestoreConfig {
  /// `.../projects/{project}/databases/{database}/documents`
  pub fn documents_url(&self) -> String {
    let base = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    format!(
      "{}/projects/{}/databases/{}/documents",
      base.trim_end_matches('/'),
      self.project_id,
      self.database
    )
  }

  /// Web API key from RECIPEBOOK_API_KEY, sent as the `key` query parameter.
  pub fn api_key() -> Option<String> {
    non_empty_var("RECIPEBOOK_API_KEY")
  }

  /// Firebase ID token from RECIPEBOOK_ID_TOKEN, sent as a bearer token.
  pub fn id_token() -> Option<String> {
    non_empty_var("RECIPEBOOK_ID_TOKEN")
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./recipebook.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/recipebook/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/recipebook/config.yaml\n\
                 with at least:\n\n  firestore:\n    project_id: <your project>"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("recipebook.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }
}

/// Per-user data directory holding the cache database and logs.
pub fn data_dir() -> Result<PathBuf> {
  dirs::data_dir()
    .map(|dir| dir.join(APP_NAME))
    .ok_or_else(|| eyre!("Could not determine data directory"))
}
