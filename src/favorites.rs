//! Locally persisted favorite recipes.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use crate::cache::KeyValueStorage;
use crate::recipes::Recipe;

const FAVORITES_KEY: &str = "favorites";

/// Favorite recipes, stored as one JSON list of recipe snapshots.
#[derive(Clone)]
pub struct Favorites {
  storage: Arc<dyn KeyValueStorage>,
}

impl Favorites {
  pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
    Self { storage }
  }

  /// All favorites, most recently added last. Unreadable data counts as none.
  pub fn list(&self) -> Vec<Recipe> {
    let blob = match self.storage.get(FAVORITES_KEY) {
      Ok(Some(blob)) => blob,
      Ok(None) => return Vec::new(),
      Err(e) => {
        warn!(error = %e, "failed to read favorites");
        return Vec::new();
      }
    };

    serde_json::from_str(&blob).unwrap_or_else(|e| {
      warn!(error = %e, "ignoring unreadable favorites");
      Vec::new()
    })
  }

  pub fn is_favorite(&self, id: &str) -> bool {
    self.list().iter().any(|recipe| recipe.id == id)
  }

  /// Add a recipe. Returns `false` when it was already a favorite.
  pub fn add(&self, recipe: &Recipe) -> Result<bool> {
    let mut favorites = self.list();
    if favorites.iter().any(|r| r.id == recipe.id) {
      return Ok(false);
    }

    favorites.push(recipe.clone());
    self.save(&favorites)?;
    debug!(id = %recipe.id, "added favorite");
    Ok(true)
  }

  /// Remove a recipe by id. Returns `false` when it wasn't a favorite.
  pub fn remove(&self, id: &str) -> Result<bool> {
    let mut favorites = self.list();
    let before = favorites.len();
    favorites.retain(|r| r.id != id);
    if favorites.len() == before {
      return Ok(false);
    }

    self.save(&favorites)?;
    debug!(id, "removed favorite");
    Ok(true)
  }

  fn save(&self, favorites: &[Recipe]) -> Result<()> {
    let blob = serde_json::to_string(favorites)
      .map_err(|e| eyre!("Failed to serialize favorites: {}", e))?;
    self.storage.set(FAVORITES_KEY, &blob)
  }
}
