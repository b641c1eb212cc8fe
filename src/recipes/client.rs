//! Recipe book client that reads through the local cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::cache::{CacheLayer, CacheResult, CacheSource, EntryStatus};
use crate::filter::{apply_filters, FilterCriteria};
use crate::normalize::{canonical_effort, find_similar, normalize};
use crate::store::{decode_all, Collection, DocumentStore};

use super::keys::ResourceKey;
use super::types::{aggregate_cookbooks, format_timestamp, Category, Cookbook, Recipe};
use super::validate::{check_recipe, check_value, DuplicateWarning, EntityKind};

/// Result of a create or update request.
#[derive(Debug)]
pub enum SaveOutcome {
  /// Written to the store, as saved
  Saved(Recipe),
  /// Not written; the warnings need a forced save
  Blocked(Vec<DuplicateWarning>),
}

/// Recipe book with transparent caching.
///
/// Collections are read through the cache and reconciled incrementally;
/// writes go straight to the store and are folded into the cached
/// collections.
#[derive(Clone)]
pub struct RecipeBook {
  store: Arc<dyn DocumentStore>,
  cache: CacheLayer,
}

impl RecipeBook {
  pub fn new(store: Arc<dyn DocumentStore>, cache: CacheLayer) -> Self {
    Self { store, cache }
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  /// Every recipe, newest first.
  pub async fn recipes(&self) -> Result<CacheResult<Vec<Recipe>>> {
    let key = ResourceKey::AllRecipes.cache_key();
    let store = self.store.clone();

    let result = self
      .cache
      .fetch_incremental(&key, |since| async move {
        let documents = match since {
          Some(since) => store.fetch_since(Collection::Recipes, since).await?,
          None => store.fetch_all(Collection::Recipes).await?,
        };
        let mut recipes: Vec<Recipe> = decode_all(documents)?;
        // Newer records are prepended on merge, so they arrive sorted too
        recipes.sort_by(|a, b| b.created().cmp(&a.created()));
        Ok(recipes)
      })
      .await?;

    if matches!(result.source, CacheSource::Network | CacheSource::Reconciled) {
      self.invalidate(&ResourceKey::AllCookbooks);
    }

    Ok(result)
  }

  /// Recipes matching every active criterion, in collection order.
  pub async fn search(&self, criteria: &FilterCriteria) -> Result<CacheResult<Vec<Recipe>>> {
    let result = self.recipes().await?;
    Ok(result.map(|all| apply_filters(&all, criteria).into_iter().cloned().collect()))
  }

  /// Cached recipes matching `criteria`, without contacting the store.
  /// `None` when nothing is cached.
  pub fn cached_search(&self, criteria: &FilterCriteria) -> Option<Vec<Recipe>> {
    let all: Vec<Recipe> = self.cache.cache().get(&ResourceKey::AllRecipes.cache_key())?;
    Some(apply_filters(&all, criteria).into_iter().cloned().collect())
  }

  /// When a cached resource was last reconciled with the store.
  pub fn last_synced(&self, key: &ResourceKey) -> Option<DateTime<Utc>> {
    self.cache.cache().last_synced_at(&key.cache_key())
  }

  /// A single recipe by id.
  pub async fn recipe(&self, id: &str) -> Result<CacheResult<Recipe>> {
    let key = ResourceKey::Recipe { id: id.to_string() }.cache_key();

    let result = self
      .cache
      .fetch_one(&key, || async {
        match self.store.fetch_by_id(Collection::Recipes, id).await? {
          Some(document) => document.decode().map(Some),
          None => Ok(None),
        }
      })
      .await?;

    result.ok_or_else(|| eyre!("Recipe {} not found", id))
  }

  /// Canonical categories, sorted by name.
  pub async fn categories(&self) -> Result<CacheResult<Vec<Category>>> {
    let key = ResourceKey::AllCategories.cache_key();
    let store = self.store.clone();

    self
      .cache
      .fetch_incremental(&key, |since| async move {
        let documents = match since {
          Some(since) => store.fetch_since(Collection::Categories, since).await?,
          None => store.fetch_all(Collection::Categories).await?,
        };
        let mut categories: Vec<Category> = decode_all(documents)?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
      })
      .await
  }

  /// Cookbooks derived from the recipe collection.
  pub async fn cookbooks(&self) -> Result<CacheResult<Vec<Cookbook>>> {
    // Reconcile recipes first; a change there drops the cached aggregate
    let recipes = self.recipes().await?;
    let key = ResourceKey::AllCookbooks.cache_key();

    self
      .cache
      .fetch_list(&key, || async move { Ok(aggregate_cookbooks(&recipes.data)) })
      .await
  }

  /// Check one value against the existing values of its kind.
  pub async fn check_similar(&self, kind: EntityKind, value: &str) -> Result<Option<DuplicateWarning>> {
    let recipes = self.recipes().await?.data;
    let categories = match kind {
      EntityKind::Category => self.categories().await?.data,
      _ => Vec::new(),
    };

    let existing = kind.existing_values(&recipes, &categories, None);
    Ok(check_value(kind, value, &existing))
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  /// Create a recipe. Duplicate warnings block the write unless `force`.
  pub async fn create_recipe(&self, draft: Recipe, force: bool) -> Result<SaveOutcome> {
    let mut recipe = tidy(draft)?;
    recipe.id.clear();

    if let Some(warnings) = self.review(&recipe, force).await? {
      return Ok(SaveOutcome::Blocked(warnings));
    }

    let now = format_timestamp(self.cache.cache().now());
    recipe.created_at = Some(now.clone());
    recipe.last_modified = Some(now);

    let id = self
      .store
      .create(Collection::Recipes, record_fields(&recipe)?)
      .await?;
    recipe.id = id;
    info!(id = %recipe.id, title = %recipe.title, "created recipe");

    self.after_write(&recipe).await?;
    Ok(SaveOutcome::Saved(recipe))
  }

  /// Save an edited recipe. Duplicate warnings block the write unless `force`.
  pub async fn update_recipe(&self, edited: Recipe, force: bool) -> Result<SaveOutcome> {
    if edited.id.is_empty() {
      return Err(eyre!("Cannot update a recipe without an id"));
    }
    let mut recipe = tidy(edited)?;

    if let Some(warnings) = self.review(&recipe, force).await? {
      return Ok(SaveOutcome::Blocked(warnings));
    }

    recipe.last_modified = Some(format_timestamp(self.cache.cache().now()));

    let mut fields = record_fields(&recipe)?;
    fields.remove("createdAt");
    self
      .store
      .update(Collection::Recipes, &recipe.id, fields)
      .await?;
    info!(id = %recipe.id, title = %recipe.title, "updated recipe");

    self.invalidate(&ResourceKey::Recipe {
      id: recipe.id.clone(),
    });
    self.after_write(&recipe).await?;
    Ok(SaveOutcome::Saved(recipe))
  }

  /// Run duplicate checks. Returns the warnings when they block the save.
  async fn review(&self, recipe: &Recipe, force: bool) -> Result<Option<Vec<DuplicateWarning>>> {
    let recipes = self.recipes().await?.data;
    let categories = self.categories().await?.data;

    let warnings = check_recipe(recipe, &recipes, &categories);
    if !warnings.is_empty() {
      if !force {
        return Ok(Some(warnings));
      }
      for warning in &warnings {
        warn!(title = %recipe.title, "saving despite warning: {}", warning);
      }
    }

    Ok(None)
  }

  /// Create the category document unless a similar one exists.
  async fn ensure_category(&self, name: &str) -> Result<()> {
    let categories = self.categories().await?.data;
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    if find_similar(name, &names).is_some() {
      return Ok(());
    }

    let category = Category {
      id: String::new(),
      name: name.to_string(),
      created_at: Some(format_timestamp(self.cache.cache().now())),
    };

    let mut fields = Map::new();
    fields.insert("name".to_string(), Value::String(category.name.clone()));
    fields.insert("createdAt".to_string(), json_opt(&category.created_at));

    let id = self.store.create(Collection::Categories, fields).await?;
    info!(id = %id, name, "created category");

    self
      .cache
      .write_through(&ResourceKey::AllCategories.cache_key(), vec![Category { id, ..category }]);
    Ok(())
  }

  /// Fold a saved recipe into the cache, then create its category if it is
  /// new. Runs only after the recipe write succeeded.
  async fn after_write(&self, recipe: &Recipe) -> Result<()> {
    self
      .cache
      .write_through(&ResourceKey::AllRecipes.cache_key(), vec![recipe.clone()]);
    self.invalidate(&ResourceKey::AllCookbooks);

    if let Some(name) = recipe.category.as_deref() {
      self.ensure_category(name).await.map_err(|e| {
        eyre!(
          "Saved recipe {} but failed to create category {}: {}",
          recipe.id,
          name,
          e
        )
      })?;
    }
    Ok(())
  }

  // ==========================================================================
  // Cache maintenance
  // ==========================================================================

  fn invalidate(&self, key: &ResourceKey) {
    match self.cache.cache().invalidate(&key.cache_key()) {
      Ok(()) => info!("invalidated cached {}", key.description()),
      Err(e) => warn!(error = %e, "failed to invalidate cached {}", key.description()),
    }
  }

  /// Drop the cached recipes (and what derives from them) so the next read
  /// does a full fetch.
  pub fn forget_recipes(&self) {
    self.invalidate(&ResourceKey::AllRecipes);
    self.invalidate(&ResourceKey::AllCookbooks);
  }

  /// Remove cached entries whose key starts with `prefix`.
  pub fn clear_cache(&self, prefix: &str) -> Result<usize> {
    let removed = self.cache.cache().invalidate_all(prefix)?;
    info!(prefix, removed, "cleared cache entries");
    Ok(removed)
  }

  pub fn cache_status(&self) -> Result<Vec<EntryStatus>> {
    self.cache.cache().status()
  }
}

/// Trim free text, canonicalize effort and normalize the category.
fn tidy(mut recipe: Recipe) -> Result<Recipe> {
  recipe.title = recipe.title.trim().to_string();
  if recipe.title.is_empty() {
    return Err(eyre!("A recipe needs a title"));
  }

  recipe.cookbook = trimmed(recipe.cookbook);
  recipe.author = trimmed(recipe.author);
  recipe.category = trimmed(recipe.category).map(|c| normalize(&c));
  recipe.effort = trimmed(recipe.effort).map(|e| canonical_effort(&e));

  for list in [
    &mut recipe.ingredients,
    &mut recipe.searchable_ingredients,
    &mut recipe.tags,
  ] {
    *list = list
      .iter()
      .map(|item| item.trim().to_string())
      .filter(|item| !item.is_empty())
      .collect();
  }

  Ok(recipe)
}

fn trimmed(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

fn json_opt(value: &Option<String>) -> Value {
  value.clone().map(Value::String).unwrap_or(Value::Null)
}

/// Document fields for a recipe; the id lives in the document name.
fn record_fields(recipe: &Recipe) -> Result<Map<String, Value>> {
  let value =
    serde_json::to_value(recipe).map_err(|e| eyre!("Failed to serialize recipe: {}", e))?;

  match value {
    Value::Object(mut fields) => {
      fields.remove("id");
      Ok(fields)
    }
    other => Err(eyre!("Recipe serialized to a non-object: {}", other)),
  }
}
