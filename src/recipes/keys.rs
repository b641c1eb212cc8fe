//! Caching implementations for recipe book types.

use chrono::{DateTime, Utc};

use crate::cache::Cacheable;

use super::types::{Category, Cookbook, Recipe};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Recipe {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.created().max(self.modified())
  }

  fn entity_type() -> &'static str {
    "recipe"
  }
}

impl Cacheable for Category {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.created_at.as_deref().and_then(super::types::parse_timestamp)
  }

  fn entity_type() -> &'static str {
    "category"
  }
}

impl Cacheable for Cookbook {
  fn cache_key(&self) -> String {
    self.name.clone()
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    // Derived from recipes, never reconciled on its own
    None
  }

  fn entity_type() -> &'static str {
    "cookbook"
  }
}

// ============================================================================
// Resource keys
// ============================================================================

/// Logical resources held in the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceKey {
  /// Every recipe, newest first
  AllRecipes,
  /// Cookbook aggregate derived from the recipes
  AllCookbooks,
  /// Every canonical category
  AllCategories,
  /// A single recipe by document id
  Recipe { id: String },
}

impl ResourceKey {
  /// Key within the cache namespace.
  pub fn cache_key(&self) -> String {
    match self {
      Self::AllRecipes => "all_recipes".to_string(),
      Self::AllCookbooks => "all_cookbooks".to_string(),
      Self::AllCategories => "all_categories".to_string(),
      Self::Recipe { id } => format!("recipe_{}", id),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::AllRecipes => "all recipes".to_string(),
      Self::AllCookbooks => "all cookbooks".to_string(),
      Self::AllCategories => "all categories".to_string(),
      Self::Recipe { id } => format!("recipe {}", id),
    }
  }

  /// Describe a raw cache key, for listings.
  pub fn describe(cache_key: &str) -> String {
    match cache_key {
      "all_recipes" => Self::AllRecipes.description(),
      "all_cookbooks" => Self::AllCookbooks.description(),
      "all_categories" => Self::AllCategories.description(),
      other => match other.strip_prefix("recipe_") {
        Some(id) => Self::Recipe { id: id.to_string() }.description(),
        None => other.to_string(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_recipe_updated_at_takes_newest_timestamp() {
    let mut recipe = Recipe {
      created_at: Some("2024-01-01T00:00:00.000Z".to_string()),
      ..Default::default()
    };
    assert_eq!(
      recipe.updated_at(),
      Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );

    recipe.last_modified = Some("2024-02-01T00:00:00.000Z".to_string());
    assert_eq!(
      recipe.updated_at(),
      Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
    );

    recipe.created_at = None;
    recipe.last_modified = Some("garbage".to_string());
    assert_eq!(recipe.updated_at(), None);
  }

  #[test]
  fn test_resource_keys() {
    assert_eq!(ResourceKey::AllRecipes.cache_key(), "all_recipes");
    assert_eq!(
      ResourceKey::Recipe { id: "abc".into() }.cache_key(),
      "recipe_abc"
    );
    assert_eq!(ResourceKey::describe("recipe_abc"), "recipe abc");
    assert_eq!(ResourceKey::describe("all_categories"), "all categories");
  }
}
