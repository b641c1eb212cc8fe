use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cookbook name for recipes that don't name one.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A recipe document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recipe {
  pub id: String,
  pub title: String,
  pub cookbook: Option<String>,
  pub author: Option<String>,
  pub cuisine_type: Option<String>,
  pub effort: Option<String>,
  pub cooking_method: Option<String>,
  /// Meal type (breakfast, dinner, ...)
  pub recipe_type: Option<String>,
  /// Food group
  pub ingredient_category: Option<String>,
  /// Stored lower-case
  pub category: Option<String>,
  #[serde(deserialize_with = "null_as_empty")]
  pub ingredients: Vec<String>,
  #[serde(deserialize_with = "null_as_empty")]
  pub searchable_ingredients: Vec<String>,
  #[serde(deserialize_with = "null_as_empty")]
  pub tags: Vec<String>,
  #[serde(deserialize_with = "null_as_empty")]
  pub dietary_tags: Vec<String>,
  pub instructions: Option<String>,
  pub image_url: Option<String>,
  pub user_id: Option<String>,
  /// ISO 8601
  pub created_at: Option<String>,
  /// ISO 8601
  pub last_modified: Option<String>,
}

impl Recipe {
  pub fn created(&self) -> Option<DateTime<Utc>> {
    self.created_at.as_deref().and_then(parse_timestamp)
  }

  pub fn modified(&self) -> Option<DateTime<Utc>> {
    self.last_modified.as_deref().and_then(parse_timestamp)
  }

  pub fn cookbook_name(&self) -> &str {
    match self.cookbook.as_deref().map(str::trim) {
      Some(name) if !name.is_empty() => name,
      _ => UNCATEGORIZED,
    }
  }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A canonical category document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Category {
  pub id: String,
  pub name: String,
  pub created_at: Option<String>,
}

/// Recipes grouped by cookbook name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookbook {
  pub name: String,
  pub recipe_count: usize,
  pub recipe_ids: Vec<String>,
}

/// Group recipes into cookbooks, sorted by name.
pub fn aggregate_cookbooks(recipes: &[Recipe]) -> Vec<Cookbook> {
  let mut by_name: std::collections::BTreeMap<&str, Vec<String>> = Default::default();
  for recipe in recipes {
    by_name
      .entry(recipe.cookbook_name())
      .or_default()
      .push(recipe.id.clone());
  }

  by_name
    .into_iter()
    .map(|(name, recipe_ids)| Cookbook {
      name: name.to_string(),
      recipe_count: recipe_ids.len(),
      recipe_ids,
    })
    .collect()
}

/// Parse an RFC 3339 / ISO 8601 timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s.trim())
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

/// Format a timestamp the way stored documents carry them
/// (`2024-01-31T09:30:00.000Z`).
pub fn format_timestamp(t: DateTime<Utc>) -> String {
  t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
