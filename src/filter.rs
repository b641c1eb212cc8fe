//! Filtering of an in-memory recipe collection.
//!
//! Every filter is optional; active filters are AND-combined and the input
//! order is preserved.

use clap::ValueEnum;
use std::collections::{BTreeMap, BTreeSet};

use crate::normalize::{
  sort_effort_levels, COOKING_METHODS, CUISINE_TYPES, EFFORT_LEVELS, FOOD_GROUPS, MEAL_TYPES,
};
use crate::recipes::Recipe;

/// Field a recipe can be filtered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum FilterField {
  SearchText,
  Cuisine,
  Effort,
  CookingMethod,
  MealType,
  FoodGroup,
  Category,
  Cookbook,
  Author,
  Ingredient,
}

/// What a filter field reads from a recipe.
enum FieldValue<'a> {
  Text(Option<&'a str>),
  List(&'a [String]),
}

/// How a filter value is compared against the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
  /// Field equals the value
  Exact,
  /// Field contains the value, ignoring ASCII case
  Contains,
  /// Any list element contains the value, ignoring ASCII case
  AnyContains,
}

impl FilterField {
  pub fn all() -> &'static [Self] {
    &[
      FilterField::SearchText,
      FilterField::Cuisine,
      FilterField::Effort,
      FilterField::CookingMethod,
      FilterField::MealType,
      FilterField::FoodGroup,
      FilterField::Category,
      FilterField::Cookbook,
      FilterField::Author,
      FilterField::Ingredient,
    ]
  }

  /// Human-readable label for this filter
  pub fn label(&self) -> &'static str {
    match self {
      FilterField::SearchText => "Search",
      FilterField::Cuisine => "Cuisine Type",
      FilterField::Effort => "Effort Level",
      FilterField::CookingMethod => "Cooking Method",
      FilterField::MealType => "Meal Type",
      FilterField::FoodGroup => "Food Group",
      FilterField::Category => "Category",
      FilterField::Cookbook => "Cookbook",
      FilterField::Author => "Author",
      FilterField::Ingredient => "Ingredient",
    }
  }

  /// Extract the value of this filter field from a recipe
  fn extract<'a>(&self, recipe: &'a Recipe) -> FieldValue<'a> {
    match self {
      FilterField::SearchText => FieldValue::Text(Some(&recipe.title)),
      FilterField::Cuisine => FieldValue::Text(recipe.cuisine_type.as_deref()),
      FilterField::Effort => FieldValue::Text(recipe.effort.as_deref()),
      FilterField::CookingMethod => FieldValue::Text(recipe.cooking_method.as_deref()),
      FilterField::MealType => FieldValue::Text(recipe.recipe_type.as_deref()),
      FilterField::FoodGroup => FieldValue::Text(recipe.ingredient_category.as_deref()),
      FilterField::Category => FieldValue::Text(recipe.category.as_deref()),
      FilterField::Cookbook => FieldValue::Text(recipe.cookbook.as_deref()),
      FilterField::Author => FieldValue::Text(recipe.author.as_deref()),
      FilterField::Ingredient => FieldValue::List(&recipe.searchable_ingredients),
    }
  }

  fn match_kind(&self) -> MatchKind {
    match self {
      FilterField::SearchText => MatchKind::Contains,
      FilterField::Ingredient => MatchKind::AnyContains,
      _ => MatchKind::Exact,
    }
  }

  /// Whether `recipe` satisfies this filter set to `value`.
  fn matches(&self, recipe: &Recipe, value: &str) -> bool {
    let kind = self.match_kind();
    match self.extract(recipe) {
      FieldValue::Text(field) => match kind {
        MatchKind::Exact => field == Some(value),
        MatchKind::Contains | MatchKind::AnyContains => {
          field.is_some_and(|f| contains_ignore_case(f, value))
        }
      },
      FieldValue::List(items) => match kind {
        MatchKind::Exact => items.iter().any(|item| item == value),
        MatchKind::Contains | MatchKind::AnyContains => {
          items.iter().any(|item| contains_ignore_case(item, value))
        }
      },
    }
  }

  /// Free-text fields have no fixed set of choices.
  pub fn is_free_text(&self) -> bool {
    matches!(self, FilterField::SearchText | FilterField::Ingredient)
  }

  /// Built-in choices shown before any recipe carries a value.
  pub fn default_options(&self) -> &'static [&'static str] {
    match self {
      FilterField::Cuisine => CUISINE_TYPES,
      FilterField::Effort => EFFORT_LEVELS,
      FilterField::CookingMethod => COOKING_METHODS,
      FilterField::MealType => MEAL_TYPES,
      FilterField::FoodGroup => FOOD_GROUPS,
      _ => &[],
    }
  }

  /// Distinct non-empty values of this field across `recipes`, for populating
  /// choices. Falls back to the built-in choices when none are present.
  pub fn unique_values(&self, recipes: &[Recipe]) -> Vec<String> {
    if self.is_free_text() {
      return Vec::new();
    }

    let mut values: BTreeSet<&str> = BTreeSet::new();
    for recipe in recipes {
      if let FieldValue::Text(Some(v)) = self.extract(recipe) {
        if !v.trim().is_empty() {
          values.insert(v);
        }
      }
    }

    let mut result: Vec<String> = if values.is_empty() {
      self.default_options().iter().map(|s| s.to_string()).collect()
    } else {
      values.into_iter().map(String::from).collect()
    };

    if *self == FilterField::Effort {
      sort_effort_levels(&mut result);
    }
    result
  }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
  haystack
    .to_ascii_lowercase()
    .contains(&needle.to_ascii_lowercase())
}

/// Selected value per filter field. Missing or empty values impose no
/// constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
  values: BTreeMap<FilterField, String>,
}

impl FilterCriteria {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder form of [`FilterCriteria::set`].
  #[allow(dead_code)]
  pub fn with(mut self, field: FilterField, value: impl Into<String>) -> Self {
    self.set(field, value);
    self
  }

  /// Select `value` for `field`; an empty value clears it.
  pub fn set(&mut self, field: FilterField, value: impl Into<String>) {
    let value = value.into();
    if value.is_empty() {
      self.values.remove(&field);
    } else {
      self.values.insert(field, value);
    }
  }

  /// Select `value` for `field` when present.
  pub fn set_opt(&mut self, field: FilterField, value: Option<String>) {
    if let Some(value) = value {
      self.set(field, value);
    }
  }

  /// True when no filter is active.
  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Active filters in field order.
  pub fn active(&self) -> impl Iterator<Item = (FilterField, &str)> {
    self.values.iter().map(|(field, value)| (*field, value.as_str()))
  }

  /// Whether `recipe` satisfies every active filter.
  pub fn matches(&self, recipe: &Recipe) -> bool {
    self.active().all(|(field, value)| field.matches(recipe, value))
  }
}

/// Recipes satisfying every active filter, in input order.
pub fn apply_filters<'a>(recipes: &'a [Recipe], criteria: &FilterCriteria) -> Vec<&'a Recipe> {
  recipes
    .iter()
    .filter(|recipe| criteria.matches(recipe))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn test_recipes() -> Vec<Recipe> {
    vec![
      Recipe {
        id: "1".to_string(),
        title: "Spaghetti Carbonara".to_string(),
        cuisine_type: Some("italian".to_string()),
        effort: Some("quick".to_string()),
        cookbook: Some("Weeknight".to_string()),
        author: Some("Ana".to_string()),
        category: Some("pasta".to_string()),
        searchable_ingredients: vec!["Spaghetti".to_string(), "Pecorino Romano".to_string()],
        ..Default::default()
      },
      Recipe {
        id: "2".to_string(),
        title: "Osso Buco".to_string(),
        cuisine_type: Some("italian".to_string()),
        effort: Some("slow".to_string()),
        cookbook: Some("Sunday".to_string()),
        author: Some("Ana".to_string()),
        searchable_ingredients: vec!["veal shank".to_string()],
        ..Default::default()
      },
      Recipe {
        id: "3".to_string(),
        title: "Bibimbap".to_string(),
        cuisine_type: Some("korean".to_string()),
        effort: Some("quick".to_string()),
        cooking_method: Some("Stovetop Cooking".to_string()),
        ..Default::default()
      },
      Recipe {
        id: "4".to_string(),
        title: "Spaghetti Aglio e Olio".to_string(),
        cuisine_type: Some("Italian".to_string()),
        effort: Some("quick".to_string()),
        ..Default::default()
      },
    ]
  }

  fn ids(recipes: &[&Recipe]) -> Vec<String> {
    recipes.iter().map(|r| r.id.clone()).collect()
  }

  #[test]
  fn test_no_criteria_is_identity() {
    let recipes = test_recipes();
    let filtered = apply_filters(&recipes, &FilterCriteria::new());
    assert_eq!(ids(&filtered), vec!["1", "2", "3", "4"]);
  }

  #[test]
  fn test_empty_value_is_unset() {
    let recipes = test_recipes();
    let criteria = FilterCriteria::new()
      .with(FilterField::Cuisine, "korean")
      .with(FilterField::Cuisine, "");
    assert!(criteria.is_empty());
    assert_eq!(apply_filters(&recipes, &criteria).len(), 4);
  }

  #[test]
  fn test_exact_match_is_case_sensitive() {
    let recipes = test_recipes();
    let criteria = FilterCriteria::new().with(FilterField::Cuisine, "italian");
    assert_eq!(ids(&apply_filters(&recipes, &criteria)), vec!["1", "2"]);
  }

  #[test]
  fn test_filters_are_and_combined() {
    let recipes = test_recipes();
    let criteria = FilterCriteria::new()
      .with(FilterField::Cuisine, "italian")
      .with(FilterField::Effort, "quick");
    assert_eq!(ids(&apply_filters(&recipes, &criteria)), vec!["1"]);
  }

  #[test]
  fn test_missing_field_fails_active_filter() {
    let recipes = test_recipes();
    let criteria = FilterCriteria::new().with(FilterField::CookingMethod, "Stovetop Cooking");
    assert_eq!(ids(&apply_filters(&recipes, &criteria)), vec!["3"]);

    let criteria = FilterCriteria::new().with(FilterField::Author, "Ana");
    assert_eq!(ids(&apply_filters(&recipes, &criteria)), vec!["1", "2"]);
  }

  #[test]
  fn test_search_text_is_case_insensitive_substring() {
    let recipes = test_recipes();
    let criteria = FilterCriteria::new().with(FilterField::SearchText, "SPAGH");
    assert_eq!(ids(&apply_filters(&recipes, &criteria)), vec!["1", "4"]);
  }

  #[test]
  fn test_ingredient_matches_any_element() {
    let recipes = test_recipes();
    let criteria = FilterCriteria::new().with(FilterField::Ingredient, "romano");
    assert_eq!(ids(&apply_filters(&recipes, &criteria)), vec!["1"]);

    let criteria = FilterCriteria::new().with(FilterField::Ingredient, "SHANK");
    assert_eq!(ids(&apply_filters(&recipes, &criteria)), vec!["2"]);
  }

  #[test]
  fn test_no_match_returns_empty() {
    let recipes = test_recipes();
    let criteria = FilterCriteria::new()
      .with(FilterField::Cuisine, "korean")
      .with(FilterField::Cookbook, "Weeknight");
    assert!(apply_filters(&recipes, &criteria).is_empty());
  }

  #[test]
  fn test_unique_values_sorted() {
    let recipes = test_recipes();
    assert_eq!(
      FilterField::Cuisine.unique_values(&recipes),
      vec!["Italian", "italian", "korean"]
    );
    assert_eq!(FilterField::Author.unique_values(&recipes), vec!["Ana"]);
    assert!(FilterField::SearchText.unique_values(&recipes).is_empty());
  }

  #[test]
  fn test_unique_values_falls_back_to_defaults() {
    let recipes = test_recipes();
    let values = FilterField::MealType.unique_values(&recipes);
    assert_eq!(values.first().map(String::as_str), Some("Breakfast"));
    assert_eq!(values.len(), MEAL_TYPES.len());

    assert!(FilterField::Category.unique_values(&[]).is_empty());
  }

  #[test]
  fn test_unique_values_effort_order() {
    let recipes = vec![
      Recipe {
        effort: Some("Project Cooking (2+ hours)".to_string()),
        ..Default::default()
      },
      Recipe {
        effort: Some("Quick & Easy (Under 30 mins)".to_string()),
        ..Default::default()
      },
    ];
    assert_eq!(
      FilterField::Effort.unique_values(&recipes),
      vec!["Quick & Easy (Under 30 mins)", "Project Cooking (2+ hours)"]
    );
  }
}
