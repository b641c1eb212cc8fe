//! Duplicate warnings raised before a recipe is saved.

use std::collections::BTreeSet;
use std::fmt;

use crate::normalize::{find_duplicates, find_similar};

use super::types::{Category, Recipe};

/// Named values checked for near-duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EntityKind {
  Cookbook,
  Author,
  Category,
  Title,
  Ingredient,
}

impl EntityKind {
  pub fn label(&self) -> &'static str {
    match self {
      EntityKind::Cookbook => "cookbook",
      EntityKind::Author => "author",
      EntityKind::Category => "category",
      EntityKind::Title => "title",
      EntityKind::Ingredient => "ingredient",
    }
  }

  /// Distinct existing values of this kind, skipping the recipe `exclude_id`.
  pub fn existing_values(
    &self,
    recipes: &[Recipe],
    categories: &[Category],
    exclude_id: Option<&str>,
  ) -> Vec<String> {
    let others = recipes
      .iter()
      .filter(|recipe| Some(recipe.id.as_str()) != exclude_id);

    let values: BTreeSet<String> = match self {
      EntityKind::Cookbook => others.filter_map(|r| r.cookbook.clone()).collect(),
      EntityKind::Author => others.filter_map(|r| r.author.clone()).collect(),
      EntityKind::Title => others.map(|r| r.title.clone()).collect(),
      EntityKind::Ingredient => others
        .flat_map(|r| r.searchable_ingredients.iter().cloned())
        .collect(),
      EntityKind::Category => categories.iter().map(|c| c.name.clone()).collect(),
    };

    values
      .into_iter()
      .filter(|value| !value.trim().is_empty())
      .collect()
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// A value that collides with an existing one after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateWarning {
  pub kind: EntityKind,
  pub candidate: String,
  pub existing: String,
}

impl fmt::Display for DuplicateWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      EntityKind::Title => write!(f, "A recipe titled \"{}\" already exists.", self.existing),
      EntityKind::Ingredient if self.candidate != self.existing => write!(
        f,
        "Duplicate ingredient \"{}\" (already listed as \"{}\").",
        self.candidate, self.existing
      ),
      EntityKind::Ingredient => write!(f, "Duplicate ingredient \"{}\".", self.candidate),
      kind => write!(f, "Similar {} \"{}\" already exists.", kind, self.existing),
    }
  }
}

/// Check a named value against existing ones.
///
/// Titles collide whenever they match. For the other kinds, reusing an
/// existing value verbatim (after trimming) is not a warning.
pub fn check_value<S: AsRef<str>>(
  kind: EntityKind,
  candidate: &str,
  existing: &[S],
) -> Option<DuplicateWarning> {
  if candidate.trim().is_empty() {
    return None;
  }

  let similar = find_similar(candidate, existing)?.as_ref();
  if kind != EntityKind::Title && similar.trim() == candidate.trim() {
    return None;
  }

  Some(DuplicateWarning {
    kind,
    candidate: candidate.to_string(),
    existing: similar.to_string(),
  })
}

/// Entries repeated within one ingredient list.
pub fn check_ingredient_list(items: &[String]) -> Vec<DuplicateWarning> {
  find_duplicates(items)
    .into_iter()
    .filter_map(|dup| {
      // First occurrence is always found, the duplicate matches it
      find_similar(dup, items).map(|first| DuplicateWarning {
        kind: EntityKind::Ingredient,
        candidate: dup.to_string(),
        existing: first.clone(),
      })
    })
    .collect()
}

/// Every warning for saving `draft` next to the existing collection.
///
/// `draft.id` is empty for a new recipe; an existing recipe is not compared
/// with its own stored copy.
pub fn check_recipe(draft: &Recipe, recipes: &[Recipe], categories: &[Category]) -> Vec<DuplicateWarning> {
  let exclude = Some(draft.id.as_str()).filter(|id| !id.is_empty());
  let mut warnings = Vec::new();

  let named = [
    (EntityKind::Title, Some(draft.title.as_str())),
    (EntityKind::Cookbook, draft.cookbook.as_deref()),
    (EntityKind::Author, draft.author.as_deref()),
    (EntityKind::Category, draft.category.as_deref()),
  ];
  for (kind, value) in named {
    let Some(value) = value else { continue };
    let existing = kind.existing_values(recipes, categories, exclude);
    warnings.extend(check_value(kind, value, &existing));
  }

  warnings.extend(check_ingredient_list(&draft.ingredients));
  warnings.extend(check_ingredient_list(&draft.searchable_ingredients));
  warnings
}
