//! Canonicalization of free text and near-duplicate detection.
//!
//! Matching is exact after normalization: no edit distance, no phonetic
//! matching, no Unicode case folding.

use std::cmp::Ordering;
use std::collections::HashSet;

/// Effort levels in display order.
pub const EFFORT_LEVELS: &[&str] = &[
  "Quick & Easy (Under 30 mins)",
  "Minimal Effort, Long Time (Set & Forget)",
  "Moderate Effort (30-60 mins)",
  "Active Cooking (1-2 hours)",
  "Project Cooking (2+ hours)",
  "Complex Recipe (Multiple Steps)",
  "Special Occasion (All Day Event)",
];

pub const CUISINE_TYPES: &[&str] = &[
  "American",
  "Mexican",
  "Korean",
  "Chinese",
  "Lebanese",
  "Japanese",
  "Vietnamese",
  "Mediterranean",
  "Jewish",
  "Italian",
  "Indian",
  "Polish",
  "Irish",
  "Other",
  "European",
];

pub const COOKING_METHODS: &[&str] = &[
  "Stovetop Cooking",
  "Oven Cooking",
  "Baking",
  "Crock Pot",
  "Instant Pot",
  "Simmer on Stove",
  "Other",
];

pub const MEAL_TYPES: &[&str] = &[
  "Breakfast",
  "Dinner",
  "Dessert",
  "Snack",
  "Beverage",
  "Appetizer",
  "Side Dish",
  "Brunch",
];

pub const FOOD_GROUPS: &[&str] = &[
  "Veggie",
  "Protein",
  "Meat",
  "Soup",
  "Dip",
  "Beverage",
  "Grain",
  "Sauce",
  "Fruit",
  "Broth",
  "Oil",
  "Dessert sweet",
  "Dessert savory",
  "Fun drink",
  "Coffee drink",
  "Cocktail",
  "Other",
];

/// Trim surrounding whitespace and lower-case ASCII letters.
pub fn normalize(text: &str) -> String {
  text.trim().to_ascii_lowercase()
}

/// First entry of `existing` equal to `candidate` after normalization.
pub fn find_similar<'a, S: AsRef<str>>(candidate: &str, existing: &'a [S]) -> Option<&'a S> {
  let wanted = normalize(candidate);
  existing
    .iter()
    .find(|entry| normalize(entry.as_ref()) == wanted)
}

/// Entries that repeat an earlier entry of the same list after normalization.
pub fn find_duplicates<S: AsRef<str>>(items: &[S]) -> Vec<&str> {
  let mut seen = HashSet::new();
  items
    .iter()
    .map(AsRef::as_ref)
    .filter(|item| !seen.insert(normalize(item)))
    .collect()
}

/// Position of `effort` in [`EFFORT_LEVELS`], ignoring case.
fn effort_rank(effort: &str) -> Option<usize> {
  find_similar(effort, EFFORT_LEVELS).and_then(|level| EFFORT_LEVELS.iter().position(|l| l == level))
}

/// The canonical spelling of a known effort level, or the trimmed input.
pub fn canonical_effort(effort: &str) -> String {
  match find_similar(effort, EFFORT_LEVELS) {
    Some(level) => (*level).to_string(),
    None => effort.trim().to_string(),
  }
}

/// Sort known effort levels by their canonical order, unknown ones after them
/// alphabetically.
pub fn sort_effort_levels(levels: &mut [String]) {
  levels.sort_by(|a, b| match (effort_rank(a), effort_rank(b)) {
    (Some(x), Some(y)) => x.cmp(&y),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => a.cmp(b),
  });
}
