//! Command-line surface.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;

use crate::cache::{
  CacheLayer, CacheResult, CacheSource, KeyValueStorage, NoopStorage, ResourceCache, SqliteStorage,
  SystemClock,
};
use crate::config::{self, Config};
use crate::favorites::Favorites;
use crate::filter::{FilterCriteria, FilterField};
use crate::normalize::normalize;
use crate::recipes::{EntityKind, Recipe, RecipeBook, ResourceKey, SaveOutcome};
use crate::store::FirestoreStore;

#[derive(Parser, Debug)]
#[command(name = "recipebook")]
#[command(about = "Browse and edit a shared recipe book, with a local cache")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/recipebook/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Skip the local cache and read everything from the store
  #[arg(long, global = true)]
  pub no_cache: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List recipes, newest first
  Recipes {
    #[command(flatten)]
    filters: FilterArgs,
    /// Drop the cached list and fetch everything again
    #[arg(long, conflicts_with = "offline")]
    refresh: bool,
    /// Only read the local cache
    #[arg(long)]
    offline: bool,
    #[arg(long)]
    json: bool,
  },
  /// Show a single recipe
  Recipe {
    id: String,
    #[arg(long)]
    json: bool,
  },
  /// List cookbooks with their recipe counts
  Cookbooks,
  /// List canonical categories
  Categories,
  /// List the available values for a filter, or for every filter
  Options {
    #[arg(value_enum)]
    field: Option<FilterField>,
  },
  /// Check a name against existing ones for near-duplicates
  Check {
    #[arg(value_enum)]
    kind: EntityKind,
    value: String,
  },
  /// Add a recipe
  Add {
    #[command(flatten)]
    fields: RecipeArgs,
    /// Save even when similar names already exist
    #[arg(long)]
    force: bool,
  },
  /// Edit a recipe; only the given fields change
  Edit {
    id: String,
    #[command(flatten)]
    fields: RecipeArgs,
    /// Save even when similar names already exist
    #[arg(long)]
    force: bool,
  },
  /// Manage favorite recipes
  #[command(subcommand)]
  Favorites(FavoritesCommand),
  /// Inspect or clear the local cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
  List,
  Add { id: String },
  Remove { id: String },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Show live cache entries
  Status,
  /// Remove cache entries, all of them unless a key prefix is given
  Clear { prefix: Option<String> },
}

/// Recipe filters. All given filters must match.
#[derive(clap::Args, Debug, Default)]
pub struct FilterArgs {
  /// Case-insensitive search in titles
  #[arg(short, long)]
  pub search: Option<String>,
  #[arg(long)]
  pub cuisine: Option<String>,
  #[arg(long)]
  pub effort: Option<String>,
  #[arg(long)]
  pub cooking_method: Option<String>,
  #[arg(long)]
  pub meal_type: Option<String>,
  #[arg(long)]
  pub food_group: Option<String>,
  #[arg(long)]
  pub category: Option<String>,
  #[arg(long)]
  pub cookbook: Option<String>,
  #[arg(long)]
  pub author: Option<String>,
  /// Case-insensitive search in searchable ingredients
  #[arg(short, long)]
  pub ingredient: Option<String>,
}

impl FilterArgs {
  pub fn criteria(&self) -> FilterCriteria {
    let mut criteria = FilterCriteria::new();
    criteria.set_opt(FilterField::SearchText, self.search.clone());
    criteria.set_opt(FilterField::Cuisine, self.cuisine.clone());
    criteria.set_opt(FilterField::Effort, self.effort.clone());
    criteria.set_opt(FilterField::CookingMethod, self.cooking_method.clone());
    criteria.set_opt(FilterField::MealType, self.meal_type.clone());
    criteria.set_opt(FilterField::FoodGroup, self.food_group.clone());
    // Categories are stored lower-case
    criteria.set_opt(FilterField::Category, self.category.as_deref().map(normalize));
    criteria.set_opt(FilterField::Cookbook, self.cookbook.clone());
    criteria.set_opt(FilterField::Author, self.author.clone());
    criteria.set_opt(FilterField::Ingredient, self.ingredient.clone());
    criteria
  }
}

/// Recipe fields settable from the command line.
#[derive(clap::Args, Debug, Default)]
pub struct RecipeArgs {
  #[arg(long)]
  pub title: Option<String>,
  #[arg(long)]
  pub cookbook: Option<String>,
  #[arg(long)]
  pub author: Option<String>,
  #[arg(long)]
  pub cuisine: Option<String>,
  #[arg(long)]
  pub effort: Option<String>,
  #[arg(long)]
  pub cooking_method: Option<String>,
  #[arg(long)]
  pub meal_type: Option<String>,
  #[arg(long)]
  pub food_group: Option<String>,
  #[arg(long)]
  pub category: Option<String>,
  /// Repeat for each ingredient line
  #[arg(long = "ingredient")]
  pub ingredients: Vec<String>,
  /// Repeat for each searchable ingredient
  #[arg(long = "search-ingredient")]
  pub searchable_ingredients: Vec<String>,
  #[arg(long = "tag")]
  pub tags: Vec<String>,
  #[arg(long = "dietary-tag")]
  pub dietary_tags: Vec<String>,
  #[arg(long)]
  pub instructions: Option<String>,
  #[arg(long)]
  pub image_url: Option<String>,
}

impl RecipeArgs {
  /// Overwrite the fields that were given.
  pub fn apply(self, recipe: &mut Recipe) {
    fn set(target: &mut Option<String>, value: Option<String>) {
      if value.is_some() {
        *target = value;
      }
    }
    fn set_list(target: &mut Vec<String>, values: Vec<String>) {
      if !values.is_empty() {
        *target = values;
      }
    }

    if let Some(title) = self.title {
      recipe.title = title;
    }
    set(&mut recipe.cookbook, self.cookbook);
    set(&mut recipe.author, self.author);
    set(&mut recipe.cuisine_type, self.cuisine);
    set(&mut recipe.effort, self.effort);
    set(&mut recipe.cooking_method, self.cooking_method);
    set(&mut recipe.recipe_type, self.meal_type);
    set(&mut recipe.ingredient_category, self.food_group);
    set(&mut recipe.category, self.category);
    set(&mut recipe.instructions, self.instructions);
    set(&mut recipe.image_url, self.image_url);
    set_list(&mut recipe.ingredients, self.ingredients);
    set_list(&mut recipe.searchable_ingredients, self.searchable_ingredients);
    set_list(&mut recipe.tags, self.tags);
    set_list(&mut recipe.dietary_tags, self.dietary_tags);
  }
}

// ============================================================================
// Wiring
// ============================================================================

struct Context {
  book: RecipeBook,
  favorites: Favorites,
}

impl Context {
  fn open(config: &Config, no_cache: bool) -> Result<Self> {
    let local: Arc<dyn KeyValueStorage> = match &config.cache.path {
      Some(path) => Arc::new(SqliteStorage::open(path)?),
      None => Arc::new(SqliteStorage::open_default()?),
    };

    let cache_storage: Arc<dyn KeyValueStorage> = if no_cache || !config.cache.enabled {
      Arc::new(NoopStorage)
    } else {
      local.clone()
    };

    let fresh_for = i64::try_from(config.cache.fresh_for_secs)
      .map_err(|_| eyre!("cache.fresh_for_secs is too large"))?;
    let cache = CacheLayer::new(ResourceCache::new(cache_storage, Arc::new(SystemClock)))
      .with_fresh_window(Duration::seconds(fresh_for));

    let store = Arc::new(FirestoreStore::new(&config.firestore)?);

    Ok(Self {
      book: RecipeBook::new(store, cache),
      favorites: Favorites::new(local),
    })
  }
}

pub async fn run(args: Args) -> Result<()> {
  let config = Config::load(args.config.as_deref())?;
  let ctx = Context::open(&config, args.no_cache)?;

  match args.command {
    Command::Recipes {
      filters,
      refresh,
      offline,
      json,
    } => {
      if refresh {
        ctx.book.forget_recipes();
      }
      let criteria = filters.criteria();
      let recipes = if offline {
        ctx
          .book
          .cached_search(&criteria)
          .ok_or_else(|| eyre!("No cached recipes; run without --offline first"))?
      } else {
        let result = ctx.book.search(&criteria).await?;
        report_source(&result);
        result.data
      };
      if json {
        return print_json(&recipes);
      }
      if !criteria.is_empty() {
        let active: Vec<String> = criteria
          .active()
          .map(|(field, value)| format!("{} = {}", field.label(), value))
          .collect();
        println!("Filters: {}", active.join(", "));
      }
      for recipe in &recipes {
        let star = if ctx.favorites.is_favorite(&recipe.id) { "*" } else { " " };
        println!("{} {}  {}  [{}]", star, recipe.id, recipe.title, recipe.cookbook_name());
      }
      match ctx.book.last_synced(&ResourceKey::AllRecipes) {
        Some(synced) => println!("{} recipe(s), synced {}", recipes.len(), short_time(synced)),
        None => println!("{} recipe(s)", recipes.len()),
      }
    }
    Command::Recipe { id, json } => {
      let result = ctx.book.recipe(&id).await?;
      report_source(&result);
      if json {
        return print_json(&result.data);
      }
      print_recipe(&result.data, ctx.favorites.is_favorite(&id));
    }
    Command::Cookbooks => {
      let result = ctx.book.cookbooks().await?;
      report_source(&result);
      for cookbook in &result.data {
        println!("{:>4}  {}", cookbook.recipe_count, cookbook.name);
      }
    }
    Command::Categories => {
      let result = ctx.book.categories().await?;
      report_source(&result);
      for category in &result.data {
        println!("{}", category.name);
      }
    }
    Command::Options { field: Some(field) } => {
      for value in field_options(&ctx, field).await? {
        println!("{}", value);
      }
    }
    Command::Options { field: None } => {
      for field in FilterField::all().iter().filter(|f| !f.is_free_text()) {
        let values = field_options(&ctx, *field).await?;
        println!("{}: {}", field.label(), values.join(", "));
      }
    }
    Command::Check { kind, value } => match ctx.book.check_similar(kind, &value).await? {
      Some(warning) => println!("{}", warning),
      None => println!("No similar {} found.", kind),
    },
    Command::Add { fields, force } => {
      let mut draft = Recipe::default();
      fields.apply(&mut draft);
      let outcome = ctx.book.create_recipe(draft, force).await?;
      report_save(outcome)?;
    }
    Command::Edit { id, fields, force } => {
      let mut recipe = ctx.book.recipe(&id).await?.data;
      fields.apply(&mut recipe);
      let outcome = ctx.book.update_recipe(recipe, force).await?;
      report_save(outcome)?;
    }
    Command::Favorites(command) => run_favorites(&ctx, command).await?,
    Command::Cache(command) => run_cache(&ctx, command)?,
  }

  Ok(())
}

/// Choices for a filter. Categories come from the category collection.
async fn field_options(ctx: &Context, field: FilterField) -> Result<Vec<String>> {
  match field {
    FilterField::Category => {
      let categories = ctx.book.categories().await?.data;
      Ok(categories.into_iter().map(|c| c.name).collect())
    }
    _ => Ok(field.unique_values(&ctx.book.recipes().await?.data)),
  }
}

async fn run_favorites(ctx: &Context, command: FavoritesCommand) -> Result<()> {
  match command {
    FavoritesCommand::List => {
      for recipe in ctx.favorites.list() {
        println!("{}  {}", recipe.id, recipe.title);
      }
    }
    FavoritesCommand::Add { id } => {
      let recipe = ctx.book.recipe(&id).await?.data;
      if ctx.favorites.add(&recipe)? {
        println!("Added \"{}\" to favorites", recipe.title);
      } else {
        println!("\"{}\" is already a favorite", recipe.title);
      }
    }
    FavoritesCommand::Remove { id } => {
      if ctx.favorites.remove(&id)? {
        println!("Removed {} from favorites", id);
      } else {
        println!("{} is not a favorite", id);
      }
    }
  }
  Ok(())
}

fn run_cache(ctx: &Context, command: CacheCommand) -> Result<()> {
  match command {
    CacheCommand::Status => {
      let entries = ctx.book.cache_status()?;
      if entries.is_empty() {
        println!("Cache is empty");
      }
      for entry in entries {
        println!(
          "{:<32} stored {}  synced {}  expires {}",
          ResourceKey::describe(&entry.key),
          short_time(entry.stored_at),
          short_time(entry.synced_at),
          short_time(entry.expires_at)
        );
      }
    }
    CacheCommand::Clear { prefix } => {
      let removed = ctx.book.clear_cache(prefix.as_deref().unwrap_or(""))?;
      println!("Removed {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" });
    }
  }
  Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn report_source<T>(result: &CacheResult<T>) {
  if result.source != CacheSource::Offline {
    return;
  }
  let synced = result.synced_at.map(short_time).unwrap_or_default();
  eprintln!(
    "Showing cached data from {}; refresh failed: {}",
    synced,
    result.refresh_error.as_deref().unwrap_or("unknown error")
  );
}

fn report_save(outcome: SaveOutcome) -> Result<()> {
  match outcome {
    SaveOutcome::Saved(recipe) => {
      println!("Saved \"{}\" ({})", recipe.title, recipe.id);
      Ok(())
    }
    SaveOutcome::Blocked(warnings) => {
      for warning in &warnings {
        eprintln!("{}", warning);
      }
      Err(eyre!(
        "Not saved: {} duplicate warning(s). Re-run with --force to save anyway.",
        warnings.len()
      ))
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let json =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", json);
  Ok(())
}

fn print_recipe(recipe: &Recipe, favorite: bool) {
  println!("{}{}", recipe.title, if favorite { "  *" } else { "" });
  println!("{}", "=".repeat(recipe.title.chars().count().max(3)));

  let details = [
    ("Cookbook", Some(recipe.cookbook_name())),
    ("Author", recipe.author.as_deref()),
    ("Cuisine", recipe.cuisine_type.as_deref()),
    ("Effort", recipe.effort.as_deref()),
    ("Method", recipe.cooking_method.as_deref()),
    ("Meal type", recipe.recipe_type.as_deref()),
    ("Food group", recipe.ingredient_category.as_deref()),
    ("Category", recipe.category.as_deref()),
  ];
  for (label, value) in details {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
      println!("{:<11} {}", format!("{}:", label), value);
    }
  }
  if !recipe.tags.is_empty() {
    println!("{:<11} {}", "Tags:", recipe.tags.join(", "));
  }
  if !recipe.dietary_tags.is_empty() {
    println!("{:<11} {}", "Dietary:", recipe.dietary_tags.join(", "));
  }

  if !recipe.ingredients.is_empty() {
    println!("\nIngredients");
    for ingredient in &recipe.ingredients {
      println!("  - {}", ingredient);
    }
  }
  if let Some(instructions) = recipe.instructions.as_deref().filter(|s| !s.trim().is_empty()) {
    println!("\nInstructions\n{}", instructions.trim());
  }
}

fn short_time(t: DateTime<Utc>) -> String {
  t.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Data directory used for logs.
pub fn log_dir() -> Result<PathBuf> {
  Ok(config::data_dir()?.join("logs"))
}
