//! Recipe book domain: records, cache keys, duplicate checks and the cached
//! client.

mod client;
mod keys;
mod types;
mod validate;

pub use client::{RecipeBook, SaveOutcome};
pub use keys::ResourceKey;
#[cfg(test)]
pub use types::parse_timestamp;
pub use types::Recipe;
pub use validate::EntityKind;
