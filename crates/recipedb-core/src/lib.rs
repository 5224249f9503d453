//! recipedb-core
//!
//! Domain types, error taxonomy, configuration, tokenizer and the
//! parent/child document store shared by the index crates.

pub mod chunker;
pub mod config;
pub mod error;
pub mod store;
pub mod text;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
