//! recipedb-text
//!
//! Tantivy-backed BM25 index over recipe chunks. Chunk text is tokenized by
//! `recipedb_core::text` before indexing so CJK and latin queries share one
//! analyzer.
pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::LexicalIndex;
pub use search::{search, SearchSnapshot};
