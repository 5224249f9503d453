//! recipedb-vector
//!
//! Dense retrieval over chunk embeddings stored in a LanceDB table.
//!
//! `schema` defines the Arrow layout, `table` converts chunks to and from
//! record batches, and `index` owns the build/load/query lifecycle.
pub mod schema;
pub mod table;
pub mod index;

pub use index::DenseIndex;
