use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const PARENT_COLUMN: &str = "parent_id";
pub const CONTENT_COLUMN: &str = "content";
/// Chunk metadata serialized as JSON.
pub const METADATA_COLUMN: &str = "metadata";
pub const VECTOR_COLUMN: &str = "vector";
/// Column lancedb appends to vector search results.
pub const DISTANCE_COLUMN: &str = "_distance";

pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID_COLUMN, DataType::Utf8, false),
		Field::new(PARENT_COLUMN, DataType::Utf8, false),
		Field::new(CONTENT_COLUMN, DataType::Utf8, false),
		Field::new(METADATA_COLUMN, DataType::Utf8, false),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Vector width of a stored table, or `None` if the vector column is absent or not a fixed-size list.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}

/// Names of the columns a readable table must carry.
pub fn missing_columns(schema: &Schema) -> Vec<&'static str> {
	[ID_COLUMN, PARENT_COLUMN, CONTENT_COLUMN, METADATA_COLUMN, VECTOR_COLUMN]
		.into_iter()
		.filter(|name| schema.field_with_name(name).is_err())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_reports_its_dimension() {
		let schema = build_arrow_schema(8);
		assert_eq!(vector_dim(&schema), Some(8));
		assert!(missing_columns(&schema).is_empty());
	}

	#[test]
	fn missing_vector_column_is_detected() {
		let schema = Schema::new(vec![Field::new(ID_COLUMN, DataType::Utf8, false)]);
		assert_eq!(vector_dim(&schema), None);
		assert_eq!(missing_columns(&schema), vec![PARENT_COLUMN, CONTENT_COLUMN, METADATA_COLUMN, VECTOR_COLUMN]);
	}
}
