//! LanceDB connection helpers and Arrow conversion for chunk rows.

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::ArrowError;
use lancedb::{connect, Connection, Table};
use std::path::Path;
use std::sync::Arc;

use recipedb_core::types::{Chunk, ChunkId, ChunkMetadata, DocumentId};
use recipedb_core::{Error, Result};

use crate::schema::{
	build_arrow_schema, CONTENT_COLUMN, DISTANCE_COLUMN, ID_COLUMN, METADATA_COLUMN, PARENT_COLUMN,
};

pub(crate) fn lance_err(e: lancedb::Error) -> Error { Error::backend("lancedb", e) }

pub(crate) fn arrow_err(e: ArrowError) -> Error { Error::backend("arrow", e) }

pub async fn open_db(path: &Path) -> Result<Connection> {
	connect(path.to_string_lossy().as_ref()).execute().await.map_err(lance_err)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
	let names = conn.table_names().execute().await.map_err(lance_err)?;
	Ok(names.iter().any(|n| n == name))
}

/// Create `name` holding `chunks`. An empty slice creates an empty table with the full schema.
pub async fn create_chunk_table(
	conn: &Connection,
	name: &str,
	chunks: &[Chunk],
	vectors: &[Vec<f32>],
	dim: i32,
) -> Result<Table> {
	let schema = build_arrow_schema(dim);
	let batches = if chunks.is_empty() { vec![] } else { vec![Ok(chunks_to_record_batch(chunks, vectors, dim)?)] };
	let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
	conn.create_table(name, reader).execute().await.map_err(lance_err)
}

pub async fn append_chunks(table: &Table, chunks: &[Chunk], vectors: &[Vec<f32>], dim: i32) -> Result<()> {
	if chunks.is_empty() {
		return Ok(());
	}
	let record_batch = chunks_to_record_batch(chunks, vectors, dim)?;
	let schema = record_batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
	table.add(reader).execute().await.map_err(lance_err)?;
	Ok(())
}

/// Remove every row whose id is in `ids`.
pub async fn delete_ids(table: &Table, ids: &[&str]) -> Result<()> {
	if ids.is_empty() {
		return Ok(());
	}
	table.delete(&id_predicate(ids)).await.map_err(lance_err)?;
	Ok(())
}

fn id_predicate(ids: &[&str]) -> String {
	let quoted: Vec<String> = ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect();
	format!("{ID_COLUMN} IN ({})", quoted.join(", "))
}

pub fn chunks_to_record_batch(chunks: &[Chunk], vectors: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	if chunks.len() != vectors.len() {
		return Err(Error::InvalidParameter(format!("{} chunks but {} vectors", chunks.len(), vectors.len())));
	}
	let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
	let parents: Vec<&str> = chunks.iter().map(|c| c.parent_id.as_str()).collect();
	let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
	let metadata = chunks
		.iter()
		.map(|c| serde_json::to_string(&c.metadata))
		.collect::<std::result::Result<Vec<_>, _>>()
		.map_err(|e| Error::backend("serde_json", e))?;
	let rows = vectors.iter().map(|v| Some(v.iter().copied().map(Some)));
	RecordBatch::try_new(
		build_arrow_schema(dim),
		vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(parents)),
			Arc::new(StringArray::from(contents)),
			Arc::new(StringArray::from(metadata)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(rows, dim)),
		],
	)
	.map_err(arrow_err)
}

/// Decode a vector-search result batch into `(chunk, similarity)` pairs.
/// Similarity is `1 - cosine distance`; undefined distances score 0.
pub fn decode_hits(batch: &RecordBatch) -> Result<Vec<(Chunk, f64)>> {
	let ids = string_column(batch, ID_COLUMN)?;
	let parents = string_column(batch, PARENT_COLUMN)?;
	let contents = string_column(batch, CONTENT_COLUMN)?;
	let metadata = string_column(batch, METADATA_COLUMN)?;
	let distances = batch
		.column_by_name(DISTANCE_COLUMN)
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or_else(|| Error::IndexCorrupt(format!("search result has no {DISTANCE_COLUMN} column")))?;

	let mut hits = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let metadata: ChunkMetadata = serde_json::from_str(metadata.value(i))
			.map_err(|e| Error::IndexCorrupt(format!("chunk metadata unreadable: {e}")))?;
		let chunk = Chunk {
			id: ChunkId::new(ids.value(i)),
			parent_id: DocumentId::new(parents.value(i)),
			content: contents.value(i).to_string(),
			metadata,
		};
		let score = if distances.is_null(i) { f64::NAN } else { 1.0 - f64::from(distances.value(i)) };
		hits.push((chunk, if score.is_finite() { score } else { 0.0 }));
	}
	Ok(hits)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::IndexCorrupt(format!("{name} column missing or not utf8")))
}
