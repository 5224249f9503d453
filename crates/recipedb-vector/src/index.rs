use async_trait::async_trait;
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use recipedb_core::config::IndexConfig;
use recipedb_core::traits::{embed_checked, ChunkRetriever, Embedder};
use recipedb_core::types::{Chunk, RankedList, SourceKind};
use recipedb_core::{Error, Result};

use crate::schema::{missing_columns, vector_dim, VECTOR_COLUMN};
use crate::table::{append_chunks, create_chunk_table, decode_hits, delete_ids, lance_err, open_db, table_exists};

const EMBED_BATCH: usize = 256;

struct DenseState {
	_conn: Connection,
	table: Table,
	rows: usize,
}

/// Cosine-similarity index over chunk embeddings, stored as a lancedb table.
///
/// The embedder is fixed at construction so documents and queries always share
/// one vector space.
pub struct DenseIndex {
	embedder: Arc<dyn Embedder>,
	location: PathBuf,
	table_name: String,
	state: RwLock<Option<DenseState>>,
	// Serializes build/add so staging directories never collide.
	writer: Mutex<()>,
}

impl DenseIndex {
	pub fn new(embedder: Arc<dyn Embedder>, location: impl Into<PathBuf>, table_name: impl Into<String>) -> Self {
		Self {
			embedder,
			location: location.into(),
			table_name: table_name.into(),
			state: RwLock::new(None),
			writer: Mutex::new(()),
		}
	}

	pub fn from_config(config: &IndexConfig, embedder: Arc<dyn Embedder>) -> Self {
		Self::new(embedder, config.dense_dir.clone(), config.table_name.clone())
	}

	pub fn location(&self) -> &Path { &self.location }
	pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

	/// Embed every chunk, write a fresh table next to the live one, then swap it in.
	/// On any failure the previous table stays on disk and stays queryable.
	pub async fn build(&self, chunks: &[Chunk]) -> Result<usize> {
		let _writer = self.writer.lock().await;
		let dim = self.dim()?;
		let vectors = self.embed_chunks(chunks).await?;

		let staging = sibling_path(&self.location, ".building");
		if staging.exists() {
			tokio::fs::remove_dir_all(&staging).await?;
		}
		if let Some(parent) = staging.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		{
			let conn = open_db(&staging).await?;
			create_chunk_table(&conn, &self.table_name, chunks, &vectors, dim).await?;
		}

		let mut state = self.state.write().await;
		let backup = swap_in(&staging, &self.location).await?;
		let opened = async {
			let conn = open_db(&self.location).await?;
			let table = conn.open_table(&self.table_name).execute().await.map_err(lance_err)?;
			Ok::<_, Error>((conn, table))
		}
		.await;
		match opened {
			Ok((conn, table)) => {
				*state = Some(DenseState { _conn: conn, table, rows: chunks.len() });
				discard_backup(backup).await;
			}
			Err(e) => {
				restore_backup(&self.location, backup).await;
				return Err(e);
			}
		}
		info!(chunks = chunks.len(), dim, location = %self.location.display(), "dense index built");
		Ok(chunks.len())
	}

	/// Open the table previously written by [`DenseIndex::build`].
	pub async fn load(&self) -> Result<()> {
		if !self.location.exists() {
			return Err(Error::IndexNotFound(self.location.clone()));
		}
		let conn = open_db(&self.location).await?;
		if !table_exists(&conn, &self.table_name).await? {
			return Err(Error::IndexCorrupt(format!(
				"table '{}' missing under {}",
				self.table_name,
				self.location.display()
			)));
		}
		let table = conn
			.open_table(&self.table_name)
			.execute()
			.await
			.map_err(|e| Error::IndexCorrupt(format!("cannot open table '{}': {e}", self.table_name)))?;
		let schema = table.schema().await.map_err(|e| Error::IndexCorrupt(format!("unreadable schema: {e}")))?;
		let missing = missing_columns(&schema);
		if !missing.is_empty() {
			return Err(Error::IndexCorrupt(format!("missing columns: {}", missing.join(", "))));
		}
		match vector_dim(&schema) {
			Some(d) if d == self.embedder.dim() => {}
			Some(d) => {
				return Err(Error::IndexCorrupt(format!(
					"stored vectors have {d} dimensions, embedder {} produces {}",
					self.embedder.embedder_id(),
					self.embedder.dim()
				)))
			}
			None => return Err(Error::IndexCorrupt(format!("{VECTOR_COLUMN} column is not a fixed-size list"))),
		}
		let rows = table.count_rows(None).await.map_err(|e| Error::IndexCorrupt(format!("cannot count rows: {e}")))?;
		*self.state.write().await = Some(DenseState { _conn: conn, table, rows });
		info!(rows, location = %self.location.display(), "dense index loaded");
		Ok(())
	}

	/// Embed and write chunks into a built or loaded index. A chunk whose id is
	/// already stored replaces the stored row.
	pub async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
		let _writer = self.writer.lock().await;
		if !self.is_ready().await {
			return Err(Error::IndexNotInitialized);
		}
		let dim = self.dim()?;
		let chunks = last_per_id(chunks);
		let vectors = self.embed_chunks(&chunks).await?;
		let mut guard = self.state.write().await;
		let state = guard.as_mut().ok_or(Error::IndexNotInitialized)?;
		let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
		delete_ids(&state.table, &ids).await?;
		append_chunks(&state.table, &chunks, &vectors, dim).await?;
		state.rows = state.table.count_rows(None).await.map_err(lance_err)?;
		info!(added = chunks.len(), rows = state.rows, "dense index updated");
		Ok(chunks.len())
	}

	pub async fn query(&self, query_text: &str, k: usize) -> Result<RankedList> {
		if k == 0 {
			return Err(Error::InvalidParameter("k must be positive".into()));
		}
		let guard = self.state.read().await;
		let state = guard.as_ref().ok_or(Error::IndexNotInitialized)?;
		if state.rows == 0 {
			return Ok(RankedList::new());
		}
		let embedder = Arc::clone(&self.embedder);
		let text = query_text.to_string();
		let query_vec = tokio::task::spawn_blocking(move || embed_checked(embedder.as_ref(), &[text]))
			.await
			.map_err(|e| Error::backend("tokio", e))??
			.pop()
			.ok_or_else(|| Error::Embedding(anyhow::anyhow!("embedder returned no query vector")))?;

		// Flat scan over every row so ties at the cut-off resolve by chunk id.
		let mut stream = state
			.table
			.vector_search(query_vec)
			.map_err(lance_err)?
			.column(VECTOR_COLUMN)
			.distance_type(DistanceType::Cosine)
			.limit(state.rows)
			.execute()
			.await
			.map_err(lance_err)?;
		let mut scored = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
			scored.extend(decode_hits(&batch)?);
		}
		debug!(query = query_text, candidates = scored.len(), k, "dense query");
		Ok(RankedList::from_scored(scored, k))
	}

	pub async fn is_ready(&self) -> bool { self.state.read().await.is_some() }

	pub async fn len(&self) -> usize { self.state.read().await.as_ref().map_or(0, |s| s.rows) }

	pub async fn is_empty(&self) -> bool { self.len().await == 0 }

	fn dim(&self) -> Result<i32> {
		i32::try_from(self.embedder.dim())
			.map_err(|_| Error::InvalidConfig(format!("embedding dimension {} too large", self.embedder.dim())))
	}

	async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
		let pb = ProgressBar::new(chunks.len() as u64);
		let style = ProgressStyle::default_bar()
			.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
			.map(|s| s.progress_chars("#>-"))
			.unwrap_or_else(|_| ProgressStyle::default_bar());
		pb.set_style(style);
		pb.set_message("embedding");

		let mut vectors = Vec::with_capacity(chunks.len());
		for batch in chunks.chunks(EMBED_BATCH) {
			let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
			let embedder = Arc::clone(&self.embedder);
			let embedded = tokio::task::spawn_blocking(move || embed_checked(embedder.as_ref(), &texts))
				.await
				.map_err(|e| Error::backend("tokio", e))?;
			match embedded {
				Ok(v) => vectors.extend(v),
				Err(e) => {
					pb.abandon_with_message("embedding failed");
					return Err(e);
				}
			}
			pb.inc(batch.len() as u64);
		}
		pb.finish_with_message("embedded");
		Ok(vectors)
	}
}

fn sibling_path(location: &Path, suffix: &str) -> PathBuf {
	let mut name = location.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(suffix);
	location.with_file_name(name)
}

/// Keep only the last chunk for each id, preserving first-seen order.
fn last_per_id(chunks: &[Chunk]) -> Vec<Chunk> {
	let mut slots: HashMap<&str, usize> = HashMap::new();
	let mut kept: Vec<Chunk> = Vec::with_capacity(chunks.len());
	for c in chunks {
		match slots.get(c.id.as_str()) {
			Some(&i) => kept[i] = c.clone(),
			None => {
				slots.insert(c.id.as_str(), kept.len());
				kept.push(c.clone());
			}
		}
	}
	kept
}

/// Move `staging` to `location`. The previous contents of `location`, if any,
/// are parked at a backup path which is returned. If the final rename fails
/// the backup is moved back before the error is returned.
async fn swap_in(staging: &Path, location: &Path) -> Result<Option<PathBuf>> {
	let backup = if location.exists() {
		let backup = sibling_path(location, ".previous");
		if backup.exists() {
			tokio::fs::remove_dir_all(&backup).await?;
		}
		tokio::fs::rename(location, &backup).await?;
		Some(backup)
	} else {
		None
	};
	if let Err(e) = tokio::fs::rename(staging, location).await {
		restore_backup(location, backup).await;
		return Err(e.into());
	}
	Ok(backup)
}

/// Put a parked directory back at `location`, dropping whatever is there now.
async fn restore_backup(location: &Path, backup: Option<PathBuf>) {
	if location.exists() {
		if let Err(e) = tokio::fs::remove_dir_all(location).await {
			warn!(error = %e, location = %location.display(), "cannot remove partial dense index");
		}
	}
	if let Some(backup) = backup {
		if let Err(e) = tokio::fs::rename(&backup, location).await {
			warn!(error = %e, backup = %backup.display(), "cannot restore previous dense index");
		}
	}
}

async fn discard_backup(backup: Option<PathBuf>) {
	if let Some(backup) = backup {
		if let Err(e) = tokio::fs::remove_dir_all(&backup).await {
			warn!(error = %e, backup = %backup.display(), "cannot remove previous dense index");
		}
	}
}

#[async_trait]
impl ChunkRetriever for DenseIndex {
	fn kind(&self) -> SourceKind { SourceKind::Dense }

	async fn is_ready(&self) -> bool { DenseIndex::is_ready(self).await }

	async fn retrieve(&self, query: &str, k: usize) -> Result<RankedList> { self.query(query, k).await }
}
