use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};
use tracing::{info, warn};

use recipedb_core::text::tokenize_to_string;
use recipedb_core::traits::ChunkRetriever;
use recipedb_core::types::{Chunk, RankedList, SourceKind};
use recipedb_core::{Error, Result};

use crate::search::{search, SearchSnapshot};
use crate::tantivy_utils::{build_schema, register_tokenizer, tantivy_err, ChunkFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct LexicalState {
	index: Index,
	reader: IndexReader,
	fields: ChunkFields,
	location: Option<PathBuf>,
}

impl LexicalState {
	fn open(index: Index, location: Option<PathBuf>) -> Result<Self> {
		register_tokenizer(&index);
		let fields = ChunkFields::resolve(&index.schema())?;
		let reader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(tantivy_err)?;
		Ok(Self { index, reader, fields, location })
	}

	/// Upsert `chunks` by id and return the number of distinct ids written.
	fn write(&self, chunks: &[Chunk]) -> Result<usize> {
		let mut writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES).map_err(tantivy_err)?;
		let mut distinct = HashSet::new();
		for c in chunks {
			writer.delete_term(Term::from_field_text(self.fields.id, c.id.as_str()));
			distinct.insert(c.id.as_str());
			let payload = serde_json::to_string(c).map_err(|e| Error::backend("serde_json", e))?;
			writer
				.add_document(doc!(
					self.fields.id => c.id.as_str(),
					self.fields.terms => tokenize_to_string(&c.content),
					self.fields.payload => payload,
				))
				.map_err(tantivy_err)?;
		}
		writer.commit().map_err(tantivy_err)?;
		self.reader.reload().map_err(tantivy_err)?;
		Ok(distinct.len())
	}

	fn snapshot(&self) -> SearchSnapshot {
		SearchSnapshot { searcher: self.reader.searcher(), fields: self.fields }
	}
}

/// BM25 keyword index over chunk text.
///
/// Builds construct a complete new index before swapping it in, so readers
/// only ever see a finished build. One writer at a time; reads are concurrent.
#[derive(Default)]
pub struct LexicalIndex {
	state: RwLock<Option<LexicalState>>,
}

impl LexicalIndex {
	pub fn new() -> Self { Self::default() }

	/// Build an in-memory index, replacing any previous one.
	pub fn build(&self, chunks: &[Chunk]) -> Result<usize> {
		let state = LexicalState::open(Index::create_in_ram(build_schema()), None)?;
		let written = state.write(chunks)?;
		*self.state.write() = Some(state);
		info!(chunks = written, "lexical index built in memory");
		Ok(written)
	}

	/// Build a persistent index at `dir`. The index is written to a staging
	/// directory first and moved into place once committed.
	pub fn build_in_dir(&self, chunks: &[Chunk], dir: &Path) -> Result<usize> {
		let staging = sibling_path(dir, ".building");
		if staging.exists() {
			fs::remove_dir_all(&staging)?;
		}
		fs::create_dir_all(&staging)?;
		let written = {
			let index = Index::create_in_dir(&staging, build_schema()).map_err(tantivy_err)?;
			LexicalState::open(index, None)?.write(chunks)?
		};
		let mut guard = self.state.write();
		let backup = sibling_path(dir, ".previous");
		if backup.exists() {
			fs::remove_dir_all(&backup)?;
		}
		let had_live = dir.exists();
		if had_live {
			fs::rename(dir, &backup)?;
		}
		let opened = fs::rename(&staging, dir)
			.map_err(Error::from)
			.and_then(|_| Index::open_in_dir(dir).map_err(tantivy_err))
			.and_then(|index| LexicalState::open(index, Some(dir.to_path_buf())));
		match opened {
			Ok(state) => {
				*guard = Some(state);
				if had_live {
					if let Err(e) = fs::remove_dir_all(&backup) {
						warn!(error = %e, backup = %backup.display(), "cannot remove previous lexical index");
					}
				}
			}
			Err(e) => {
				if dir.exists() {
					let _ = fs::remove_dir_all(dir);
				}
				if had_live {
					if let Err(restore) = fs::rename(&backup, dir) {
						warn!(error = %restore, backup = %backup.display(), "cannot restore previous lexical index");
					}
				}
				return Err(e);
			}
		}
		info!(chunks = written, dir = %dir.display(), "lexical index built");
		Ok(written)
	}

	/// Open an index previously written by [`LexicalIndex::build_in_dir`].
	pub fn open(&self, dir: &Path) -> Result<()> {
		if !dir.exists() {
			return Err(Error::IndexNotFound(dir.to_path_buf()));
		}
		let index = Index::open_in_dir(dir)
			.map_err(|e| Error::IndexCorrupt(format!("cannot open lexical index at {}: {e}", dir.display())))?;
		let state = LexicalState::open(index, Some(dir.to_path_buf()))?;
		let docs = state.reader.searcher().num_docs();
		*self.state.write() = Some(state);
		info!(docs, dir = %dir.display(), "lexical index loaded");
		Ok(())
	}

	/// Add chunks to a built or opened index. A chunk whose id is already
	/// indexed replaces the indexed copy.
	pub fn add(&self, chunks: &[Chunk]) -> Result<usize> {
		let guard = self.state.write();
		let state = guard.as_ref().ok_or(Error::IndexNotInitialized)?;
		let written = state.write(chunks)?;
		info!(added = written, "lexical index updated");
		Ok(written)
	}

	pub fn query(&self, query_text: &str, k: usize) -> Result<RankedList> {
		search(&self.snapshot()?, query_text, k)
	}

	pub fn is_ready(&self) -> bool { self.state.read().is_some() }

	pub fn len(&self) -> usize {
		self.state
			.read()
			.as_ref()
			.map_or(0, |s| usize::try_from(s.reader.searcher().num_docs()).unwrap_or(usize::MAX))
	}

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	pub fn location(&self) -> Option<PathBuf> {
		self.state.read().as_ref().and_then(|s| s.location.clone())
	}

	fn snapshot(&self) -> Result<SearchSnapshot> {
		self.state.read().as_ref().map(LexicalState::snapshot).ok_or(Error::IndexNotInitialized)
	}
}

fn sibling_path(dir: &Path, suffix: &str) -> PathBuf {
	let mut name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(suffix);
	dir.with_file_name(name)
}

#[async_trait]
impl ChunkRetriever for LexicalIndex {
	fn kind(&self) -> SourceKind { SourceKind::Lexical }

	async fn is_ready(&self) -> bool { LexicalIndex::is_ready(self) }

	async fn retrieve(&self, query: &str, k: usize) -> Result<RankedList> {
		let snapshot = self.snapshot()?;
		let query = query.to_string();
		tokio::task::spawn_blocking(move || search(&snapshot, &query, k))
			.await
			.map_err(|e| Error::backend("tokio", e))?
	}
}
