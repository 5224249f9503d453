//! Parent/child document store built at ingestion time.
//!
//! Each source file becomes one [`Document`]; each document is split into
//! [`Chunk`]s along markdown headings. The chunk → parent mapping is kept
//! alongside so retrieved chunks can be traced back to their recipe.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::chunker::split_markdown;
use crate::config::DataConfig;
use crate::error::{Error, Result};
use crate::types::{
    Category, Chunk, ChunkId, ChunkMetadata, Difficulty, Document, DocumentId, DocumentMetadata, RankedChunk,
};

#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    documents: Vec<Document>,
    chunks: Vec<Chunk>,
    parent_child_map: HashMap<ChunkId, DocumentId>,
    doc_slots: HashMap<DocumentId, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub categories: BTreeMap<String, usize>,
    pub difficulties: BTreeMap<String, usize>,
    pub avg_chunk_chars: f64,
}

impl DocumentStore {
    /// Load every eligible file under `config.data_dir` and chunk it.
    pub fn ingest(config: &DataConfig) -> Result<Self> {
        let root = &config.data_dir;
        if !root.is_dir() {
            return Err(Error::Ingestion(format!("source path does not exist: {}", root.display())));
        }
        info!(data_dir = %root.display(), "loading documents");
        let files = list_source_files(root, &config.extensions);
        if files.is_empty() {
            return Err(Error::Ingestion(format!(
                "no eligible files ({}) under {}",
                config.extensions.join(", "),
                root.display()
            )));
        }
        let mut documents = Vec::with_capacity(files.len());
        for path in &files {
            let content = read_file_content(path)?;
            documents.push(build_document(root, path, content));
        }
        let store = Self::from_documents(documents);
        info!(documents = store.documents.len(), chunks = store.chunks.len(), "ingestion complete");
        Ok(store)
    }

    /// Chunk already-constructed documents.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let mut store = Self::default();
        for doc in documents {
            let chunks = chunk_document(&doc);
            debug!(doc = %doc.metadata.name, chunks = chunks.len(), "chunked document");
            for chunk in chunks {
                store.parent_child_map.insert(chunk.id.clone(), chunk.parent_id.clone());
                store.chunks.push(chunk);
            }
            store.doc_slots.insert(doc.id.clone(), store.documents.len());
            store.documents.push(doc);
        }
        store
    }

    pub fn documents(&self) -> &[Document] { &self.documents }
    pub fn chunks(&self) -> &[Chunk] { &self.chunks }
    pub fn parent_child_map(&self) -> &HashMap<ChunkId, DocumentId> { &self.parent_child_map }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.doc_slots.get(id).map(|&slot| &self.documents[slot])
    }

    pub fn parent_of(&self, chunk_id: &ChunkId) -> Option<&Document> {
        self.parent_child_map.get(chunk_id).and_then(|pid| self.document(pid))
    }

    pub fn children_of(&self, doc_id: &DocumentId) -> Vec<&Chunk> {
        self.chunks.iter().filter(|c| &c.parent_id == doc_id).collect()
    }

    /// Parents of retrieved chunks, most-hit first; ties keep first-appearance order.
    pub fn parent_documents(&self, hits: &[RankedChunk]) -> Vec<&Document> {
        let mut order: Vec<(&DocumentId, usize)> = Vec::new();
        for hit in hits {
            match order.iter_mut().find(|(id, _)| **id == hit.chunk.parent_id) {
                Some((_, count)) => *count += 1,
                None => order.push((&hit.chunk.parent_id, 1)),
            }
        }
        order.sort_by(|a, b| b.1.cmp(&a.1));
        order.into_iter().filter_map(|(id, _)| self.document(id)).collect()
    }

    pub fn statistics(&self) -> CorpusStats {
        let mut categories = BTreeMap::new();
        let mut difficulties = BTreeMap::new();
        for doc in &self.documents {
            *categories.entry(doc.metadata.category.label().to_string()).or_insert(0) += 1;
            *difficulties.entry(doc.metadata.difficulty.label().to_string()).or_insert(0) += 1;
        }
        let total_chars: usize = self.chunks.iter().map(|c| c.content.chars().count()).sum();
        let avg_chunk_chars = if self.chunks.is_empty() { 0.0 } else { total_chars as f64 / self.chunks.len() as f64 };
        CorpusStats {
            total_documents: self.documents.len(),
            total_chunks: self.chunks.len(),
            categories,
            difficulties,
            avg_chunk_chars,
        }
    }
}

/// Build a parent document for `path`, which must live under `data_root`.
pub fn build_document(data_root: &Path, path: &Path, content: String) -> Document {
    let relative = path.strip_prefix(data_root).unwrap_or(path);
    let id = DocumentId::from_relative_path(&normalize_relative_path(relative));
    let name = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let metadata = DocumentMetadata {
        source: path.to_string_lossy().to_string(),
        category: Category::from_path(relative),
        name,
        difficulty: Difficulty::from_content(&content),
    };
    Document { id, content, metadata }
}

/// Forward-slash form of a relative path, without `.` components.
pub fn normalize_relative_path(path: &Path) -> String {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn chunk_document(doc: &Document) -> Vec<Chunk> {
    let sections = split_markdown(&doc.content);
    let total_chunks = sections.len();
    sections
        .into_iter()
        .enumerate()
        .map(|(chunk_index, section)| Chunk {
            id: ChunkId::derive(&doc.id, chunk_index, &section.content),
            parent_id: doc.id.clone(),
            metadata: ChunkMetadata {
                source: doc.metadata.source.clone(),
                category: doc.metadata.category,
                name: doc.metadata.name.clone(),
                difficulty: doc.metadata.difficulty,
                section: section.heading_path,
                chunk_index,
                total_chunks,
                final_score: None,
            },
            content: section.content,
        })
        .collect()
}

fn read_file_content(file_path: &Path) -> Result<String> {
    let bytes = fs::read(file_path)?;
    match String::from_utf8(bytes) {
        Ok(content) => Ok(content),
        Err(e) => {
            warn!(path = %file_path.display(), "file is not valid UTF-8, decoding lossily");
            Ok(String::from_utf8_lossy(e.as_bytes()).to_string())
        }
    }
}

fn list_source_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        })
        .collect();
    files.sort();
    files
}
