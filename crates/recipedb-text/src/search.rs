use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Searcher, TantivyDocument, Term};
use tracing::debug;

use recipedb_core::text::tokenize;
use recipedb_core::types::{Chunk, RankedList};
use recipedb_core::{Error, Result};

use crate::tantivy_utils::{tantivy_err, ChunkFields};

/// Point-in-time view of the index; cheap to clone and safe to move to a blocking thread.
#[derive(Clone)]
pub struct SearchSnapshot {
	pub(crate) searcher: Searcher,
	pub(crate) fields: ChunkFields,
}

/// BM25 over the OR of all query tokens. Every matching chunk is scored so
/// that ties at the cut-off are resolved by chunk id, not by segment order.
pub fn search(snapshot: &SearchSnapshot, query_text: &str, k: usize) -> Result<RankedList> {
	if k == 0 {
		return Err(Error::InvalidParameter("k must be positive".into()));
	}
	let tokens = tokenize(query_text);
	if tokens.is_empty() {
		debug!(query = query_text, "query has no indexable tokens");
		return Ok(RankedList::new());
	}
	let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
		.iter()
		.map(|tok| {
			let term = Term::from_field_text(snapshot.fields.terms, tok);
			(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
		})
		.collect();
	let query = BooleanQuery::new(clauses);

	let searcher = &snapshot.searcher;
	let total = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
	if total == 0 {
		return Ok(RankedList::new());
	}
	let top_docs = searcher.search(&query, &TopDocs::with_limit(total)).map_err(tantivy_err)?;
	let mut scored = Vec::with_capacity(top_docs.len());
	for (score, addr) in top_docs {
		let doc: TantivyDocument = searcher.doc(addr).map_err(tantivy_err)?;
		scored.push((decode_chunk(&doc, snapshot.fields)?, f64::from(score)));
	}
	debug!(query = query_text, matches = scored.len(), k, "lexical query");
	Ok(RankedList::from_scored(scored, k))
}

pub(crate) fn decode_chunk(doc: &TantivyDocument, fields: ChunkFields) -> Result<Chunk> {
	let payload = doc
		.get_first(fields.payload)
		.and_then(|v| v.as_str())
		.ok_or_else(|| Error::IndexCorrupt("lexical entry has no stored payload".into()))?;
	serde_json::from_str(payload).map_err(|e| Error::IndexCorrupt(format!("lexical payload unreadable: {e}")))
}
