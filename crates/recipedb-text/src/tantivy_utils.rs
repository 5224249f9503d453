use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

use recipedb_core::{Error, Result};

/// Analyzer for the `terms` field. Text is pre-tokenized by
/// `recipedb_core::text::tokenize`, so splitting on whitespace is enough.
pub const TERMS_TOKENIZER: &str = "recipedb_pretokenized";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	let terms_indexing = TextFieldIndexing::default()
		.set_tokenizer(TERMS_TOKENIZER)
		.set_index_option(IndexRecordOption::WithFreqs);
	schema_builder.add_text_field("terms", TextOptions::default().set_indexing_options(terms_indexing));
	schema_builder.add_text_field("payload", STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let analyzer = TextAnalyzer::builder(WhitespaceTokenizer::default()).filter(LowerCaser).build();
	index.tokenizers().register(TERMS_TOKENIZER, analyzer);
}

/// Field handles resolved once per index.
#[derive(Debug, Clone, Copy)]
pub struct ChunkFields {
	pub id: Field,
	pub terms: Field,
	pub payload: Field,
}

impl ChunkFields {
	pub fn resolve(schema: &Schema) -> Result<Self> {
		let get = |name: &str| {
			schema
				.get_field(name)
				.map_err(|_| Error::IndexCorrupt(format!("lexical index is missing field '{name}'")))
		};
		Ok(Self { id: get("id")?, terms: get("terms")?, payload: get("payload")? })
	}
}

pub(crate) fn tantivy_err(e: tantivy::TantivyError) -> Error { Error::backend("tantivy", e) }
