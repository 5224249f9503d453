use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{RankedList, SourceKind};

/// Opaque text → vector function. Must be deterministic for a given
/// `embedder_id`, and an index must be queried with the same provider it
/// was built with.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `hash:xxh64:d512`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for query"))
    }
}

/// Embed `texts` and check that the provider honoured its own contract.
pub fn embed_checked(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let vectors = embedder.embed_batch(texts).map_err(Error::Embedding)?;
    if vectors.len() != texts.len() {
        return Err(Error::Embedding(anyhow::anyhow!(
            "embedder returned {} vectors for {} inputs",
            vectors.len(),
            texts.len()
        )));
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != embedder.dim()) {
        return Err(Error::Embedding(anyhow::anyhow!(
            "dim mismatch: got {} expected {}",
            v.len(),
            embedder.dim()
        )));
    }
    Ok(vectors)
}

/// Shared capability of the dense and lexical indexes as seen by the
/// orchestrator.
#[async_trait]
pub trait ChunkRetriever: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// True once a build or load has completed.
    async fn is_ready(&self) -> bool;

    async fn retrieve(&self, query: &str, k: usize) -> Result<RankedList>;
}
