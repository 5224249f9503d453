//! recipedb-hybrid
//!
//! Runs the dense and lexical indexes side by side and fuses their rankings
//! with RRF.
pub mod fusion;

use tracing::{debug, info};

use recipedb_core::config::RetrievalConfig;
use recipedb_core::traits::ChunkRetriever;
use recipedb_core::types::{Category, Chunk, Difficulty, RankedList};
use recipedb_core::{Error, Result};
use recipedb_text::LexicalIndex;
use recipedb_vector::DenseIndex;

pub use fusion::{fuse, fuse_with_trace, FusionTrace, TracedChunk};

/// Equality filter on chunk metadata. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool { self.category.is_none() && self.difficulty.is_none() }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.category.map_or(true, |c| chunk.metadata.category == c)
            && self.difficulty.map_or(true, |d| chunk.metadata.difficulty == d)
    }
}

pub struct HybridRetriever<D, L>
where
    D: ChunkRetriever,
    L: ChunkRetriever,
{
    dense: D,
    lexical: L,
    config: RetrievalConfig,
}

impl<D, L> HybridRetriever<D, L>
where
    D: ChunkRetriever,
    L: ChunkRetriever,
{
    pub fn new(dense: D, lexical: L, config: RetrievalConfig) -> Self { Self { dense, lexical, config } }

    pub fn dense(&self) -> &D { &self.dense }
    pub fn lexical(&self) -> &L { &self.lexical }
    pub fn config(&self) -> &RetrievalConfig { &self.config }

    pub async fn is_ready(&self) -> bool { self.dense.is_ready().await && self.lexical.is_ready().await }

    /// Query both indexes concurrently and fuse the two candidate lists.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<RankedList> {
        if top_k == 0 {
            return Err(Error::InvalidParameter("top_k must be positive".into()));
        }
        let pool = self.config.candidate_pool(top_k);
        let (dense, lexical) = self.candidates(query, pool).await?;
        let fused = fuse(&dense, &lexical, self.config.rrf_k, top_k)?;
        info!(query, dense = dense.len(), lexical = lexical.len(), returned = fused.len(), "hybrid search");
        Ok(fused)
    }

    pub async fn search_default(&self, query: &str) -> Result<RankedList> { self.search(query, self.config.top_k).await }

    /// Hybrid search restricted to chunks matching `filter`. Over-fetches
    /// candidates so filtering still leaves enough hits, then re-ranks.
    pub async fn search_filtered(&self, query: &str, filter: &MetadataFilter, top_k: usize) -> Result<RankedList> {
        if filter.is_empty() {
            return self.search(query, top_k).await;
        }
        if top_k == 0 {
            return Err(Error::InvalidParameter("top_k must be positive".into()));
        }
        let pool = self.config.candidate_pool(top_k).saturating_mul(self.config.filter_overfetch.max(1));
        let (dense, lexical) = self.candidates(query, pool).await?;
        let fused = fuse(&dense, &lexical, self.config.rrf_k, (dense.len() + lexical.len()).max(1))?;
        let total = fused.len();
        let kept: Vec<(Chunk, f64)> = fused
            .into_iter()
            .filter(|r| filter.matches(&r.chunk))
            .take(top_k)
            .map(|r| (r.chunk, r.score))
            .collect();
        info!(query, ?filter, fused = total, returned = kept.len(), "filtered hybrid search");
        Ok(RankedList::from_ordered(kept))
    }

    async fn candidates(&self, query: &str, pool: usize) -> Result<(RankedList, RankedList)> {
        if !self.is_ready().await {
            return Err(Error::RetrieverNotInitialized);
        }
        debug!(query, pool, "dispatching sub-queries");
        tokio::try_join!(self.dense.retrieve(query, pool), self.lexical.retrieve(query, pool))
    }
}

impl HybridRetriever<DenseIndex, LexicalIndex> {
    /// Add chunks to both indexes, replacing any chunk whose id is already
    /// indexed. The dense side embeds first, so an embedding failure leaves
    /// both indexes unchanged. A lexical failure after the dense write leaves
    /// the dense index ahead of the lexical one until the next full build.
    pub async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        if !self.is_ready().await {
            return Err(Error::RetrieverNotInitialized);
        }
        let added = self.dense.add(chunks).await?;
        self.lexical.add(chunks)?;
        info!(added, "chunks added to both indexes");
        Ok(added)
    }
}
