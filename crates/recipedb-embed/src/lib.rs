//! Embedding providers for recipedb.
//!
//! Model inference is outside this workspace; the bundled provider is a
//! deterministic feature-hashing embedder over the shared tokenizer, which
//! keeps indexes reproducible offline and in tests. Anything implementing
//! [`Embedder`] can be passed to the indexes instead.

use std::hash::Hasher;
use std::sync::Arc;

use tracing::info;
use twox_hash::XxHash64;

use recipedb_core::config::EmbeddingConfig;
use recipedb_core::text::tokenize;
pub use recipedb_core::traits::Embedder;
use recipedb_core::{Error, Result};

/// Hashes each token into one of `dim` buckets and L2-normalizes.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    /// A `dim` of zero is raised to one.
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hash:xxh64:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokenize(text) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 0.5 + ((h >> 32) as u32 as f32) / (u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if config.dimension == 0 {
        return Err(Error::InvalidConfig("embedding.dimension must be positive".into()));
    }
    match config.provider.as_str() {
        "hash" => {
            info!(dim = config.dimension, "using hashing embedder");
            Ok(Arc::new(HashEmbedder::new(config.dimension)))
        }
        other => Err(Error::InvalidConfig(format!("unknown embedding provider '{other}'"))),
    }
}
