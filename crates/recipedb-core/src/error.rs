use std::path::PathBuf;

use thiserror::Error;

/// Boxed source error from a storage engine (tantivy, lancedb, arrow).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Index not found at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Index not initialized: build or load it first")]
    IndexNotInitialized,

    #[error("Retriever not initialized: both indexes must be built or loaded before search")]
    RetrieverNotInitialized,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding provider failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("{engine} error: {source}")]
    Backend {
        engine: &'static str,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn backend<E>(engine: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Backend { engine, source: source.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
