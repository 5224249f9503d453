//! Typed configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__TOP_K=5`). The resulting [`RagConfig`] is passed into
//! each component's constructor; nothing reads configuration globally.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root directory of the recipe corpus.
    pub data_dir: PathBuf,
    /// File extensions (without dot) eligible for ingestion.
    pub extensions: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./data"), extensions: vec!["md".to_string()] }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dense_dir: PathBuf,
    /// When unset the lexical index lives in memory and is rebuilt from the corpus.
    pub lexical_dir: Option<PathBuf>,
    pub table_name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dense_dir: PathBuf::from("./index/dense"),
            lexical_dir: Some(PathBuf::from("./index/lexical")),
            table_name: "chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name understood by `recipedb-embed` (currently `hash`).
    pub provider: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self { Self { provider: "hash".to_string(), dimension: 512 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results returned by `search_default`.
    pub top_k: usize,
    /// RRF smoothing constant; must be positive.
    pub rrf_k: i64,
    /// Lower bound on candidates requested from each sub-index.
    pub min_candidates: usize,
    /// Candidates requested per sub-index = `top_k * candidate_multiplier`, floored at `min_candidates`.
    pub candidate_multiplier: usize,
    /// Extra candidate factor for metadata-filtered search.
    pub filter_overfetch: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3, rrf_k: 60, min_candidates: 5, candidate_multiplier: 1, filter_overfetch: 3 }
    }
}

impl RetrievalConfig {
    pub fn candidate_pool(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.candidate_multiplier.max(1)).max(self.min_candidates).max(top_k)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub data: DataConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
}

impl RagConfig {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::from_figment(Self::figment_for_env(&env_name))
    }

    pub fn figment_for_env(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: RagConfig = figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.extensions.is_empty() {
            return Err(Error::InvalidConfig("data.extensions must not be empty".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be positive".into()));
        }
        let r = &self.retrieval;
        if r.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be positive".into()));
        }
        if r.rrf_k <= 0 {
            return Err(Error::InvalidConfig(format!("retrieval.rrf_k must be positive, got {}", r.rrf_k)));
        }
        if r.min_candidates == 0 || r.candidate_multiplier == 0 || r.filter_overfetch == 0 {
            return Err(Error::InvalidConfig(
                "retrieval.min_candidates, candidate_multiplier and filter_overfetch must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Rewrites every configured path through [`resolve_with_base`].
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        self.data.data_dir = resolve_with_base(base, self.data.data_dir.to_string_lossy());
        self.index.dense_dir = resolve_with_base(base, self.index.dense_dir.to_string_lossy());
        self.index.lexical_dir = self.index.lexical_dir.map(|p| resolve_with_base(base, p.to_string_lossy()));
        self
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
