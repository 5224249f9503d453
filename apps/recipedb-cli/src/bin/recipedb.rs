use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recipedb_core::config::RagConfig;
use recipedb_core::store::DocumentStore;
use recipedb_core::types::{Category, Difficulty};
use recipedb_embed::embedder_from_config;
use recipedb_hybrid::{HybridRetriever, MetadataFilter};
use recipedb_text::LexicalIndex;
use recipedb_vector::DenseIndex;

#[derive(Parser)]
#[command(name = "recipedb", about = "Hybrid dense + BM25 retrieval over a recipe corpus")]
struct Cli {
    /// Override `data.data_dir`.
    #[arg(long, global = true, env = "RECIPEDB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest the corpus and (re)build both indexes.
    Build,
    /// Run a hybrid query against built indexes.
    Query {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Category label or directory key, e.g. 荤菜 or meat_dish.
        #[arg(long)]
        category: Option<String>,
        /// Difficulty label, e.g. 简单.
        #[arg(long)]
        difficulty: Option<String>,
        /// Also print the parent recipes of the hits.
        #[arg(long)]
        parents: bool,
    },
    /// Print corpus statistics as JSON.
    Stats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RECIPEDB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn load_config(cli: &Cli) -> Result<RagConfig> {
    let mut config = RagConfig::load().context("loading configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data.data_dir = dir.clone();
    }
    Ok(config.resolve_paths(&std::env::current_dir()?))
}

fn parse_filter(category: Option<&str>, difficulty: Option<&str>) -> Result<MetadataFilter> {
    let category = category
        .map(|c| Category::from_label(c).ok_or_else(|| anyhow!("unknown category '{c}', expected one of {:?}", Category::labels())))
        .transpose()?;
    let difficulty = difficulty
        .map(|d| {
            Difficulty::from_label(d).ok_or_else(|| anyhow!("unknown difficulty '{d}', expected one of {:?}", Difficulty::labels()))
        })
        .transpose()?;
    Ok(MetadataFilter { category, difficulty })
}

async fn build(config: &RagConfig) -> Result<()> {
    let store = DocumentStore::ingest(&config.data)?;
    let embedder = embedder_from_config(&config.embedding)?;
    let dense = DenseIndex::from_config(&config.index, embedder);
    dense.build(store.chunks()).await?;
    match &config.index.lexical_dir {
        Some(dir) => {
            LexicalIndex::new().build_in_dir(store.chunks(), dir)?;
        }
        None => info!("no lexical_dir configured; the lexical index is rebuilt in memory at query time"),
    }
    println!("Indexed {} chunks from {} recipes", store.chunks().len(), store.documents().len());
    Ok(())
}

fn open_lexical(config: &RagConfig) -> Result<LexicalIndex> {
    let lexical = LexicalIndex::new();
    match &config.index.lexical_dir {
        Some(dir) => lexical.open(dir)?,
        None => {
            let store = DocumentStore::ingest(&config.data)?;
            lexical.build(store.chunks())?;
        }
    }
    Ok(lexical)
}

async fn query(config: &RagConfig, text: &str, top_k: usize, filter: MetadataFilter, parents: bool) -> Result<()> {
    let embedder = embedder_from_config(&config.embedding)?;
    let dense = DenseIndex::from_config(&config.index, embedder);
    dense.load().await?;
    let lexical = open_lexical(config)?;
    let retriever = HybridRetriever::new(dense, lexical, config.retrieval.clone());

    let hits = retriever.search_filtered(text, &filter, top_k).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for hit in &hits {
        let m = &hit.chunk.metadata;
        println!(
            "{:>2}. [{:.5}] {} ({} / {}){}",
            hit.rank + 1,
            hit.score,
            m.name,
            m.category,
            m.difficulty,
            m.section.as_deref().map(|s| format!(" - {s}")).unwrap_or_default()
        );
        let preview: String = hit.chunk.content.chars().take(120).collect();
        println!("    {}", preview.replace('\n', " "));
    }
    if parents {
        let store = DocumentStore::ingest(&config.data)?;
        println!("\nRecipes:");
        for doc in store.parent_documents(hits.as_slice()) {
            println!("  - {} ({})", doc.metadata.name, doc.metadata.source);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    match &cli.command {
        Command::Build => build(&config).await,
        Command::Query { text, top_k, category, difficulty, parents } => {
            let filter = parse_filter(category.as_deref(), difficulty.as_deref())?;
            query(&config, text, top_k.unwrap_or(config.retrieval.top_k), filter, *parents).await
        }
        Command::Stats => {
            let store = DocumentStore::ingest(&config.data)?;
            println!("{}", serde_json::to_string_pretty(&store.statistics())?);
            Ok(())
        }
    }
}
