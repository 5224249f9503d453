use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use recipedb_core::store::{build_document, DocumentStore};
use recipedb_core::traits::{ChunkRetriever, Embedder};
use recipedb_core::types::{Chunk, SourceKind};
use recipedb_core::Error;
use recipedb_embed::HashEmbedder;
use recipedb_vector::DenseIndex;

fn corpus() -> Vec<Chunk> {
    let root = Path::new("/recipes");
    let docs = vec![
        build_document(root, &root.join("meat_dish/braised_pork.md"), "# 红烧肉\n\n五花肉 冰糖 酱油 红烧\n".into()),
        build_document(root, &root.join("vegetable_dish/tomato_egg.md"), "# 番茄炒蛋\n\n番茄 鸡蛋 盐\n".into()),
        build_document(root, &root.join("soup/tofu_soup.md"), "# 豆腐汤\n\n豆腐 清水 葱花\n".into()),
    ];
    DocumentStore::from_documents(docs).chunks().to_vec()
}

fn embedder(dim: usize) -> Arc<dyn Embedder> { Arc::new(HashEmbedder::new(dim)) }

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embedder_id(&self) -> &str { "failing" }
    fn dim(&self) -> usize { 16 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { anyhow::bail!("model offline") }
}

/// Hashing embedder that can be switched off to simulate a provider outage.
struct SwitchableEmbedder {
    inner: HashEmbedder,
    offline: AtomicBool,
}

impl Embedder for SwitchableEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("model offline");
        }
        self.inner.embed_batch(texts)
    }
}

#[tokio::test]
async fn build_then_query_ranks_the_closest_chunk_first() {
    let tmp = TempDir::new().unwrap();
    let index = DenseIndex::new(embedder(64), tmp.path().join("dense"), "chunks");
    assert!(!index.is_ready().await);
    assert_eq!(index.build(&corpus()).await.expect("build"), 3);
    assert!(index.is_ready().await);
    assert_eq!(index.len().await, 3);
    assert!(!tmp.path().join("dense.building").exists());

    let hits = index.query("番茄炒蛋", 2).await.expect("query");
    assert_eq!(hits.len(), 2);
    let top = hits.get(0).unwrap();
    assert_eq!(top.rank, 0);
    assert_eq!(top.chunk.metadata.name, "tomato_egg");
    assert!(top.score > 0.0 && top.score <= 1.0 + 1e-6);
    assert!(hits.get(0).unwrap().score >= hits.get(1).unwrap().score);
}

#[tokio::test]
async fn query_before_build_is_not_initialized() {
    let tmp = TempDir::new().unwrap();
    let index = DenseIndex::new(embedder(32), tmp.path().join("dense"), "chunks");
    assert!(matches!(index.query("豆腐", 3).await, Err(Error::IndexNotInitialized)));
    assert!(matches!(index.add(&corpus()).await, Err(Error::IndexNotInitialized)));
}

#[tokio::test]
async fn zero_k_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let index = DenseIndex::new(embedder(32), tmp.path().join("dense"), "chunks");
    index.build(&corpus()).await.expect("build");
    assert!(matches!(index.query("豆腐", 0).await, Err(Error::InvalidParameter(_))));
}

#[tokio::test]
async fn load_restores_a_built_index() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("dense");
    let built = DenseIndex::new(embedder(32), &location, "chunks");
    built.build(&corpus()).await.expect("build");
    let before = built.query("豆腐汤", 3).await.expect("query");

    let loaded = DenseIndex::new(embedder(32), &location, "chunks");
    loaded.load().await.expect("load");
    assert_eq!(loaded.len().await, 3);
    let after = loaded.query("豆腐汤", 3).await.expect("query");
    assert_eq!(before.ids(), after.ids());
    assert_eq!(after.get(0).unwrap().chunk.metadata.name, "tofu_soup");
}

#[tokio::test]
async fn load_reports_missing_and_mismatched_indexes() {
    let tmp = TempDir::new().unwrap();
    let missing = DenseIndex::new(embedder(32), tmp.path().join("absent"), "chunks");
    assert!(matches!(missing.load().await, Err(Error::IndexNotFound(_))));

    let location = tmp.path().join("dense");
    DenseIndex::new(embedder(32), &location, "chunks").build(&corpus()).await.expect("build");

    let wrong_dim = DenseIndex::new(embedder(48), &location, "chunks");
    assert!(matches!(wrong_dim.load().await, Err(Error::IndexCorrupt(_))));
    assert!(!wrong_dim.is_ready().await);

    let wrong_table = DenseIndex::new(embedder(32), &location, "other");
    assert!(matches!(wrong_table.load().await, Err(Error::IndexCorrupt(_))));
}

#[tokio::test]
async fn failed_embedding_leaves_previous_index_untouched() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("dense");
    let index = DenseIndex::new(Arc::new(FailingEmbedder), &location, "chunks");
    let err = index.build(&corpus()).await.expect_err("must fail");
    assert!(matches!(err, Error::Embedding(_)));
    assert!(!index.is_ready().await);
    assert!(!location.exists());
}

#[tokio::test]
async fn add_appends_and_rebuild_replaces() {
    let tmp = TempDir::new().unwrap();
    let mut chunks = corpus();
    let extra = chunks.split_off(2);
    let index = DenseIndex::new(embedder(32), tmp.path().join("dense"), "chunks");
    index.build(&chunks).await.expect("build");
    assert_eq!(index.add(&extra).await.expect("add"), 1);
    assert_eq!(index.len().await, 3);
    let hits = index.query("豆腐汤", 3).await.expect("query");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits.get(0).unwrap().chunk.metadata.name, "tofu_soup");

    index.build(&extra).await.expect("rebuild");
    assert_eq!(index.len().await, 1);
    assert_eq!(index.query("红烧肉", 3).await.expect("query").len(), 1);
}

#[tokio::test]
async fn empty_build_is_ready_and_returns_nothing() {
    let tmp = TempDir::new().unwrap();
    let index = DenseIndex::new(embedder(16), tmp.path().join("dense"), "chunks");
    assert_eq!(index.build(&[]).await.expect("build"), 0);
    assert!(index.is_ready().await);
    assert!(index.query("anything", 3).await.expect("query").is_empty());
}

#[tokio::test]
async fn retriever_trait_delegates_to_query() {
    let tmp = TempDir::new().unwrap();
    let index = DenseIndex::new(embedder(32), tmp.path().join("dense"), "chunks");
    index.build(&corpus()).await.expect("build");
    let retriever: &dyn ChunkRetriever = &index;
    assert_eq!(retriever.kind(), SourceKind::Dense);
    assert!(retriever.is_ready().await);
    assert_eq!(retriever.retrieve("红烧肉", 1).await.expect("retrieve").len(), 1);
}

#[tokio::test]
async fn failed_rebuild_keeps_the_previous_index_serving() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("dense");
    let provider = Arc::new(SwitchableEmbedder { inner: HashEmbedder::new(32), offline: AtomicBool::new(false) });
    let index = DenseIndex::new(provider.clone(), &location, "chunks");
    index.build(&corpus()).await.expect("build");
    let before = index.query("豆腐汤", 3).await.expect("query");

    provider.offline.store(true, Ordering::SeqCst);
    let err = index.build(&corpus()[..1]).await.expect_err("rebuild must fail");
    assert!(matches!(err, Error::Embedding(_)));
    provider.offline.store(false, Ordering::SeqCst);

    assert!(index.is_ready().await);
    assert_eq!(index.len().await, 3);
    let after = index.query("豆腐汤", 3).await.expect("query");
    assert_eq!(after.ids(), before.ids());
    assert!(!tmp.path().join("dense.building").exists());
    assert!(!tmp.path().join("dense.previous").exists());

    let reopened = DenseIndex::new(embedder(32), &location, "chunks");
    reopened.load().await.expect("load");
    assert_eq!(reopened.len().await, 3);
}

#[tokio::test]
async fn successful_rebuild_leaves_no_backup_behind() {
    let tmp = TempDir::new().unwrap();
    let index = DenseIndex::new(embedder(32), tmp.path().join("dense"), "chunks");
    index.build(&corpus()).await.expect("build");
    index.build(&corpus()).await.expect("rebuild");
    assert_eq!(index.len().await, 3);
    assert!(!tmp.path().join("dense.previous").exists());
}

#[tokio::test]
async fn re_adding_chunks_replaces_instead_of_duplicating() {
    let tmp = TempDir::new().unwrap();
    let chunks = corpus();
    let index = DenseIndex::new(embedder(32), tmp.path().join("dense"), "chunks");
    index.build(&chunks).await.expect("build");

    assert_eq!(index.add(&chunks).await.expect("re-add"), 3);
    assert_eq!(index.len().await, 3);
    let hits = index.query("豆腐汤", 10).await.expect("query");
    assert_eq!(hits.len(), 3);

    let mut repeated = chunks[2].clone();
    repeated.content = "豆腐 清水 葱花 香油".into();
    assert_eq!(index.add(&[chunks[2].clone(), repeated]).await.expect("add"), 1);
    assert_eq!(index.len().await, 3);
    let stored = index.query("香油", 10).await.expect("query");
    let tofu = stored.iter().find(|r| r.chunk.id == chunks[2].id).expect("tofu chunk");
    assert!(tofu.chunk.content.contains("香油"));
}

#[tokio::test]
async fn identical_chunks_tie_and_order_by_chunk_id() {
    let tmp = TempDir::new().unwrap();
    let root = Path::new("/recipes");
    let text = "# 豆腐\n\n豆腐 清水\n";
    let docs = vec![
        build_document(root, &root.join("soup/tofu_b.md"), text.into()),
        build_document(root, &root.join("soup/tofu_a.md"), text.into()),
        build_document(root, &root.join("soup/tofu_c.md"), text.into()),
    ];
    let chunks = DocumentStore::from_documents(docs).chunks().to_vec();
    let index = DenseIndex::new(embedder(32), tmp.path().join("dense"), "chunks");
    index.build(&chunks).await.expect("build");

    let hits = index.query("豆腐 清水", 3).await.expect("query");
    assert_eq!(hits.len(), 3);
    let scores: Vec<f64> = hits.iter().map(|r| r.score).collect();
    assert!(scores.windows(2).all(|w| w[0] == w[1]), "identical content scores equally: {scores:?}");
    let ids: Vec<String> = hits.iter().map(|r| r.chunk.id.to_string()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    let top = index.query("豆腐 清水", 1).await.expect("query");
    assert_eq!(top.get(0).unwrap().chunk.id.to_string(), sorted[0]);
}

/// Records the thread each embedding call ran on.
struct ThreadRecordingEmbedder {
    inner: HashEmbedder,
    threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
}

impl Embedder for ThreadRecordingEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.threads.lock().unwrap().push(std::thread::current().id());
        self.inner.embed_batch(texts)
    }
}

#[tokio::test]
async fn embedding_runs_off_the_async_runtime_thread() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ThreadRecordingEmbedder { inner: HashEmbedder::new(32), threads: Default::default() });
    let index = DenseIndex::new(provider.clone(), tmp.path().join("dense"), "chunks");
    index.build(&corpus()).await.expect("build");
    index.query("豆腐汤", 3).await.expect("query");

    let runtime_thread = std::thread::current().id();
    let threads = provider.threads.lock().unwrap();
    assert_eq!(threads.len(), 2, "one batch for the build and one for the query");
    assert!(threads.iter().all(|t| *t != runtime_thread));
}
