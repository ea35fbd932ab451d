//! Generational corpus index over a [`VectorStore`].
//!
//! Complete generations live in collections named `{base}:{n}`. A rebuild
//! writes `{base}:{n+1}:building`, renames it once every chunk is stored, and
//! only then swaps the active generation under the write lock. Searches hold
//! the read lock for their whole store query, so they never observe a partial
//! generation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use quire_llm::LlmProvider;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::document::DocumentChunk;
use crate::error::MemoryError;
use crate::vector_store::{VectorPoint, VectorStore};

const UPSERT_BATCH: usize = 128;
const STAGING_SUFFIX: &str = ":building";

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    #[serde(flatten)]
    pub chunk: DocumentChunk,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RebuildStats {
    pub generation: u64,
    pub chunks: usize,
    pub dimensions: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
struct ActiveGeneration {
    collection: String,
    generation: u64,
    vector_size: u64,
    points: u64,
}

pub struct CorpusIndex<E> {
    store: Arc<dyn VectorStore>,
    embedder: E,
    base: String,
    active: RwLock<Option<ActiveGeneration>>,
    rebuild_lock: Mutex<()>,
}

impl<E> std::fmt::Debug for CorpusIndex<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusIndex")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// Collection prefix tying an index to the embedding model that produced it.
#[must_use]
pub fn collection_base(collection: &str, embedding_model: &str) -> String {
    let fingerprint = blake3::hash(embedding_model.as_bytes()).to_hex();
    format!("{collection}_{}", &fingerprint[..8])
}

fn parse_generation(base: &str, name: &str) -> Option<(u64, bool)> {
    let rest = name.strip_prefix(base)?.strip_prefix(':')?;
    match rest.strip_suffix(STAGING_SUFFIX) {
        Some(number) => number.parse().ok().map(|n| (n, true)),
        None => rest.parse().ok().map(|n| (n, false)),
    }
}

fn to_point(chunk: &DocumentChunk, vector: Vec<f32>) -> Result<VectorPoint, MemoryError> {
    let payload = match serde_json::to_value(chunk)? {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    Ok(VectorPoint {
        id: chunk.chunk_id.clone(),
        vector,
        payload,
    })
}

fn from_payload(payload: HashMap<String, serde_json::Value>) -> Result<DocumentChunk, MemoryError> {
    let object: serde_json::Map<String, serde_json::Value> = payload.into_iter().collect();
    Ok(serde_json::from_value(serde_json::Value::Object(object))?)
}

impl<E: LlmProvider> CorpusIndex<E> {
    /// Attach to `store`, adopting the newest complete generation for `base`.
    ///
    /// Leftover staging collections and superseded generations are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or cleaned up.
    pub async fn open(
        store: Arc<dyn VectorStore>,
        embedder: E,
        base: impl Into<String>,
    ) -> Result<Self, MemoryError> {
        let base = base.into();
        let mut complete = Vec::new();
        for name in store.list_collections().await? {
            match parse_generation(&base, &name) {
                Some((_, true)) => {
                    tracing::warn!(collection = %name, "removing interrupted index build");
                    store.delete_collection(&name).await?;
                }
                Some((generation, false)) => complete.push((generation, name)),
                None => {}
            }
        }
        complete.sort();

        let mut active = None;
        if let Some((generation, collection)) = complete.pop() {
            for (_, stale) in complete {
                store.delete_collection(&stale).await?;
            }
            let vector_size = store.vector_size(&collection).await?.unwrap_or(0);
            let points = store.count(&collection).await?;
            tracing::info!(collection = %collection, points, "using existing index");
            active = Some(ActiveGeneration {
                collection,
                generation,
                vector_size,
                points,
            });
        }

        Ok(Self {
            store,
            embedder,
            base,
            active: RwLock::new(active),
            rebuild_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Whether a complete generation is available to search.
    pub async fn is_built(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Number of chunks in the active generation (zero if none).
    pub async fn chunk_count(&self) -> u64 {
        self.active.read().await.as_ref().map_or(0, |g| g.points)
    }

    /// Replace the index content with `chunks`.
    ///
    /// Readers keep seeing the previous generation until the new one is
    /// complete. On failure the previous generation stays active.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or storage fails.
    pub async fn rebuild(&self, chunks: &[DocumentChunk]) -> Result<RebuildStats, MemoryError> {
        let _building = self.rebuild_lock.lock().await;
        let started = Instant::now();

        let generation = self
            .active
            .read()
            .await
            .as_ref()
            .map_or(1, |g| g.generation + 1);
        let staging = format!("{}:{generation}{STAGING_SUFFIX}", self.base);
        let target = format!("{}:{generation}", self.base);

        self.store.delete_collection(&staging).await?;
        let vector_size = match self.fill(&staging, chunks).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(cleanup) = self.store.delete_collection(&staging).await {
                    tracing::warn!("failed to remove staging collection: {cleanup}");
                }
                return Err(e);
            }
        };
        self.store.rename_collection(&staging, &target).await?;
        let points = self.store.count(&target).await?;

        {
            let mut active = self.active.write().await;
            let previous = active.replace(ActiveGeneration {
                collection: target.clone(),
                generation,
                vector_size,
                points,
            });
            if let Some(previous) = previous
                && previous.collection != target
                && let Err(e) = self.store.delete_collection(&previous.collection).await
            {
                tracing::warn!(collection = %previous.collection, "failed to drop old index: {e}");
            }
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(collection = %target, chunks = points, elapsed_ms, "index rebuilt");
        Ok(RebuildStats {
            generation,
            chunks: chunks.len(),
            dimensions: vector_size,
            elapsed_ms,
        })
    }

    async fn fill(&self, collection: &str, chunks: &[DocumentChunk]) -> Result<u64, MemoryError> {
        let mut vector_size = None;
        for batch in chunks.chunks(UPSERT_BATCH) {
            let mut points = Vec::with_capacity(batch.len());
            for chunk in batch {
                let vector = self.embedder.embed(&chunk.text).await?;
                let size = vector.len() as u64;
                match vector_size {
                    None => {
                        self.store.ensure_collection(collection, size).await?;
                        vector_size = Some(size);
                    }
                    Some(expected) if expected != size => {
                        return Err(MemoryError::DimensionMismatch {
                            expected: usize::try_from(expected).unwrap_or(usize::MAX),
                            actual: vector.len(),
                        });
                    }
                    Some(_) => {}
                }
                points.push(to_point(chunk, vector)?);
            }
            self.store.upsert(collection, points).await?;
            tracing::debug!(stored = batch.len(), "upserted batch");
        }

        match vector_size {
            Some(size) => Ok(size),
            None => {
                self.store.ensure_collection(collection, 0).await?;
                Ok(0)
            }
        }
    }

    /// Top `top_k` chunks for `question`, most similar first.
    ///
    /// An empty index yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotBuilt` before the first build, or an error if embedding
    /// or the store query fails.
    pub async fn search(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, MemoryError> {
        let active = self.active.read().await;
        let generation = active.as_ref().ok_or(MemoryError::IndexNotBuilt)?;
        if generation.points == 0 || top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(question).await?;
        if vector.len() as u64 != generation.vector_size {
            return Err(MemoryError::DimensionMismatch {
                expected: usize::try_from(generation.vector_size).unwrap_or(usize::MAX),
                actual: vector.len(),
            });
        }

        let hits = self
            .store
            .search(&generation.collection, vector, top_k as u64)
            .await?;
        drop(active);

        hits.into_iter()
            .map(|hit| {
                Ok(RetrievedChunk {
                    chunk: from_payload(hit.payload)?,
                    similarity: hit.score,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use quire_llm::mock::MockProvider;

    use super::*;
    use crate::document::{DocType, DocumentMetadata};
    use crate::in_memory_store::InMemoryVectorStore;
    use crate::sqlite_store::SqliteVectorStore;

    fn chunk(text: &str, source: &str, page: u32) -> DocumentChunk {
        DocumentChunk::new(
            text.to_owned(),
            &DocumentMetadata {
                source_file: format!("{source}.pdf"),
                source_name: source.to_owned(),
                page,
                doc_type: DocType::Pdf,
                row: None,
            },
            0,
        )
    }

    fn corpus() -> Vec<DocumentChunk> {
        vec![
            chunk("mobile money usage differs by gender among adults", "Industry Report", 71),
            chunk("rural households travel far to reach bank branches", "Survey", 12),
            chunk("the central bank licenses payment service providers", "Payment Law", 4),
            chunk("savings groups remain popular in rural districts", "Survey", 30),
        ]
    }

    async fn memory_index() -> CorpusIndex<MockProvider> {
        CorpusIndex::open(
            Arc::new(InMemoryVectorStore::new()),
            MockProvider::default(),
            collection_base("corpus", "mock"),
        )
        .await
        .unwrap()
    }

    #[test]
    fn collection_base_depends_on_model() {
        assert_ne!(
            collection_base("corpus", "all-minilm"),
            collection_base("corpus", "nomic-embed-text")
        );
        assert!(collection_base("corpus", "x").starts_with("corpus_"));
    }

    #[test]
    fn parse_generation_names() {
        assert_eq!(parse_generation("c_ab", "c_ab:3"), Some((3, false)));
        assert_eq!(parse_generation("c_ab", "c_ab:4:building"), Some((4, true)));
        assert_eq!(parse_generation("c_ab", "c_cd:1"), None);
        assert_eq!(parse_generation("c_ab", "c_ab"), None);
    }

    #[tokio::test]
    async fn search_before_build_is_an_error() {
        let index = memory_index().await;
        assert!(!index.is_built().await);
        assert!(matches!(
            index.search("anything", 5).await,
            Err(MemoryError::IndexNotBuilt)
        ));
    }

    #[tokio::test]
    async fn empty_rebuild_yields_empty_search() {
        let index = memory_index().await;
        index.rebuild(&[]).await.unwrap();
        assert!(index.is_built().await);
        assert_eq!(index.chunk_count().await, 0);
        assert!(index.search("mobile money", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_returns_best_match_first_with_payload() {
        let index = memory_index().await;
        index.rebuild(&corpus()).await.unwrap();
        let hits = index.search("mobile money gender", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source_name, "Industry Report");
        assert_eq!(hits[0].chunk.page, 71);
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_content() {
        let index = memory_index().await;
        index.rebuild(&corpus()).await.unwrap();
        let replacement = vec![chunk("inflation targets and monetary policy", "Policy", 2)];
        let stats = index.rebuild(&replacement).await.unwrap();
        assert_eq!(stats.generation, 2);
        assert_eq!(index.chunk_count().await, 1);
        let hits = index.search("rural bank branches", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source_name, "Policy");
    }

    #[tokio::test]
    async fn rebuild_with_same_corpus_keeps_ranking() {
        let index = memory_index().await;
        index.rebuild(&corpus()).await.unwrap();
        let queries = ["mobile money", "rural savings", "payment licenses"];
        let mut before = Vec::new();
        for q in queries {
            before.push(index.search(q, 4).await.unwrap());
        }
        index.rebuild(&corpus()).await.unwrap();
        for (q, old) in queries.iter().zip(before) {
            let new = index.search(q, 4).await.unwrap();
            let old_ids: Vec<_> = old.iter().map(|h| h.chunk.chunk_id.clone()).collect();
            let new_ids: Vec<_> = new.iter().map(|h| h.chunk.chunk_id.clone()).collect();
            assert_eq!(old_ids, new_ids);
            for (a, b) in old.iter().zip(&new) {
                assert!((a.similarity - b.similarity).abs() < 1e-5);
            }
        }
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_generation() {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let base = collection_base("corpus", "mock");
        let index = CorpusIndex::open(Arc::clone(&store), MockProvider::default(), base.clone())
            .await
            .unwrap();
        index.rebuild(&corpus()).await.unwrap();

        let mut failing = MockProvider::default();
        failing.fail_embed = true;
        let broken = CorpusIndex::open(Arc::clone(&store), failing, base.clone())
            .await
            .unwrap();
        assert!(broken.rebuild(&corpus()).await.is_err());
        assert_eq!(broken.chunk_count().await, 4);
        assert_eq!(
            store.list_collections().await.unwrap(),
            vec![format!("{base}:1")]
        );
    }

    #[tokio::test]
    async fn open_discards_staging_and_adopts_latest() {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        store.ensure_collection("c:1", 2).await.unwrap();
        store.ensure_collection("c:2", 2).await.unwrap();
        store.ensure_collection("c:3:building", 2).await.unwrap();
        store.ensure_collection("other:1", 2).await.unwrap();

        let index = CorpusIndex::open(Arc::clone(&store), MockProvider::default(), "c")
            .await
            .unwrap();
        assert!(index.is_built().await);
        assert_eq!(
            store.list_collections().await.unwrap(),
            vec!["c:2".to_owned(), "other:1".to_owned()]
        );
    }

    #[tokio::test]
    async fn persistent_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let path = path.to_str().unwrap();
        let base = collection_base("corpus", "mock");
        {
            let store = SqliteVectorStore::open(path).await.unwrap();
            let index = CorpusIndex::open(Arc::new(store.clone()), MockProvider::default(), base.clone())
                .await
                .unwrap();
            index.rebuild(&corpus()).await.unwrap();
            store.pool().close().await;
        }
        let store = SqliteVectorStore::open(path).await.unwrap();
        let index = CorpusIndex::open(Arc::new(store), MockProvider::default(), base)
            .await
            .unwrap();
        assert!(index.is_built().await);
        assert_eq!(index.chunk_count().await, 4);
        let hits = index.search("payment service providers", 1).await.unwrap();
        assert_eq!(hits[0].chunk.source_name, "Payment Law");
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_reported() {
        let index = CorpusIndex::open(
            Arc::new(InMemoryVectorStore::new()),
            MockProvider::default().with_embedding_for("short", vec![1.0, 0.0]),
            "c",
        )
        .await
        .unwrap();
        index.rebuild(&corpus()).await.unwrap();
        assert!(matches!(
            index.search("short query", 3).await,
            Err(MemoryError::DimensionMismatch { actual: 2, .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_searches_see_whole_generations() {
        let old = corpus();
        let new = vec![
            chunk("mobile money agents expand coverage", "New Report", 1),
            chunk("mobile money interoperability rules", "New Report", 2),
        ];
        let index = Arc::new(memory_index().await);
        index.rebuild(&old).await.unwrap();

        let old_ids: std::collections::HashSet<_> =
            old.iter().map(|c| c.chunk_id.clone()).collect();
        let new_ids: std::collections::HashSet<_> =
            new.iter().map(|c| c.chunk_id.clone()).collect();

        let mut readers = Vec::new();
        for _ in 0..8 {
            let index = Arc::clone(&index);
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..25 {
                    let hits = index.search("mobile money", 10).await.unwrap();
                    seen.push(hits.into_iter().map(|h| h.chunk.chunk_id).collect::<Vec<_>>());
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }
        index.rebuild(&new).await.unwrap();

        for reader in readers {
            for ids in reader.await.unwrap() {
                let all_old = ids.iter().all(|id| old_ids.contains(id)) && ids.len() == old.len();
                let all_new = ids.iter().all(|id| new_ids.contains(id)) && ids.len() == new.len();
                assert!(all_old || all_new, "mixed generation result: {ids:?}");
            }
        }
    }

    mod proptest_index {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn search_respects_top_k_and_order(
                texts in proptest::collection::vec("[a-z]{3,8}( [a-z]{3,8}){2,10}", 0..20),
                query in "[a-z]{3,8}( [a-z]{3,8}){0,4}",
                top_k in 0usize..25,
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                let hits = rt.block_on(async {
                    let index = memory_index().await;
                    let chunks: Vec<_> = texts
                        .iter()
                        .enumerate()
                        .map(|(i, t)| chunk(t, "Doc", u32::try_from(i).unwrap() + 1))
                        .collect();
                    index.rebuild(&chunks).await.unwrap();
                    index.search(&query, top_k).await.unwrap()
                });
                prop_assert!(hits.len() <= top_k);
                prop_assert!(hits.len() <= texts.len());
                for pair in hits.windows(2) {
                    prop_assert!(pair[0].similarity >= pair[1].similarity);
                }
            }
        }
    }
}
