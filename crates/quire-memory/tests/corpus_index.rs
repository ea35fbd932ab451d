use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use quire_llm::mock::MockProvider;
use quire_memory::document::{CorpusLoader, DocType, SplitterConfig};
use quire_memory::index::collection_base;
use quire_memory::{CorpusIndex, SqliteVectorStore, VectorStore};

fn write_corpus(dir: &Path) {
    std::fs::write(
        dir.join("fas.csv"),
        "INDICATOR,COUNTRY,2020,2021,2022\n\
         Registered mobile money accounts,Rwanda,4900000,5800000,6400000\n\
         Automated teller machines per 100000 adults,Rwanda,4.5,4.6,4.4\n\
         Commercial bank branches per 1000 km2,Rwanda,7.2,7.0,6.9\n\
         x\n",
    )
    .unwrap();
    std::fs::write(dir.join("readme.md"), "not part of the corpus").unwrap();
}

fn loader() -> CorpusLoader {
    CorpusLoader::new(
        SplitterConfig::default(),
        HashMap::new(),
        "IMF Financial Access Survey",
    )
}

async fn sqlite(path: &Path) -> Arc<dyn VectorStore> {
    Arc::new(
        SqliteVectorStore::open(&path.display().to_string())
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn csv_corpus_indexes_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("corpus");
    std::fs::create_dir(&corpus).unwrap();
    write_corpus(&corpus);
    let db = dir.path().join("index.db");
    let base = collection_base("corpus", "mock");

    let report = loader().load_corpus(&corpus).await.unwrap();
    assert_eq!(report.chunks.len(), 3, "short row is dropped");
    assert_eq!(report.skipped.len(), 1);
    assert!(report.chunks.iter().all(|c| c.doc_type == DocType::Csv && c.page == 0));

    let question = "How many registered mobile money accounts did Rwanda have?";
    let first = {
        let index = CorpusIndex::open(sqlite(&db).await, MockProvider::default(), base.clone())
            .await
            .unwrap();
        index.rebuild(&report.chunks).await.unwrap();
        index.search(question, 2).await.unwrap()
    };
    assert_eq!(first.len(), 2);
    assert!(first[0].chunk.text.contains("Registered mobile money accounts"));

    let reopened = CorpusIndex::open(sqlite(&db).await, MockProvider::default(), base)
        .await
        .unwrap();
    assert!(reopened.is_built().await);
    assert_eq!(reopened.chunk_count().await, 3);
    let again = reopened.search(question, 2).await.unwrap();
    let ids = |hits: &[quire_memory::RetrievedChunk]| {
        hits.iter().map(|h| h.chunk.chunk_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&again));
    for (a, b) in first.iter().zip(&again) {
        assert!((a.similarity - b.similarity).abs() < 1e-6);
    }
}

#[tokio::test]
async fn other_embedding_model_does_not_reuse_index() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("corpus");
    std::fs::create_dir(&corpus).unwrap();
    write_corpus(&corpus);
    let db = dir.path().join("index.db");

    let report = loader().load_corpus(&corpus).await.unwrap();
    let index = CorpusIndex::open(
        sqlite(&db).await,
        MockProvider::default(),
        collection_base("corpus", "model-a"),
    )
    .await
    .unwrap();
    index.rebuild(&report.chunks).await.unwrap();
    drop(index);

    let other = CorpusIndex::open(
        sqlite(&db).await,
        MockProvider::default(),
        collection_base("corpus", "model-b"),
    )
    .await
    .unwrap();
    assert!(!other.is_built().await);
}
