use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Names of all collections, sorted.
    fn list_collections(&self) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>>;

    /// Rename `from` to `to`, replacing any existing `to`.
    fn rename_collection(
        &self,
        from: &str,
        to: &str,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Dimension recorded for `collection`, if it exists.
    fn vector_size(&self, collection: &str)
    -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Top `limit` points by cosine similarity, highest first.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Order by descending score, breaking ties by id so repeated searches agree.
pub(crate) fn rank(scored: &mut Vec<ScoredVectorPoint>, limit: u64) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, score: f32) -> ScoredVectorPoint {
        ScoredVectorPoint {
            id: id.into(),
            score,
            payload: HashMap::new(),
        }
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn rank_sorts_truncates_and_breaks_ties() {
        let mut scored = vec![point("b", 0.5), point("c", 0.9), point("a", 0.5)];
        rank(&mut scored, 2);
        let ids: Vec<_> = scored.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn rank_with_zero_limit_is_empty() {
        let mut scored = vec![point("a", 0.1)];
        rank(&mut scored, 0);
        assert!(scored.is_empty());
    }
}
