use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError, cosine_similarity,
    rank,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

struct InMemoryCollection {
    vector_size: u64,
    points: HashMap<String, StoredPoint>,
}

/// Process-local store; contents vanish when the process exits.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.entry(collection)
                .or_insert_with(|| InMemoryCollection {
                    vector_size,
                    points: HashMap::new(),
                });
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn list_collections(&self) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let mut names: Vec<String> = cols.keys().cloned().collect();
            names.sort();
            Ok(names)
        })
    }

    fn rename_collection(
        &self,
        from: &str,
        to: &str,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let from = from.to_owned();
        let to = to.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let col = cols.remove(&from).ok_or_else(|| {
                VectorStoreError::Collection(format!("collection {from} not found"))
            })?;
            cols.insert(to, col);
            Ok(())
        })
    }

    fn vector_size(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.get(&collection).map(|c| c.vector_size))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            for p in points {
                if p.vector.len() as u64 != col.vector_size {
                    return Err(VectorStoreError::Upsert(format!(
                        "point {} has {} dimensions, collection expects {}",
                        p.id,
                        p.vector.len(),
                        col.vector_size
                    )));
                }
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;

            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();
            rank(&mut scored, limit);
            Ok(scored)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols
                .get(&collection)
                .map_or(0, |c| c.points.len() as u64))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> VectorPoint {
        let mut payload = HashMap::new();
        payload.insert("text".into(), serde_json::json!(id));
        VectorPoint {
            id: id.into(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn ensure_collection_and_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("c").await.unwrap());
        store.ensure_collection("c", 2).await.unwrap();
        assert!(store.collection_exists("c").await.unwrap());
        assert_eq!(store.vector_size("c").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store.upsert("c", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        store.upsert("c", vec![point("a", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
        let hits = store.search("c", vec![0.0, 1.0], 5).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        let err = store.upsert("c", vec![point("a", vec![1.0])]).await;
        assert!(matches!(err, Err(VectorStoreError::Upsert(_))));
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("far", vec![0.0, 1.0]),
                    point("near", vec![1.0, 0.1]),
                    point("mid", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        let hits = store.search("c", vec![1.0, 0.0], 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert_eq!(hits[0].payload["text"], "near");
    }

    #[tokio::test]
    async fn search_missing_collection_errors() {
        let store = InMemoryVectorStore::new();
        assert!(store.search("nope", vec![1.0], 3).await.is_err());
    }

    #[tokio::test]
    async fn rename_and_list() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("b:1:building", 2).await.unwrap();
        store.ensure_collection("a", 2).await.unwrap();
        store.rename_collection("b:1:building", "b:1").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b:1"]);
        store.delete_collection("a").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["b:1"]);
        assert!(store.rename_collection("missing", "x").await.is_err());
    }

    #[test]
    fn debug_format() {
        let store = InMemoryVectorStore::new();
        assert!(format!("{store:?}").contains("InMemoryVectorStore"));
    }
}
