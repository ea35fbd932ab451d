use std::collections::HashMap;
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::MemoryError;
use crate::vector_store::{
    BoxFuture, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError, cosine_similarity,
    rank,
};

/// Disk-backed store: vectors as little-endian `f32` blobs, payloads as JSON.
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Parent directories are created as needed. `:memory:` opens a private
    /// in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str) -> Result<Self, MemoryError> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| MemoryError::Other(format!("cannot create {}: {e}", parent.display())))?;
            }
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // A single connection keeps `:memory:` databases shared across calls.
        let max_connections = if path == ":memory:" { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(path, "opened sqlite vector store");

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl VectorStore for SqliteVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let size = i64::try_from(vector_size)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            sqlx::query("INSERT OR IGNORE INTO collections (name, vector_size) VALUES (?, ?)")
                .bind(&collection)
                .bind(size)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT name FROM collections WHERE name = ?")
                    .bind(&collection)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(row.is_some())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&collection)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            Ok(())
        })
    }

    fn list_collections(&self) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        Box::pin(async move {
            let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM collections ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(rows.into_iter().map(|r| r.0).collect())
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
            let err = |e: sqlx::Error| VectorStoreError::Collection(e.to_string());
            let mut tx = self.pool.begin().await.map_err(err)?;
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&to)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            let updated = sqlx::query("UPDATE collections SET name = ? WHERE name = ?")
                .bind(&to)
                .bind(&from)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            if updated.rows_affected() == 0 {
                return Err(VectorStoreError::Collection(format!(
                    "collection {from} not found"
                )));
            }
            tx.commit().await.map_err(err)?;
            Ok(())
        })
    }

    fn vector_size(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let row: Option<(i64,)> =
                sqlx::query_as("SELECT vector_size FROM collections WHERE name = ?")
                    .bind(&collection)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            row.map(|(size,)| {
                u64::try_from(size).map_err(|e| VectorStoreError::Collection(e.to_string()))
            })
            .transpose()
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let expected = self.vector_size(&collection).await?.ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;

            let err = |e: sqlx::Error| VectorStoreError::Upsert(e.to_string());
            let mut tx = self.pool.begin().await.map_err(err)?;
            for p in points {
                if p.vector.len() as u64 != expected {
                    return Err(VectorStoreError::Upsert(format!(
                        "point {} has {} dimensions, collection expects {expected}",
                        p.id,
                        p.vector.len()
                    )));
                }
                let payload = serde_json::to_string(&p.payload)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                sqlx::query(
                    "INSERT OR REPLACE INTO points (collection, id, vector, payload) VALUES (?, ?, ?, ?)",
                )
                .bind(&collection)
                .bind(&p.id)
                .bind(encode_vector(&p.vector))
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            }
            tx.commit().await.map_err(err)?;
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
            if !self.collection_exists(&collection).await? {
                return Err(VectorStoreError::Search(format!(
                    "collection {collection} not found"
                )));
            }
            let rows: Vec<(String, Vec<u8>, String)> =
                sqlx::query_as("SELECT id, vector, payload FROM points WHERE collection = ?")
                    .bind(&collection)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let mut scored = Vec::with_capacity(rows.len());
            for (id, blob, payload) in rows {
                let payload: HashMap<String, serde_json::Value> = serde_json::from_str(&payload)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                scored.push(ScoredVectorPoint {
                    score: cosine_similarity(&vector, &decode_vector(&blob)),
                    id,
                    payload,
                });
            }
            rank(&mut scored, limit);
            Ok(scored)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM points WHERE collection = ?")
                .bind(&collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            u64::try_from(row.0).map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> VectorPoint {
        let mut payload = HashMap::new();
        payload.insert("text".into(), serde_json::json!(format!("text of {id}")));
        VectorPoint {
            id: id.into(),
            vector,
            payload,
        }
    }

    #[test]
    fn vector_blob_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[tokio::test]
    async fn upsert_search_count() {
        let store = SqliteVectorStore::open(":memory:").await.unwrap();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 2);

        let hits = store.search("c", vec![1.0, 0.2], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].payload["text"], "text of a");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_point() {
        let store = SqliteVectorStore::open(":memory:").await.unwrap();
        store.ensure_collection("c", 2).await.unwrap();
        store.upsert("c", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        store.upsert("c", vec![point("a", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rename_moves_points_and_replaces_target() {
        let store = SqliteVectorStore::open(":memory:").await.unwrap();
        store.ensure_collection("old", 2).await.unwrap();
        store.upsert("old", vec![point("x", vec![1.0, 0.0])]).await.unwrap();
        store.ensure_collection("stage", 2).await.unwrap();
        store
            .upsert(
                "stage",
                vec![point("y", vec![1.0, 0.0]), point("z", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        store.rename_collection("stage", "old").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["old"]);
        assert_eq!(store.count("old").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_cascades_points() {
        let store = SqliteVectorStore::open(":memory:").await.unwrap();
        store.ensure_collection("c", 2).await.unwrap();
        store.upsert("c", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        store.delete_collection("c").await.unwrap();
        assert!(!store.collection_exists("c").await.unwrap());
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteVectorStore::open(path).await.unwrap();
            store.ensure_collection("c", 2).await.unwrap();
            store.upsert("c", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
            store.pool().close().await;
        }
        let store = SqliteVectorStore::open(path).await.unwrap();
        assert_eq!(store.vector_size("c").await.unwrap(), Some(2));
        assert_eq!(store.count("c").await.unwrap(), 1);
    }
}
