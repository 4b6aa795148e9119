//! In-process vector index

use super::{ScoredName, VectorStore};
use async_trait::async_trait;
use kgfusion_common::embeddings::{cosine_similarity, Embedder};
use kgfusion_common::errors::Result;
use kgfusion_common::models::Entity;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone)]
struct IndexedName {
    name: String,
    embedding: Vec<f32>,
}

/// Brute-force cosine search over named vectors, grouped by collection
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<IndexedName>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &str, name: impl Into<String>, embedding: Vec<f32>) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(IndexedName {
                name: name.into(),
                embedding,
            });
    }

    /// Embed and index entities
    ///
    /// Entities that already carry an embedding are indexed as-is; the rest
    /// are embedded from their name and properties in one batch.
    pub async fn index_entities(
        &self,
        collection: &str,
        entities: &[Entity],
        embedder: &dyn Embedder,
    ) -> Result<usize> {
        let (ready, pending): (Vec<&Entity>, Vec<&Entity>) =
            entities.iter().partition(|e| e.embedding.is_some());

        let texts: Vec<String> = pending.iter().map(|e| e.embedding_text()).collect();
        let embedded = if texts.is_empty() {
            Vec::new()
        } else {
            embedder.embed_batch(&texts).await?
        };

        let mut collections = self.collections.write().await;
        let index = collections.entry(collection.to_string()).or_default();

        for entity in &ready {
            if let Some(embedding) = &entity.embedding {
                index.push(IndexedName {
                    name: entity.name.clone(),
                    embedding: embedding.clone(),
                });
            }
        }
        for (entity, embedding) in pending.iter().zip(embedded) {
            index.push(IndexedName {
                name: entity.name.clone(),
                embedding,
            });
        }

        let count = ready.len() + pending.len();
        info!(collection = collection, count = count, "Indexed entity embeddings");
        Ok(count)
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn search(&self, collection: &str, embedding: &[f32], limit: usize) -> Result<Vec<ScoredName>> {
        let collections = self.collections.read().await;
        let Some(index) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<ScoredName> = index
            .iter()
            .map(|item| ScoredName {
                name: item.name.clone(),
                score: cosine_similarity(embedding, &item.embedding),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgfusion_common::embeddings::HashingEmbedder;

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = MemoryVectorStore::new();
        store.insert("c", "east", vec![1.0, 0.0]).await;
        store.insert("c", "north", vec![0.0, 1.0]).await;
        store.insert("c", "north-east", vec![0.7, 0.7]).await;

        let hits = store.search("c", &[0.0, 1.0], 2).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["north", "north-east"]);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_empty() {
        let store = MemoryVectorStore::new();
        assert!(store.search("missing", &[1.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_entities_uses_existing_embeddings() {
        let store = MemoryVectorStore::new();
        let embedder = HashingEmbedder::new(64);

        let mut pre = Entity::new("1", "Son", "Player");
        pre.embedding = Some(vec![1.0; 64]);
        let entities = vec![pre, Entity::new("2", "Tottenham", "Team")];

        let count = store.index_entities("c", &entities, &embedder).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.len("c").await, 2);

        let hits = store.search("c", &[1.0; 64], 1).await.unwrap();
        assert_eq!(hits[0].name, "Son");
    }
}
