//! Vector store collaborator
//!
//! Similarity search over entity embeddings. Results carry entity names, the
//! join key into the graph store.

mod memory;
mod pgvector;
mod qdrant;

pub use memory::MemoryVectorStore;
pub use pgvector::PgVectorStore;
pub use qdrant::QdrantVectorStore;

use async_trait::async_trait;
use kgfusion_common::config::{DatabaseConfig, VectorBackend, VectorConfig};
use kgfusion_common::db::DbPool;
use kgfusion_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Entity name with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredName {
    pub name: String,
    pub score: f32,
}

/// Trait for nearest-neighbour search
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Up to `limit` entity names nearest to `embedding`, most similar first
    async fn search(&self, collection: &str, embedding: &[f32], limit: usize) -> Result<Vec<ScoredName>>;
}

/// Create a vector store based on configuration
pub async fn create_vector_store(
    config: &VectorConfig,
    database: Option<&DatabaseConfig>,
) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        VectorBackend::Qdrant => Ok(Arc::new(QdrantVectorStore::new(config)?)),
        VectorBackend::Pgvector => {
            let database = database.ok_or_else(|| AppError::Configuration {
                message: "the pgvector backend requires a [database] section".to_string(),
            })?;
            let pool = DbPool::new(database).await?;
            Ok(Arc::new(PgVectorStore::new(pool, &config.table)?))
        }
        VectorBackend::Memory => Ok(Arc::new(MemoryVectorStore::new())),
    }
}

pub(crate) fn vector_error(message: impl Into<String>) -> AppError {
    AppError::VectorStore {
        message: message.into(),
    }
}
