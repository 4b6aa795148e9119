//! Graph store collaborator
//!
//! Traversal queries return raw [`GraphFragment`]s; the builder turns them into
//! subgraphs with a [`SubgraphAssembler`]. Projection management and ranking
//! back the importance strategy.

mod fragment;
mod identifier;
mod memory;
mod neo4j;
mod pagerank;

pub use fragment::{EdgeRecord, GraphFragment, SubgraphAssembler};
pub use identifier::validate_identifier;
pub use memory::{GraphSnapshot, MemoryGraph, MemoryGraphStore};
pub use neo4j::Neo4jGraphStore;
pub use pagerank::{PageRankConfig, PageRankScorer};

#[cfg(test)]
pub(crate) use memory::tests as memory_tests;

use async_trait::async_trait;
use kgfusion_common::config::{GraphBackend, GraphConfig};
use kgfusion_common::errors::{AppError, Result};
use std::sync::Arc;

/// Query surface of the knowledge graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Nodes named `name`, their direct neighbours in either direction and the
    /// connecting edges
    async fn one_hop(&self, name: &str) -> Result<GraphFragment>;

    /// Every node and edge on a path of 1..=`max_hops` edges starting at the
    /// node named `name`, excluding paths that end where they started
    async fn paths_within(&self, name: &str, max_hops: u32) -> Result<GraphFragment>;

    /// Materialise a named projection of the whole graph
    async fn create_projection(&self, projection: &str) -> Result<()>;

    /// Drop a projection; dropping an unknown projection is not an error
    async fn drop_projection(&self, projection: &str) -> Result<()>;

    /// Names of the `top_k` highest PageRank nodes of a projection
    async fn page_rank(&self, projection: &str, top_k: usize) -> Result<Vec<String>>;

    /// Nodes and edges on all shortest undirected paths between two named nodes
    async fn shortest_paths(&self, from: &str, to: &str) -> Result<GraphFragment>;
}

/// Create a graph store based on configuration
pub async fn create_graph_store(config: &GraphConfig) -> Result<Arc<dyn GraphStore>> {
    match config.backend {
        GraphBackend::Neo4j => Ok(Arc::new(Neo4jGraphStore::new(config)?)),
        GraphBackend::Memory => Ok(Arc::new(load_memory_store(config).await?)),
    }
}

/// Memory store from `snapshot_path`, or an empty one when no snapshot is set
pub async fn load_memory_store(config: &GraphConfig) -> Result<MemoryGraphStore> {
    match &config.snapshot_path {
        Some(path) => MemoryGraphStore::from_snapshot_file(path).await,
        None => {
            tracing::warn!("graph.snapshot_path not set, starting with an empty memory graph");
            Ok(MemoryGraphStore::new(MemoryGraph::new()))
        }
    }
}

pub(crate) fn graph_error(message: impl Into<String>) -> AppError {
    AppError::GraphStore {
        message: message.into(),
    }
}
