//! Seed resolution
//!
//! Seeds come from two independent sources: keywords the language model pulls
//! out of the query, and entity names whose embeddings sit closest to the
//! query embedding. Both run in parallel and their results are unioned.

use crate::vector::VectorStore;
use kgfusion_common::embeddings::Embedder;
use kgfusion_common::errors::Result;
use kgfusion_common::llm::{parse_llm_json, LanguageModel};
use kgfusion_common::metrics;
use kgfusion_common::prompts;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Seeds found for one query, per source and merged
#[derive(Debug, Clone, Default)]
pub struct ResolvedSeeds {
    pub lexical: Vec<String>,
    pub vector: Vec<String>,
    pub merged: Vec<String>,
}

/// Union two name lists
///
/// Keeps first-occurrence order (lexical first), drops blank names and
/// compares names by exact string equality.
pub fn merge_seed_names(lexical: &[String], vector: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    lexical
        .iter()
        .chain(vector)
        .filter(|name| !name.trim().is_empty())
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Resolves seed entity names for a query
pub struct SeedResolver {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
}

impl SeedResolver {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            llm,
            embedder,
            vectors,
            collection: collection.into(),
            top_k,
        }
    }

    /// Run both sources; a failing source contributes no seeds
    pub async fn resolve(&self, query: &str) -> ResolvedSeeds {
        let (lexical, vector) = tokio::join!(self.extract_keywords(query), self.similar_entities(query));

        let lexical = lexical.unwrap_or_else(|e| {
            warn!(error = %e, "Keyword extraction failed, continuing without lexical seeds");
            Vec::new()
        });
        let vector = vector.unwrap_or_else(|e| {
            warn!(error = %e, "Vector search failed, continuing without vector seeds");
            Vec::new()
        });

        let merged = merge_seed_names(&lexical, &vector);
        info!(
            lexical = ?lexical,
            vector = ?vector,
            merged = ?merged,
            "Resolved seed entities"
        );

        ResolvedSeeds {
            lexical,
            vector,
            merged,
        }
    }

    /// Keywords extracted by the language model
    pub async fn extract_keywords(&self, query: &str) -> Result<Vec<String>> {
        let started = Instant::now();
        let response = self.llm.complete(&prompts::entity_extraction_prompt(query)).await;
        let parsed = response.and_then(|raw| parse_llm_json::<Vec<String>>(&raw));
        metrics::record_llm(started.elapsed().as_secs_f64(), "seeds", parsed.is_ok());
        parsed
    }

    /// Names of the entities nearest to the query embedding
    pub async fn similar_entities(&self, query: &str) -> Result<Vec<String>> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self
            .vectors
            .search(&self.collection, &embedding, self.top_k)
            .await?;
        Ok(hits.into_iter().map(|hit| hit.name).collect())
    }
}
