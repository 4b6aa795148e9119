//! End-to-end retrieval
//!
//! Query → seeds → candidate subgraphs → fused subgraph → context text, and
//! optionally the final answer generated from that context.

use crate::builder::{BuildOptions, SubgraphBuilder};
use crate::fusion::{CachedEvaluator, FusionOutcome, LlmEvaluator, SubgraphEvaluator, SubgraphFuser};
use crate::graph::{self, GraphStore};
use crate::seeds::{ResolvedSeeds, SeedResolver};
use crate::serializer::serialize_subgraph;
use crate::vector::{self, MemoryVectorStore, VectorStore};
use kgfusion_common::cache::Cache;
use kgfusion_common::config::{AppConfig, GraphBackend, RetrievalConfig, VectorBackend, VectorConfig};
use kgfusion_common::embeddings::{create_embedder, Embedder};
use kgfusion_common::errors::{AppError, Result};
use kgfusion_common::llm::{create_language_model, LanguageModel};
use kgfusion_common::metrics;
use kgfusion_common::models::Entity;
use kgfusion_common::prompts;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Collaborators the pipeline runs against
pub struct PipelineComponents {
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub evaluator: Arc<dyn SubgraphEvaluator>,
}

/// Per-request overrides of the configured traversal bounds
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrieveOptions {
    pub max_hops: Option<u32>,
    pub importance_top_k: Option<usize>,
}

/// Everything one retrieval pass produced
#[derive(Debug, Clone)]
pub struct RetrievalReport {
    pub seeds: ResolvedSeeds,
    pub candidate_count: usize,
    pub fusion: FusionOutcome,
    /// Serialized winning subgraph
    pub context: String,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// A retrieval pass plus the generated answer
#[derive(Debug, Clone)]
pub struct AnswerReport {
    pub retrieval: RetrievalReport,
    /// `None` when the pass was cancelled before an answer was generated
    pub answer: Option<String>,
}

/// Graph RAG pipeline
pub struct GraphRagPipeline {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LanguageModel>,
    resolver: SeedResolver,
    builder: SubgraphBuilder,
    fuser: SubgraphFuser,
    settings: RetrievalConfig,
}

impl GraphRagPipeline {
    pub fn new(components: PipelineComponents, vector: &VectorConfig, settings: RetrievalConfig) -> Self {
        let PipelineComponents {
            graph,
            vectors,
            embedder,
            llm,
            evaluator,
        } = components;

        Self {
            resolver: SeedResolver::new(
                Arc::clone(&llm),
                embedder,
                Arc::clone(&vectors),
                vector.collection.clone(),
                vector.top_k,
            ),
            builder: SubgraphBuilder::new(Arc::clone(&graph), settings.projection_prefix.clone()),
            fuser: SubgraphFuser::new(evaluator, settings.evaluation_concurrency),
            graph,
            vectors,
            llm,
            settings,
        }
    }

    /// Build every collaborator from configuration
    ///
    /// With the memory graph and memory vector backends, the snapshot's
    /// entities are embedded into the vector index at start-up.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_language_model(&config.llm)?;

        let (graph, snapshot): (Arc<dyn GraphStore>, Vec<Entity>) = match config.graph.backend {
            GraphBackend::Memory => {
                let store = graph::load_memory_store(&config.graph).await?;
                let entities = store.graph().nodes().to_vec();
                (Arc::new(store), entities)
            }
            GraphBackend::Neo4j => (graph::create_graph_store(&config.graph).await?, Vec::new()),
        };

        let vectors: Arc<dyn VectorStore> = match config.vector.backend {
            VectorBackend::Memory => {
                let store = MemoryVectorStore::new();
                if !snapshot.is_empty() {
                    store
                        .index_entities(&config.vector.collection, &snapshot, embedder.as_ref())
                        .await?;
                }
                Arc::new(store)
            }
            _ => vector::create_vector_store(&config.vector, config.database.as_ref()).await?,
        };

        let base = LlmEvaluator::new(Arc::clone(&llm));
        let evaluator: Arc<dyn SubgraphEvaluator> = match Cache::from_settings(&config.cache).await {
            Ok(Some(cache)) => {
                info!("Evaluation cache enabled");
                Arc::new(CachedEvaluator::new(base, Arc::new(cache)))
            }
            Ok(None) => Arc::new(base),
            Err(e) => {
                warn!(error = %e, "Evaluation cache unavailable, continuing without it");
                Arc::new(base)
            }
        };

        info!(
            graph = ?config.graph.backend,
            vector = ?config.vector.backend,
            embedding_model = embedder.model_name(),
            llm_model = llm.model_name(),
            "Retrieval pipeline ready"
        );

        Ok(Self::new(
            PipelineComponents {
                graph,
                vectors,
                embedder,
                llm,
                evaluator,
            },
            &config.vector,
            config.retrieval.clone(),
        ))
    }

    /// Ping the graph and vector stores; either failing is fatal at start-up
    pub async fn verify_connectivity(&self) -> Result<()> {
        let (graph, vectors) = tokio::join!(self.graph.ping(), self.vectors.ping());
        graph.map_err(|e| AppError::ServiceUnavailable {
            message: format!("graph store unreachable: {}", e),
        })?;
        vectors.map_err(|e| AppError::ServiceUnavailable {
            message: format!("vector store unreachable: {}", e),
        })?;
        Ok(())
    }

    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    fn build_options(&self, options: RetrieveOptions) -> BuildOptions {
        BuildOptions {
            max_hops: options.max_hops.unwrap_or(self.settings.max_hops),
            importance_top_k: options.importance_top_k.unwrap_or(self.settings.importance_top_k),
        }
    }

    /// One retrieval pass
    ///
    /// Cancellation never fails the pass: it returns the best subgraph
    /// selected so far, or the empty-context message.
    pub async fn retrieve(
        &self,
        query: &str,
        options: RetrieveOptions,
        cancel: &CancellationToken,
    ) -> RetrievalReport {
        let started = Instant::now();

        let (seeds, seeds_cancelled) = tokio::select! {
            biased;
            _ = cancel.cancelled() => (ResolvedSeeds::default(), true),
            seeds = self.resolver.resolve(query) => (seeds, false),
        };

        let candidates = self
            .builder
            .build_seeds(
                &seeds.merged,
                self.build_options(options),
                self.settings.builder_concurrency,
                cancel,
            )
            .await;
        let build_cancelled = seeds_cancelled || cancel.is_cancelled();
        let candidate_count = candidates.len();
        info!(
            seeds = seeds.merged.len(),
            candidates = candidate_count,
            "Collected candidate subgraphs"
        );

        let fusion = self.fuser.fuse(query, candidates, cancel).await;
        let context = serialize_subgraph(&fusion.subgraph);
        let cancelled = build_cancelled || fusion.cancelled;

        let elapsed = started.elapsed();
        let outcome = if cancelled {
            "cancelled"
        } else if fusion.winner.is_some() {
            "selected"
        } else {
            "empty"
        };
        metrics::record_retrieval(elapsed.as_secs_f64(), seeds.merged.len(), outcome);

        RetrievalReport {
            seeds,
            candidate_count,
            fusion,
            context,
            cancelled,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Retrieve, then answer from the retrieved context only
    ///
    /// A failing answer call is an error; a cancelled pass skips it.
    pub async fn answer(
        &self,
        query: &str,
        options: RetrieveOptions,
        cancel: &CancellationToken,
    ) -> Result<AnswerReport> {
        let retrieval = self.retrieve(query, options, cancel).await;
        if retrieval.cancelled {
            return Ok(AnswerReport {
                retrieval,
                answer: None,
            });
        }

        let prompt = prompts::final_answer_prompt(
            &retrieval.context,
            query,
            self.settings.answer_language.as_deref(),
        );

        let started = Instant::now();
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            answer = self.llm.complete(&prompt) => {
                metrics::record_llm(started.elapsed().as_secs_f64(), "answer", answer.is_ok());
                Some(answer?)
            }
        };

        Ok(AnswerReport { retrieval, answer })
    }
}
