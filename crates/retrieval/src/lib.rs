//! kgfusion retrieval engine
//!
//! Resolves seed entities for a question, builds candidate subgraphs around
//! each seed with three traversal strategies, lets a language model score the
//! candidates and serializes the winner as answer context.

pub mod builder;
pub mod fusion;
pub mod graph;
pub mod pipeline;
pub mod seeds;
pub mod serializer;
pub mod vector;

pub use builder::{BuildOptions, SubgraphBuilder};
pub use fusion::{FusionOutcome, SubgraphEvaluator, SubgraphFuser, Winner};
pub use graph::GraphStore;
pub use pipeline::{AnswerReport, GraphRagPipeline, PipelineComponents, RetrievalReport, RetrieveOptions};
pub use seeds::{merge_seed_names, ResolvedSeeds, SeedResolver};
pub use serializer::{serialize_subgraph, EMPTY_CONTEXT};
pub use vector::VectorStore;
