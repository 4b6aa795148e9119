//! kgfusion common library
//!
//! Shared code for the retrieval library and its front ends:
//! - Graph data model (entities, relations, subgraphs)
//! - Error types and handling
//! - Configuration management
//! - Embedding and language model clients
//! - LLM JSON parsing and prompt templates
//! - Redis cache, Postgres pool, metrics

pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod prompts;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::LanguageModel;
pub use models::{Candidate, Entity, EvaluationResult, PropertyMap, PropertyValue, Relation, Strategy, Subgraph};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
