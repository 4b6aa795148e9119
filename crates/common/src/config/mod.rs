//! Configuration management for kgfusion services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Graph store configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Vector store configuration
    #[serde(default)]
    pub vector: VectorConfig,

    /// Relational database (pgvector backend only)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval and fusion tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Evaluation cache (Redis)
    #[serde(default)]
    pub cache: CacheSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

/// Which graph store implementation to use
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GraphBackend {
    Neo4j,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_backend")]
    pub backend: GraphBackend,

    /// Neo4j HTTP endpoint
    #[serde(default = "default_graph_url")]
    pub url: String,

    #[serde(default = "default_graph_user")]
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_graph_database")]
    pub database: String,

    /// Node property used as the join key between graph and vector stores
    #[serde(default = "default_name_property")]
    pub name_property: String,

    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    /// JSON snapshot loaded by the memory backend
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

/// Which vector store implementation to use
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    Qdrant,
    Pgvector,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    #[serde(default = "default_vector_backend")]
    pub backend: VectorBackend,

    /// Qdrant REST endpoint
    #[serde(default = "default_vector_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Collection namespace searched for seed entities
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Number of nearest entities used as seeds
    #[serde(default = "default_vector_top_k")]
    pub top_k: usize,

    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    /// Table holding entity vectors (pgvector backend)
    #[serde(default = "default_vector_table")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: huggingface, openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: gemini, openai
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    pub api_key: Option<String>,

    /// Full endpoint URL override
    pub endpoint: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Upper bound of the multi-hop expansion
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,

    /// Number of PageRank hubs used by the importance strategy
    #[serde(default = "default_importance_top_k")]
    pub importance_top_k: usize,

    /// Seeds built concurrently
    #[serde(default = "default_concurrency")]
    pub builder_concurrency: usize,

    /// Evaluator calls in flight
    #[serde(default = "default_concurrency")]
    pub evaluation_concurrency: usize,

    /// Prefix for transient graph projection names
    #[serde(default = "default_projection_prefix")]
    pub projection_prefix: String,

    /// Language the final answer is written in (model default when unset)
    #[serde(default)]
    pub answer_language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Redis URL; caching disabled when unset
    pub url: Option<String>,

    #[serde(default = "default_cache_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_evaluation_ttl")]
    pub evaluation_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_graph_backend() -> GraphBackend { GraphBackend::Neo4j }
fn default_graph_url() -> String { "http://localhost:7474".to_string() }
fn default_graph_user() -> String { "neo4j".to_string() }
fn default_graph_database() -> String { "neo4j".to_string() }
fn default_name_property() -> String { "name".to_string() }
fn default_store_timeout() -> u64 { 30 }
fn default_vector_backend() -> VectorBackend { VectorBackend::Qdrant }
fn default_vector_url() -> String { "http://localhost:6333".to_string() }
fn default_collection() -> String { "football_news".to_string() }
fn default_vector_top_k() -> usize { 3 }
fn default_vector_table() -> String { "entity_vectors".to_string() }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "huggingface".to_string() }
fn default_embedding_model() -> String { "BAAI/bge-m3".to_string() }
fn default_embedding_dimension() -> usize { 1024 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_retries() -> u32 { 3 }
fn default_llm_provider() -> String { "gemini".to_string() }
fn default_llm_model() -> String { "gemini-2.0-flash".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> usize { 2048 }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_retries() -> u32 { 2 }
fn default_max_hops() -> u32 { 10 }
fn default_importance_top_k() -> usize { 5 }
fn default_concurrency() -> usize { 4 }
fn default_projection_prefix() -> String { "gds-temp-graph-".to_string() }
fn default_cache_prefix() -> String { "kgfusion".to_string() }
fn default_evaluation_ttl() -> u64 { 3600 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "kgfusion".to_string() }
fn default_rate_limit() -> u32 { 10 }
fn default_burst() -> u32 { 20 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__GRAPH__URL=http://neo4j:7474
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            graph: GraphConfig::default(),
            vector: VectorConfig::default(),
            database: None,
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheSettings::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: default_graph_backend(),
            url: default_graph_url(),
            user: default_graph_user(),
            password: None,
            database: default_graph_database(),
            name_property: default_name_property(),
            timeout_secs: default_store_timeout(),
            snapshot_path: None,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: default_vector_url(),
            api_key: None,
            collection: default_collection(),
            top_k: default_vector_top_k(),
            timeout_secs: default_store_timeout(),
            table: default_vector_table(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_retries(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            endpoint: None,
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            importance_top_k: default_importance_top_k(),
            builder_concurrency: default_concurrency(),
            evaluation_concurrency: default_concurrency(),
            projection_prefix: default_projection_prefix(),
            answer_language: None,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: default_cache_prefix(),
            evaluation_ttl_secs: default_evaluation_ttl(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retrieval.max_hops, 10);
        assert_eq!(config.retrieval.importance_top_k, 5);
        assert_eq!(config.vector.top_k, 3);
        assert_eq!(config.embedding.dimension, 1024);
        assert_eq!(config.graph.name_property, "name");
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "graph": { "backend": "memory" },
            "retrieval": { "max_hops": 3 }
        }))
        .unwrap();

        assert_eq!(config.graph.backend, GraphBackend::Memory);
        assert_eq!(config.graph.database, "neo4j");
        assert_eq!(config.retrieval.max_hops, 3);
        assert_eq!(config.retrieval.projection_prefix, "gds-temp-graph-");
        assert_eq!(config.vector.backend, VectorBackend::Qdrant);
        assert!(config.database.is_none());
    }
}
