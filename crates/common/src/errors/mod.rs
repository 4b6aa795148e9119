//! Error types for kgfusion services
//!
//! Provides a single error enum shared by the library crates and the gateway:
//! - Distinct variants for each collaborator (graph store, vector store, embedding, LLM)
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidIdentifier,

    // Rate limiting (6xxx)
    RateLimited,

    // Storage errors (7xxx)
    GraphStoreError,
    VectorStoreError,
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    EmbeddingTimeout,
    LanguageModelError,
    LlmResponseParse,
    CacheError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    Cancelled,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidIdentifier => 1002,

            ErrorCode::RateLimited => 6001,

            ErrorCode::GraphStoreError => 7001,
            ErrorCode::VectorStoreError => 7002,
            ErrorCode::DatabaseError => 7003,
            ErrorCode::ConnectionError => 7004,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,
            ErrorCode::LanguageModelError => 8004,
            ErrorCode::LlmResponseParse => 8005,
            ErrorCode::CacheError => 8006,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::Cancelled => 9004,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid schema identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Storage errors
    #[error("Graph store error: {message}")]
    GraphStore { message: String },

    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Connection error: {message}")]
    Connection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    #[error("Language model rejected the request ({status}): {message}")]
    LanguageModelRejected { status: u16, message: String },

    #[error("Unparseable language model response: {message} (response: {excerpt})")]
    LlmResponseParse { message: String, excerpt: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidIdentifier { .. } => ErrorCode::InvalidIdentifier,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::GraphStore { .. } => ErrorCode::GraphStoreError,
            AppError::VectorStore { .. } => ErrorCode::VectorStoreError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::Connection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::LanguageModel { .. } | AppError::LanguageModelRejected { .. } => {
                ErrorCode::LanguageModelError
            }
            AppError::LlmResponseParse { .. } => ErrorCode::LlmResponseParse,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidIdentifier { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 499-style client abort is not a registered code; report as timeout
            AppError::Cancelled => StatusCode::REQUEST_TIMEOUT,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. }
            | AppError::EmbeddingTimeout { .. }
            | AppError::LanguageModel { .. }
            | AppError::LanguageModelRejected { .. }
            | AppError::LlmResponseParse { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::GraphStore { .. }
            | AppError::VectorStore { .. }
            | AppError::Connection { .. }
            | AppError::CacheError { .. }
            | AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            AppError::Validation { .. }
                | AppError::InvalidIdentifier { .. }
                | AppError::Configuration { .. }
                | AppError::LanguageModelRejected { .. }
        )
    }

    /// Build a parse error, keeping a bounded excerpt of the offending response
    pub fn llm_parse(message: impl Into<String>, raw: &str) -> Self {
        AppError::LlmResponseParse {
            message: message.into(),
            excerpt: raw.chars().take(200).collect(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
