//! Redis cache integration
//!
//! Used to memoise evaluator verdicts: the same query against the same
//! rendered subgraph and model always costs one LLM call per TTL window.

use crate::config::CacheSettings;
use crate::errors::{AppError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// Redis cache client
pub struct Cache {
    connection: RwLock<MultiplexedConnection>,
    key_prefix: String,
    default_ttl_secs: u64,
}

impl Cache {
    /// Connect to Redis; returns `None` when caching is not configured
    pub async fn from_settings(settings: &CacheSettings) -> Result<Option<Self>> {
        match &settings.url {
            Some(url) => Ok(Some(
                Self::connect(url, &settings.key_prefix, settings.evaluation_ttl_secs).await?,
            )),
            None => Ok(None),
        }
    }

    /// Create a new cache client
    pub async fn connect(url: &str, key_prefix: &str, default_ttl_secs: u64) -> Result<Self> {
        let client = Client::open(url).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection: RwLock::new(connection),
            key_prefix: key_prefix.to_string(),
            default_ttl_secs,
        })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.key(key);
        let mut conn = self.connection.write().await;

        let value: Option<String> = conn.get(&full_key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to get key '{}': {}", full_key, e),
        })?;

        match value {
            Some(json) => {
                let parsed = serde_json::from_str(&json).map_err(|e| AppError::CacheError {
                    message: format!("Failed to parse cached value: {}", e),
                })?;
                debug!(key = %full_key, "Cache hit");
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Set a value in cache with default TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl_secs).await
    }

    /// Set a value in cache with custom TTL
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let full_key = self.key(key);
        let json = serde_json::to_string(value).map_err(|e| AppError::CacheError {
            message: format!("Failed to serialize value: {}", e),
        })?;

        let mut conn = self.connection.write().await;
        conn.set_ex::<_, _, ()>(&full_key, &json, ttl_secs)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", full_key, e),
            })?;

        debug!(key = %full_key, ttl_secs, "Cache set");
        Ok(())
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.write().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

/// Cache key builder helpers
pub mod keys {
    use sha2::{Digest, Sha256};

    /// Key for an evaluator verdict
    ///
    /// The model name is part of the key so switching models never serves
    /// stale scores.
    pub fn evaluation(model: &str, query: &str, rendered_subgraph: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(query.as_bytes());
        hasher.update([0u8]);
        hasher.update(rendered_subgraph.as_bytes());
        format!("eval:{}", hex::encode(hasher.finalize()))
    }
}
