//! Qdrant REST client

use super::{vector_error, ScoredName, VectorStore};
use async_trait::async_trait;
use kgfusion_common::config::VectorConfig;
use kgfusion_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Vector store backed by a Qdrant collection
///
/// Points carry the entity name in `payload.name`.
pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantVectorStore {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ping(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET, "/collections")
            .send()
            .await
            .map_err(|e| vector_error(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(vector_error(format!("HTTP {}", response.status())));
        }
        Ok(())
    }

    async fn search(&self, collection: &str, embedding: &[f32], limit: usize) -> Result<Vec<ScoredName>> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", collection),
            )
            .json(&SearchRequest {
                vector: embedding,
                limit,
                with_payload: true,
            })
            .send()
            .await
            .map_err(|e| vector_error(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(vector_error(format!("HTTP {}: {}", status, body)));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| vector_error(format!("Failed to parse response: {}", e)))?;

        Ok(body
            .result
            .into_iter()
            .filter_map(|point| {
                let name = point.payload?.get("name")?.as_str()?.to_string();
                Some(ScoredName {
                    name,
                    score: point.score,
                })
            })
            .collect())
    }
}
