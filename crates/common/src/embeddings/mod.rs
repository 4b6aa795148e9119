//! Embedding service abstraction
//!
//! Queries and stored entities must land in the same vector space, so every
//! caller obtains its embedder from [`create_embedder`] with the same config.
//! Providers:
//! - Hugging Face inference `feature-extraction` pipeline (BAAI/bge-m3 by default)
//! - OpenAI-compatible `/embeddings`
//! - Local feature hashing (offline development and tests)

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

const HF_INFERENCE_BASE: &str = "https://router.huggingface.co/hf-inference/models";
const OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Wire protocol spoken by [`HttpEmbedder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingApi {
    /// `POST {base}/{model}/pipeline/feature-extraction` with `{"inputs": [...]}`
    HuggingFace,
    /// `POST {base}/embeddings` with `{"input": [...], "model": ...}`
    OpenAi,
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

/// Remote embedding client
pub struct HttpEmbedder {
    client: reqwest::Client,
    api: EmbeddingApi,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    url: String,
    timeout_ms: u64,
    max_retries: u32,
}

impl HttpEmbedder {
    pub fn new(api: EmbeddingApi, config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let url = match api {
            EmbeddingApi::HuggingFace => format!(
                "{}/{}/pipeline/feature-extraction",
                config.api_base.as_deref().unwrap_or(HF_INFERENCE_BASE),
                config.model
            ),
            EmbeddingApi::OpenAi => format!(
                "{}/embeddings",
                config.api_base.as_deref().unwrap_or(OPENAI_BASE)
            ),
        };

        Ok(Self {
            client,
            api,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            url,
            timeout_ms: config.timeout_secs * 1000,
            max_retries: config.max_retries,
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff with jitter
                let base = 100 * 2_u64.pow(attempt);
                let jitter = rand::thread_rng().gen_range(0..=base / 2);
                tokio::time::sleep(Duration::from_millis(base + jitter)).await;
            }

            let started = Instant::now();
            let result = self.make_request(texts).await;
            metrics::record_embedding(
                started.elapsed().as_secs_f64(),
                &self.model,
                texts.len(),
                result.is_ok(),
            );

            match result {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    tracing::warn!(
                        model = %self.model,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut request = self.client.post(&self.url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        request = match self.api {
            EmbeddingApi::HuggingFace => request.json(&FeatureExtractionRequest { inputs: texts }),
            EmbeddingApi::OpenAi => request.json(&OpenAIRequest {
                input: texts,
                model: &self.model,
            }),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::EmbeddingTimeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                AppError::EmbeddingError {
                    message: format!("Request failed: {}", e),
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let embeddings = match self.api {
            EmbeddingApi::HuggingFace => response.json::<Vec<Vec<f32>>>().await,
            EmbeddingApi::OpenAi => response
                .json::<OpenAIResponse>()
                .await
                .map(|r| r.data.into_iter().map(|e| e.embedding).collect()),
        }
        .map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to parse response: {}", e),
        })?;

        if embeddings.len() != texts.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    embeddings.len()
                ),
            });
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        const BATCH_SIZE: usize = 64;

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic feature-hashing embedder
///
/// Lowercased whitespace tokens are hashed into buckets with a sign bit, then
/// the vector is L2-normalised. Texts sharing tokens get positive cosine
/// similarity, which is enough for offline runs against the memory stores.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.hash_text(t)).collect())
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "huggingface" => Ok(Arc::new(HttpEmbedder::new(EmbeddingApi::HuggingFace, config)?)),
        "openai" => {
            if config.api_key.is_none() {
                return Err(AppError::Configuration {
                    message: "embedding.api_key is required for the openai provider".to_string(),
                });
            }
            Ok(Arc::new(HttpEmbedder::new(EmbeddingApi::OpenAi, config)?))
        }
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hf_config(base: String) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "huggingface".to_string(),
            api_key: Some("hf-token".to_string()),
            api_base: Some(base),
            model: "BAAI/bge-m3".to_string(),
            dimension: 3,
            max_retries: 0,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_huggingface_feature_extraction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/BAAI/bge-m3/pipeline/feature-extraction"))
            .and(header("Authorization", "Bearer hf-token"))
            .and(body_json(json!({"inputs": ["Son", "LAFC"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]])))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(EmbeddingApi::HuggingFace, &hf_config(server.uri())).unwrap();
        let vectors = embedder
            .embed_batch(&["Son".to_string(), "LAFC".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn test_openai_embeddings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [1.0, 0.0]}]
            })))
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            api_base: Some(server.uri()),
            max_retries: 0,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.embed("query").await.unwrap(), vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_api_error_surfaces_as_embedding_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model loading"))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(EmbeddingApi::HuggingFace, &hf_config(server.uri())).unwrap();
        let err = embedder.embed("q").await.unwrap_err();
        assert!(matches!(err, AppError::EmbeddingError { .. }));
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Son Heung-min LAFC").await.unwrap();
        let b = embedder.embed("son heung-min lafc").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_shared_tokens_are_closer() {
        let embedder = HashingEmbedder::new(4096);
        let query = embedder.embed("Tottenham captain").await.unwrap();
        let related = embedder.embed("Tottenham Hotspur").await.unwrap();
        let unrelated = embedder.embed("Europa League").await.unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(create_embedder(&config), Err(AppError::Configuration { .. })));
    }
}
