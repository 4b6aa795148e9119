//! Language model clients
//!
//! Text completion is used three ways: extracting seed keywords from the
//! query, scoring candidate subgraphs, and writing the final answer. All three
//! go through the [`LanguageModel`] trait so tests and alternate providers can
//! slot in.

pub mod json;

pub use json::{extract_json_candidate, parse_llm_json};

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Trait for text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a single prompt, returning the raw response text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Client errors other than timeouts and throttling will fail the same way again
fn api_error(status: reqwest::StatusCode, body: String) -> AppError {
    let retryable = status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
    if retryable {
        AppError::LanguageModel {
            message: format!("API error {}: {}", status, body),
        }
    } else {
        AppError::LanguageModelRejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

/// Retry transient failures with exponential backoff
async fn with_retries<F, Fut>(max_retries: u32, model: &str, mut call: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_millis(200 * 2_u64.pow(attempt));
            tokio::time::sleep(delay).await;
        }

        match call().await {
            Ok(text) => return Ok(text),
            Err(e) if !e.is_transient() => {
                tracing::warn!(model = model, error = %e, "Language model request rejected");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    model = model,
                    attempt = attempt + 1,
                    max_retries = max_retries,
                    error = %e,
                    "Language model request failed"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AppError::LanguageModel {
        message: "no attempt was made".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: usize,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

/// Google Gemini `generateContent` client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "llm.api_key is required for the gemini provider".to_string(),
        })?;

        let endpoint = config.endpoint.clone().unwrap_or_else(|| {
            format!("{}/{}:generateContent", GEMINI_BASE_URL, config.model)
        });

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            endpoint,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    async fn make_request(&self, prompt: &str) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LanguageModel {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, body));
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| AppError::LanguageModel {
            message: format!("Failed to parse response: {}", e),
        })?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| AppError::LanguageModel {
                message: "No text in response".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        with_retries(self.max_retries, &self.model, || self.make_request(prompt)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// Chat completions client for OpenAI and compatible endpoints (xAI, vLLM, ...)
pub struct OpenAiChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "llm.api_key is required for the openai provider".to_string(),
        })?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    async fn make_request(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LanguageModel {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, body));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| AppError::LanguageModel {
            message: format!("Failed to parse response: {}", e),
        })?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::LanguageModel {
                message: "Empty response from LLM".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        with_retries(self.max_retries, &self.model, || self.make_request(prompt)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Create a language model client based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::new(config)?)),
        "openai" | "xai" => Ok(Arc::new(OpenAiChatClient::new(config)?)),
        other => Err(AppError::Configuration {
            message: format!("Unknown llm provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(provider: &str, endpoint: String) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            api_key: Some("test-key".to_string()),
            endpoint: Some(endpoint),
            max_retries: 0,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_gemini_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "[\"Son\"]"}]}}]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config("gemini", format!("{}/generate", server.uri()))).unwrap();
        assert_eq!(client.complete("who?").await.unwrap(), "[\"Son\"]");
    }

    #[tokio::test]
    async fn test_gemini_empty_candidates_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config("gemini", server.uri())).unwrap();
        let err = client.complete("who?").await.unwrap_err();
        assert!(matches!(err, AppError::LanguageModel { .. }));
    }

    #[tokio::test]
    async fn test_openai_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "answer"}}]
            })))
            .mount(&server)
            .await;

        let mut cfg = config("openai", server.uri());
        cfg.max_retries = 1;
        let client = OpenAiChatClient::new(&cfg).unwrap();
        assert_eq!(client.complete("q").await.unwrap(), "answer");
    }

    #[tokio::test]
    async fn test_rejected_request_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config("openai", server.uri());
        cfg.max_retries = 3;
        let client = OpenAiChatClient::new(&cfg).unwrap();
        match client.complete("q").await.unwrap_err() {
            AppError::LanguageModelRejected { status, .. } => assert_eq!(status, 401),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let cfg = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_language_model(&cfg),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_unknown_provider() {
        let cfg = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            api_key: Some("k".to_string()),
            ..LlmConfig::default()
        };
        assert!(create_language_model(&cfg).is_err());
    }
}
