//! Embedding provider implementations.
//!
//! Concrete backends for the core [`EmbeddingProvider`] trait:
//! - **[`DisabledProvider`]**: always fails; classification falls back to the default category.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`LocalProvider`]**: runs a model locally via fastembed; no network calls after model download.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] once at startup. The returned provider is shared
//! read-only by the classification service for the whole process.
//!
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use blog_harvest::config::EmbeddingConfig;
//! use blog_harvest::embedding::create_provider;
//!
//! let config = EmbeddingConfig {
//!     provider: "disabled".to_string(),
//!     ..Default::default()
//! };
//! let provider = create_provider(&config).await?;
//! assert_eq!(provider.model_name(), "disabled");
//! # Ok(())
//! # }
//! ```
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama providers send each request through a
//! [`RetryPolicy`] with `embedding.max_retries` retries and a 1s base delay
//! (1s, 2s, 4s, ...):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use blog_harvest_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;
use crate::retry::RetryPolicy;

const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Failure of one embedding API request.
#[derive(Debug, Error)]
enum RequestError {
    /// Network error, rate limit, or server error.
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Rejected(String),
}

impl RequestError {
    fn from_status(api: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{} API error {}: {}", api, status, body);
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            RequestError::Transient(message)
        } else {
            RequestError::Rejected(message)
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, RequestError::Transient(_))
    }
}

/// POST a JSON body and return the JSON response, retrying transient failures.
///
/// `build` creates a fresh request per attempt. `unreachable` describes a
/// network failure to the user.
async fn post_json(
    retry: &RetryPolicy,
    api: &str,
    unreachable: &str,
    build: impl Fn() -> reqwest::RequestBuilder,
) -> Result<serde_json::Value> {
    let build = &build;
    let value = retry
        .run_if(
            api,
            move || async move {
                let response = build()
                    .send()
                    .await
                    .map_err(|e| RequestError::Transient(format!("{unreachable}: {e}")))?;
                let status = response.status();
                if status.is_success() {
                    return response.json::<serde_json::Value>().await.map_err(|e| {
                        RequestError::Rejected(format!("{api} returned invalid JSON: {e}"))
                    });
                }
                let body = response.text().await.unwrap_or_default();
                Err(RequestError::from_status(api, status, &body))
            },
            RequestError::is_transient,
        )
        .await?;
    Ok(value)
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"`. Every article is then
/// dropped by the enricher, so this is only useful for `classify` dry runs
/// and for inspecting listings.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls the `POST /v1/embeddings` endpoint with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable (a `.env` file is
/// loaded at startup).
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "text-embedding-3-small".to_string());

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims: config.dims,
            api_key,
            retry: RetryPolicy::new(config.max_retries, BACKOFF_BASE),
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dims,
        });

        let json = post_json(&self.retry, "OpenAI", "OpenAI request failed", || {
            self.client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding` arrays, ordered by their `index` field.
///
/// Non-numeric components become NaN so the validation gate rejects the
/// vector instead of silently zero-filling it.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        indexed.push((index, json_floats(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn json_floats(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32).unwrap_or(f32::NAN))
        .collect()
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured Ollama URL (default: `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims: config.dims,
            url,
            retry: RetryPolicy::new(config.max_retries, BACKOFF_BASE),
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let unreachable = format!("Ollama connection error (is Ollama running at {}?)", self.url);
        let endpoint = format!("{}/api/embed", self.url);
        let json = post_json(&self.retry, "Ollama", &unreachable, || {
            self.client.post(&endpoint).json(&body)
        })
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| json_floats(values))
                .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed.
///
/// The model is downloaded on first use from Hugging Face and cached, then
/// loaded once and kept for the life of the process. Inference runs on the
/// blocking thread pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub async fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "bge-base-en-v1.5".to_string());
        let fastembed_model = config_to_fastembed_model(&model_name)?;

        tracing::info!(model = %model_name, "Loading local embedding model");
        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))
        })
        .await??;

        Ok(Self {
            model_name,
            dims: config.dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("Local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5",
            other
        ),
    }
}

/// Create the configured [`EmbeddingProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires the `local-embeddings-fastembed` feature) |
pub async fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config).await?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_non_numeric_becomes_nan() {
        let json = serde_json::json!({ "embeddings": [[0.5, null]] });
        let vectors = parse_ollama_response(&json).unwrap();
        assert!(vectors[0][1].is_nan());
    }

    #[test]
    fn test_parse_openai_missing_data() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn test_rate_limits_and_server_errors_are_transient() {
        use reqwest::StatusCode;

        assert!(RequestError::from_status("OpenAI", StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(RequestError::from_status("OpenAI", StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!RequestError::from_status("OpenAI", StatusCode::UNAUTHORIZED, "").is_transient());
        assert!(!RequestError::from_status("Ollama", StatusCode::NOT_FOUND, "").is_transient());

        let err = RequestError::from_status("Ollama", StatusCode::BAD_REQUEST, "model not found");
        assert_eq!(err.to_string(), "Ollama API error 400 Bad Request: model not found");
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let provider = DisabledProvider;
        assert!(provider.embed(&["hello".to_string()]).await.is_err());
    }
}
