//! Embedding provider implementations.
//!
//! Concrete backends for the core
//! [`EmbeddingProvider`](runbook_rag_core::embedding::EmbeddingProvider)
//! trait:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`HashEmbedder`]**: deterministic feature hashing, fully offline.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: runs models locally via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! # Provider Selection
//!
//! Use [`create_embedding_provider`] to instantiate the appropriate provider
//! based on the configuration:
//!
//! ```rust,no_run
//! # use runbook_rag::config::EmbeddingConfig;
//! # use runbook_rag::embedding::create_embedding_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_embedding_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

mod hash;

pub use hash::HashEmbedder;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use runbook_rag_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;
use crate::http::{join_url, JsonEndpoint};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"hash"` | [`HashEmbedder`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires `local-embeddings-fastembed`) |
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims.unwrap_or(0))?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// An embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model, splitting large
/// inputs into requests of at most `batch_size` texts. Requires the
/// `OPENAI_API_KEY` environment variable. `embedding.url` overrides the
/// base URL for OpenAI-compatible gateways.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    batch_size: usize,
    endpoint: JsonEndpoint,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);

        Ok(Self {
            model,
            dims,
            batch_size: config.batch_size.max(1),
            endpoint: JsonEndpoint::new(
                join_url(base, "v1/embeddings"),
                Some(api_key),
                config.timeout_secs,
                config.max_retries,
                "OpenAI",
            )?,
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

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        single(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self.endpoint.post(&body).await?;
            let vectors = parse_openai_response(&json)?;
            check_count(batch.len(), vectors.len())?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
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
        indexed.push((index, to_f32_vec(embedding)));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured Ollama URL (default:
/// `http://localhost:11434`). Requires Ollama to be running with an
/// embedding model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    batch_size: usize,
    endpoint: JsonEndpoint,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_BASE_URL);

        Ok(Self {
            model,
            dims,
            batch_size: config.batch_size.max(1),
            endpoint: JsonEndpoint::new(
                join_url(base, "api/embed"),
                None,
                config.timeout_secs,
                config.max_retries,
                "Ollama",
            )?,
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

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        single(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self.endpoint.post(&body).await.map_err(|e| {
                anyhow::anyhow!("{} (is Ollama running at {}?)", e, self.endpoint.url())
            })?;
            let vectors = parse_ollama_response(&json)?;
            check_count(batch.len(), vectors.len())?;
            out.extend(vectors);
        }
        Ok(out)
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
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| {
                    anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
                })
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached.
/// After the initial download, embeddings run entirely offline.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Validate the name up front so misconfiguration fails at startup.
        fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            _ => 384,
        });
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size.max(1),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
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

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        single(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = fastembed_model(&self.model_name)?;
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(false),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

// ============ Helpers ============

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

fn check_count(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        bail!(
            "Embedding response had {} vectors for {} inputs",
            got,
            expected
        );
    }
    Ok(())
}

fn single(mut vectors: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    vectors
        .pop()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}
