//! Text-generation provider implementations.
//!
//! Concrete backends for the core
//! [`LlmProvider`](runbook_rag_core::collaborators::LlmProvider) trait:
//! - **[`DisabledLlm`]**: returns errors; used when generation is not configured.
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions` with system and user messages.
//! - **[`OllamaChat`]**: `POST /api/chat` on a local Ollama instance, non-streaming.
//!
//! Both HTTP providers share the retry/backoff policy in [`crate::http`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use runbook_rag_core::collaborators::{GenerationConfig as LlmParams, LlmProvider, Prompt};

use crate::config::GenerationConfig;
use crate::http::{join_url, JsonEndpoint};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

/// Create the [`LlmProvider`] named by `config.provider`.
pub fn create_llm_provider(config: &GenerationConfig) -> Result<Arc<dyn LlmProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledLlm)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledLlm;

#[async_trait]
impl LlmProvider for DisabledLlm {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate_text(&self, _prompt: &Prompt, _config: &LlmParams) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

// ============ OpenAI ============

/// Chat-completions client. Requires `OPENAI_API_KEY`.
pub struct OpenAIChat {
    model: String,
    name: String,
    endpoint: JsonEndpoint,
}

impl OpenAIChat {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);

        Ok(Self {
            name: format!("openai:{}", model),
            model,
            endpoint: JsonEndpoint::new(
                join_url(base, "v1/chat/completions"),
                Some(api_key),
                config.timeout_secs,
                config.max_retries,
                "OpenAI",
            )?,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAIChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_text(&self, prompt: &Prompt, params: &LlmParams) -> Result<String> {
        let body = serde_json::json!({
            "model": params.model.as_deref().unwrap_or(&self.model),
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "temperature": params.temperature,
            "max_tokens": params.max_output_tokens,
        });
        let json = self.endpoint.post(&body).await?;
        parse_openai_chat(&json)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

/// Ollama chat client (`stream: false`).
pub struct OllamaChat {
    model: String,
    name: String,
    endpoint: JsonEndpoint,
}

impl OllamaChat {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());
        let base = config.url.as_deref().unwrap_or(OLLAMA_BASE_URL);

        Ok(Self {
            name: format!("ollama:{}", model),
            model,
            endpoint: JsonEndpoint::new(
                join_url(base, "api/chat"),
                None,
                config.timeout_secs,
                config.max_retries,
                "Ollama",
            )?,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_text(&self, prompt: &Prompt, params: &LlmParams) -> Result<String> {
        let body = serde_json::json!({
            "model": params.model.as_deref().unwrap_or(&self.model),
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_output_tokens,
            },
        });
        let json = self.endpoint.post(&body).await.map_err(|e| {
            anyhow::anyhow!("{} (is Ollama running at {}?)", e, self.endpoint.url())
        })?;
        parse_ollama_chat(&json)
    }
}

fn parse_ollama_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
}
