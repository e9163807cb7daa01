//! Contracts for the external collaborators consumed by the core.
//!
//! Each is a small capability trait with one runtime-selected
//! implementation per deployment. Implementations report failures as
//! [`anyhow::Error`]; callers in the core wrap them into
//! [`RagError::Collaborator`](crate::RagError::Collaborator).
//!
//! [`EmbeddingProvider`](crate::embedding::EmbeddingProvider) lives in
//! [`crate::embedding`] next to the similarity metric.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Alert, EnrichedContext};

/// Document storage holding the runbook corpus. Used only by ingestion.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Names of every document under `source`, in a stable order.
    async fn list_documents(&self, source: &str) -> Result<Vec<String>>;

    /// Content of one document, or `None` if it no longer exists.
    async fn get_document_content(&self, source: &str, name: &str) -> Result<Option<String>>;
}

/// Generation parameters for one LLM call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Overrides the provider's configured model when set.
    pub model: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 1024,
            model: None,
        }
    }
}

/// A prompt split into the fixed system instruction and the per-request
/// user message.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Both parts as a single text, for providers without message roles.
    pub fn to_text(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// A generative text model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identifier recorded on generated checklists (e.g. `"openai:gpt-4o-mini"`).
    fn name(&self) -> &str;

    async fn generate_text(&self, prompt: &Prompt, config: &GenerationConfig) -> Result<String>;
}

/// Builds the query context for an alert. Opaque beyond this contract.
#[async_trait]
pub trait EnrichmentCollaborator: Send + Sync {
    async fn enrich(&self, alert: &Alert) -> Result<EnrichedContext>;
}
