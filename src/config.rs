//! Configuration parsing and validation.
//!
//! Runbook RAG is configured via a TOML file (default: `config/rbk.toml`).
//! Every section is optional and every field has a default, so an empty
//! file yields a working offline setup with embeddings and generation
//! disabled.
//!
//! # Example
//!
//! ```toml
//! [chunking]
//! min_section_chars = 100
//! max_section_chars = 2000
//!
//! [retrieval]
//! top_k = 5
//! candidate_multiplier = 3
//! tag_boost = 0.05
//! target_boost = 0.10
//! max_boost = 0.15
//!
//! [embedding]
//! provider = "openai"            # "disabled" | "hash" | "openai" | "ollama" | "local"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"            # "disabled" | "openai" | "ollama"
//! model = "gpt-4o-mini"
//! temperature = 0.2
//!
//! [pipeline]
//! request_timeout_ms = 5000
//!
//! [storage]
//! root = "./runbooks"
//! include_globs = ["**/*.md"]
//!
//! [ingest]
//! concurrency = 4
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use runbook_rag_core::chunk::{
    ChunkingOptions, DEFAULT_MAX_SECTION_CHARS, DEFAULT_MIN_SECTION_CHARS,
};
use runbook_rag_core::collaborators::GenerationConfig as LlmParams;
use runbook_rag_core::generate::DEFAULT_MAX_CONTEXT_CHARS;
use runbook_rag_core::retrieve::{
    RetrievalPolicy, DEFAULT_CANDIDATE_MULTIPLIER, DEFAULT_MAX_BOOST, DEFAULT_TAG_BOOST,
    DEFAULT_TARGET_BOOST,
};

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

// ============ Chunking ============

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,
    #[serde(default = "default_max_section_chars")]
    pub max_section_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_section_chars: DEFAULT_MIN_SECTION_CHARS,
            max_section_chars: DEFAULT_MAX_SECTION_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkingOptions {
        ChunkingOptions {
            min_section_chars: self.min_section_chars,
            max_section_chars: self.max_section_chars,
        }
    }
}

fn default_min_section_chars() -> usize {
    DEFAULT_MIN_SECTION_CHARS
}
fn default_max_section_chars() -> usize {
    DEFAULT_MAX_SECTION_CHARS
}

// ============ Retrieval ============

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_tag_boost")]
    pub tag_boost: f32,
    #[serde(default = "default_target_boost")]
    pub target_boost: f32,
    #[serde(default = "default_max_boost")]
    pub max_boost: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            tag_boost: DEFAULT_TAG_BOOST,
            target_boost: DEFAULT_TARGET_BOOST,
            max_boost: DEFAULT_MAX_BOOST,
        }
    }
}

impl RetrievalConfig {
    pub fn policy(&self) -> RetrievalPolicy {
        RetrievalPolicy {
            candidate_multiplier: self.candidate_multiplier,
            tag_boost: self.tag_boost,
            target_boost: self.target_boost,
            max_boost: self.max_boost,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_candidate_multiplier() -> usize {
    DEFAULT_CANDIDATE_MULTIPLIER
}
fn default_tag_boost() -> f32 {
    DEFAULT_TAG_BOOST
}
fn default_target_boost() -> f32 {
    DEFAULT_TARGET_BOOST
}
fn default_max_boost() -> f32 {
    DEFAULT_MAX_BOOST
}

// ============ Embedding ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider (default: `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    3
}

// ============ Generation ============

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_context_chars: default_max_context_chars(),
            max_retries: default_generation_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    /// Per-call parameters handed to the LLM provider.
    pub fn params(&self) -> LlmParams {
        LlmParams {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            model: self.model.clone(),
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_max_context_chars() -> usize {
    DEFAULT_MAX_CONTEXT_CHARS
}
fn default_generation_retries() -> u32 {
    2
}

// ============ Pipeline / Storage / Ingest ============

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./runbooks")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

// ============ Loading ============

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_section_chars <= config.chunking.min_section_chars {
        bail!("chunking.max_section_chars must be > chunking.min_section_chars");
    }

    // Validate retrieval
    let retrieval = &config.retrieval;
    if retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if retrieval.candidate_multiplier < 1 {
        bail!("retrieval.candidate_multiplier must be >= 1");
    }
    for (name, value) in [
        ("tag_boost", retrieval.tag_boost),
        ("target_boost", retrieval.target_boost),
        ("max_boost", retrieval.max_boost),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("retrieval.{} must be a finite value >= 0", name);
        }
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }
    if embedding.is_enabled() && embedding.provider != "local" {
        if embedding.dims.is_none() || embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                embedding.provider
            );
        }
        if matches!(embedding.provider.as_str(), "openai" | "ollama") && embedding.model.is_none()
        {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    let generation = &config.generation;
    match generation.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if generation.max_output_tokens == 0 {
        bail!("generation.max_output_tokens must be > 0");
    }
    if generation.max_context_chars == 0 {
        bail!("generation.max_context_chars must be > 0");
    }

    if config.pipeline.request_timeout_ms == 0 {
        bail!("pipeline.request_timeout_ms must be > 0");
    }
    if config.ingest.concurrency == 0 {
        bail!("ingest.concurrency must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.min_section_chars, 100);
        assert_eq!(config.chunking.max_section_chars, 2000);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.candidate_multiplier, 3);
        assert!((config.retrieval.max_boost - 0.15).abs() < 1e-6);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.embedding.max_retries, 3);
        assert_eq!(config.generation.provider, "disabled");
        assert_eq!(config.generation.max_retries, 2);
        assert_eq!(config.pipeline.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.storage.include_globs, vec!["**/*.md"]);
        assert_eq!(config.ingest.concurrency, 4);
    }

    #[test]
    fn test_full_config_parses() {
        let config = parse_config(
            r#"
[chunking]
min_section_chars = 50
max_section_chars = 800

[retrieval]
top_k = 3
max_boost = 0.2

[embedding]
provider = "hash"
dims = 256

[generation]
provider = "ollama"
model = "llama3.1"
temperature = 0.0

[storage]
root = "/srv/runbooks"
exclude_globs = ["drafts/**"]
"#,
        )
        .unwrap();
        assert_eq!(config.chunking.options().max_section_chars, 800);
        assert_eq!(config.retrieval.policy().max_boost, 0.2);
        assert_eq!(config.embedding.dims, Some(256));
        let params = config.generation.params();
        assert_eq!(params.model.as_deref(), Some("llama3.1"));
        assert_eq!(params.temperature, 0.0);
        assert_eq!(config.storage.root, PathBuf::from("/srv/runbooks"));
    }

    #[test]
    fn test_rejects_inverted_chunk_bounds() {
        let err = parse_config("[chunking]\nmin_section_chars = 500\nmax_section_chars = 400\n")
            .unwrap_err();
        assert!(err.to_string().contains("max_section_chars"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_rejects_negative_boost() {
        assert!(parse_config("[retrieval]\ntag_boost = -0.1\n").is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_dims() {
        let err = parse_config("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_temperature_range() {
        assert!(parse_config("[generation]\ntemperature = 2.5\n").is_err());
        assert!(parse_config("[generation]\ntemperature = 2.0\n").is_ok());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../config/rbk.example.toml")).unwrap();
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.storage.exclude_globs, vec!["**/drafts/**"]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/rbk.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
