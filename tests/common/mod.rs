//! Deterministic collaborators shared by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use runbook_rag::rag_core::collaborators::{
    EnrichmentCollaborator, GenerationConfig, LlmProvider, Prompt, StorageAdapter,
};
use runbook_rag::rag_core::embedding::EmbeddingProvider;
use runbook_rag::rag_core::models::{Alert, EnrichedContext, Severity};

// ─── Embedding ──────────────────────────────────────────────────────

/// Bag-of-words over a fixed vocabulary: one dimension per term, counting
/// occurrences. Unknown words are ignored.
pub struct VocabularyEmbedder {
    vocabulary: Vec<&'static str>,
}

pub const VOCABULARY: &[&str] = &[
    "memory", "diagnose", "free", "disk", "gpu", "cpu", "network", "restart",
];

impl VocabularyEmbedder {
    pub fn new() -> Self {
        Self {
            vocabulary: VOCABULARY.to_vec(),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.vocabulary.len()];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .map(|t| t.to_lowercase())
        {
            if let Some(i) = self.vocabulary.iter().position(|w| *w == token) {
                v[i] += 1.0;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for VocabularyEmbedder {
    fn model_name(&self) -> &str {
        "vocabulary"
    }

    fn dims(&self) -> usize {
        self.vocabulary.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

// ─── Storage ────────────────────────────────────────────────────────

/// Documents held in memory. A document stored as `Err` fails on fetch.
#[derive(Default)]
pub struct MemoryStorage {
    docs: Mutex<BTreeMap<String, std::result::Result<String, String>>>,
}

impl MemoryStorage {
    pub fn with(docs: &[(&str, &str)]) -> Self {
        let storage = Self::default();
        for (name, text) in docs {
            storage.put(name, text);
        }
        storage
    }

    pub fn put(&self, name: &str, text: &str) {
        self.docs
            .lock()
            .insert(name.to_string(), Ok(text.to_string()));
    }

    pub fn fail(&self, name: &str, error: &str) {
        self.docs
            .lock()
            .insert(name.to_string(), Err(error.to_string()));
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn list_documents(&self, _source: &str) -> Result<Vec<String>> {
        Ok(self.docs.lock().keys().cloned().collect())
    }

    async fn get_document_content(&self, _source: &str, name: &str) -> Result<Option<String>> {
        match self.docs.lock().get(name) {
            Some(Ok(text)) => Ok(Some(text.clone())),
            Some(Err(error)) => anyhow::bail!("{}", error),
            None => Ok(None),
        }
    }
}

// ─── Generation ─────────────────────────────────────────────────────

/// Returns a canned answer (or error) and records every prompt.
pub struct ScriptedLlm {
    reply: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedLlm {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            reply: Err(error.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_text(&self, prompt: &Prompt, _config: &GenerationConfig) -> Result<String> {
        self.prompts.lock().push(prompt.clone());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(error) => anyhow::bail!("{}", error),
        }
    }
}

pub const CHECKLIST_REPLY: &str = "\
Summary: Memory pressure on the host.

1. [HIGH] Check free memory
   Rationale: Confirms the alert
   Current: 97%
   Expected: below 85%
   ```
   free -h
   ```
2. [MEDIUM] Restart the leaking service
   Rationale: Releases memory
";

// ─── Enrichment ─────────────────────────────────────────────────────

/// Copies the alert and sets a fixed resource shape.
pub struct ShapeEnricher(pub &'static str);

#[async_trait]
impl EnrichmentCollaborator for ShapeEnricher {
    async fn enrich(&self, alert: &Alert) -> Result<EnrichedContext> {
        let mut context = EnrichedContext::from_alert(alert.clone());
        context.resource.shape = Some(self.0.to_string());
        Ok(context)
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

pub fn alert(id: &str, title: &str) -> Alert {
    Alert {
        id: id.to_string(),
        title: title.to_string(),
        severity: Severity::Critical,
        message: String::new(),
        resource_id: "ocid1.instance.test".to_string(),
        resource_name: Some("db-01".to_string()),
        labels: BTreeMap::new(),
        fired_at: Utc::now(),
    }
}

pub fn context_with_shape(id: &str, title: &str, shape: &str) -> EnrichedContext {
    let mut context = EnrichedContext::from_alert(alert(id, title));
    context.resource.shape = Some(shape.to_string());
    context
}
