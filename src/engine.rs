//! Wiring: one [`Engine`] owns the store and every collaborator for a
//! process, built from a [`Config`].

use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use runbook_rag_core::collaborators::{EnrichmentCollaborator, LlmProvider, StorageAdapter};
use runbook_rag_core::embedding::EmbeddingProvider;
use runbook_rag_core::generate::Generator;
use runbook_rag_core::models::{Alert, EnrichedContext, ScoredChunk, Severity};
use runbook_rag_core::retrieve::Retriever;
use runbook_rag_core::store::{InMemoryVectorStore, VectorStore};
use runbook_rag_core::{Collaborator, RagError};

use crate::config::Config;
use crate::connector_fs::FilesystemStorage;
use crate::embedding::create_embedding_provider;
use crate::enrich::ConcurrentEnricher;
use crate::ingest::IngestionService;
use crate::llm::create_llm_provider;
use crate::pipeline::Orchestrator;

/// The concrete collaborators an [`Engine`] runs with.
pub struct Collaborators {
    pub storage: Arc<dyn StorageAdapter>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmProvider>,
    pub enricher: Arc<dyn EnrichmentCollaborator>,
}

impl Collaborators {
    /// Providers selected by name from `config`; label-derived enrichment.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            storage: Arc::new(FilesystemStorage::new(&config.storage)?),
            embedder: create_embedding_provider(&config.embedding)?,
            llm: create_llm_provider(&config.generation)?,
            enricher: Arc::new(ConcurrentEnricher::labels_only()),
        })
    }
}

pub struct Engine {
    store: Arc<InMemoryVectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Arc<Retriever>,
    ingestion: IngestionService,
    orchestrator: Orchestrator,
}

impl Engine {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config, Collaborators::from_config(config)?))
    }

    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            storage,
            embedder,
            llm,
            enricher,
        } = collaborators;

        let store = Arc::new(match embedder.dims() {
            0 => InMemoryVectorStore::new(),
            dims => InMemoryVectorStore::with_dims(dims),
        });
        let shared_store: Arc<dyn VectorStore> = store.clone();

        let retriever = Arc::new(Retriever::with_policy(
            shared_store.clone(),
            config.retrieval.policy(),
        ));
        let generator = Arc::new(
            Generator::new(llm)
                .with_config(config.generation.params())
                .with_max_context_chars(config.generation.max_context_chars),
        );
        let ingestion = IngestionService::new(storage, embedder.clone(), shared_store)
            .with_chunking(config.chunking.options())
            .with_concurrency(config.ingest.concurrency);
        let orchestrator = Orchestrator::new(enricher, embedder.clone(), retriever.clone(), generator)
            .with_default_top_k(config.retrieval.top_k)
            .with_request_timeout(config.pipeline.request_timeout());

        Self {
            store,
            embedder,
            retriever,
            ingestion,
            orchestrator,
        }
    }

    pub fn store(&self) -> &InMemoryVectorStore {
        &self.store
    }

    pub fn ingestion(&self) -> &IngestionService {
        &self.ingestion
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Free-text retrieval, for inspecting what a query would pull in.
    ///
    /// `shape` stands in for the resource shape so target patterns apply;
    /// without it, chunks restricted to specific targets are excluded.
    pub async fn search(
        &self,
        text: &str,
        shape: Option<String>,
        top_k: usize,
    ) -> runbook_rag_core::Result<Vec<ScoredChunk>> {
        let mut context = EnrichedContext::from_alert(Alert {
            id: "search".to_string(),
            title: text.to_string(),
            severity: Severity::Info,
            message: String::new(),
            resource_id: String::new(),
            resource_name: None,
            labels: BTreeMap::new(),
            fired_at: Utc::now(),
        });
        context.resource.shape = shape;
        context.validate()?;

        let query = self
            .embedder
            .embed(&context.query_text())
            .await
            .map_err(|e| RagError::collaborator(Collaborator::Embedding, e))?;
        self.retriever.retrieve(&query, &context, top_k).await
    }
}
