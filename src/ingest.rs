//! Ingestion pipeline orchestration.
//!
//! Coordinates the indexing flow for one document source:
//! storage listing → fetch → chunking → batch embedding → vector store.
//!
//! - Each document is embedded with a single `embed_batch` call covering
//!   all of its chunks.
//! - Re-indexing a path deletes its old chunks before inserting the new
//!   ones. The two steps are not atomic: a concurrent search may briefly
//!   see no chunks for that path.
//! - Failures are isolated per document. A document that cannot be
//!   fetched, embedded, or stored is logged, recorded in the
//!   [`IngestReport`], and skipped; the run continues.
//! - Unchanged documents (same SHA-256 digest as the last successful run)
//!   are skipped unless [`IngestOptions::full`] is set.
//! - Up to `concurrency` documents are processed at once.

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use runbook_rag_core::chunk::{chunk_document, content_hash, ChunkingOptions};
use runbook_rag_core::collaborators::StorageAdapter;
use runbook_rag_core::embedding::EmbeddingProvider;
use runbook_rag_core::models::Chunk;
use runbook_rag_core::store::VectorStore;
use runbook_rag_core::{Collaborator, RagError, Result};

/// Default number of documents processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Options for one ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Re-index every document even if its digest is unchanged.
    pub full: bool,
}

/// Stage at which a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Fetch,
    Embed,
    Store,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestStage::Fetch => "fetch",
            IngestStage::Embed => "embed",
            IngestStage::Store => "store",
        })
    }
}

/// One document that was skipped because of an error.
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub source_path: String,
    pub stage: IngestStage,
    pub error: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub source: String,
    pub documents_seen: usize,
    pub documents_indexed: usize,
    pub documents_unchanged: usize,
    /// Listed but gone by the time it was fetched; its chunks were removed.
    pub documents_missing: usize,
    /// Chunks stored by this run. Only successful documents contribute.
    pub chunks_stored: usize,
    /// Sorted by source path.
    pub failures: Vec<DocumentFailure>,
}

enum Outcome {
    Indexed(usize),
    Unchanged,
    Missing,
    Failed(DocumentFailure),
}

/// Indexes runbook documents from a [`StorageAdapter`] into a [`VectorStore`].
pub struct IngestionService {
    storage: Arc<dyn StorageAdapter>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingOptions,
    concurrency: usize,
    /// Document digest per source path, from the last successful index.
    digests: Mutex<HashMap<String, String>>,
}

impl IngestionService {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            storage,
            embedder,
            store,
            chunking: ChunkingOptions::default(),
            concurrency: DEFAULT_CONCURRENCY,
            digests: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingOptions) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Index every document in `source`; returns the number of chunks stored.
    ///
    /// Only a failure to list the source is an error. Per-document failures
    /// are logged and excluded from the count.
    pub async fn ingest(&self, source: &str) -> Result<usize> {
        Ok(self
            .ingest_with(source, IngestOptions::default())
            .await?
            .chunks_stored)
    }

    /// Index `source` and return the detailed report.
    #[instrument(skip(self), fields(full = options.full))]
    pub async fn ingest_with(&self, source: &str, options: IngestOptions) -> Result<IngestReport> {
        let names = self
            .storage
            .list_documents(source)
            .await
            .map_err(|e| RagError::collaborator(Collaborator::Storage, e))?;

        let outcomes: Vec<Outcome> = stream::iter(names.iter())
            .map(|name| self.ingest_document(source, name, options))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = IngestReport {
            source: source.to_string(),
            documents_seen: names.len(),
            ..IngestReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Indexed(count) => {
                    report.documents_indexed += 1;
                    report.chunks_stored += count;
                }
                Outcome::Unchanged => report.documents_unchanged += 1,
                Outcome::Missing => report.documents_missing += 1,
                Outcome::Failed(failure) => report.failures.push(failure),
            }
        }
        report
            .failures
            .sort_by(|a, b| a.source_path.cmp(&b.source_path));

        info!(
            source,
            documents = report.documents_seen,
            indexed = report.documents_indexed,
            unchanged = report.documents_unchanged,
            failed = report.failures.len(),
            chunks = report.chunks_stored,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_document(&self, source: &str, name: &str, options: IngestOptions) -> Outcome {
        let path = document_path(source, name);
        let fail = |stage: IngestStage, error: String| {
            warn!(source_path = %path, %stage, %error, "skipping document");
            Outcome::Failed(DocumentFailure {
                source_path: path.clone(),
                stage,
                error,
            })
        };

        let text = match self.storage.get_document_content(source, name).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(source_path = %path, "document vanished before fetch");
                if let Err(e) = self.store.delete(&path).await {
                    return fail(IngestStage::Store, e.to_string());
                }
                self.digests.lock().remove(&path);
                return Outcome::Missing;
            }
            Err(e) => return fail(IngestStage::Fetch, format!("{:#}", e)),
        };

        let digest = content_hash(&text);
        if !options.full && self.digests.lock().get(&path) == Some(&digest) {
            debug!(source_path = %path, "unchanged, skipping");
            return Outcome::Unchanged;
        }

        let drafts = chunk_document(&path, &text, &self.chunking);
        let texts: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();

        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            match self.embedder.embed_batch(&texts).await {
                Ok(vectors) if vectors.len() == texts.len() => vectors,
                Ok(vectors) => {
                    return fail(
                        IngestStage::Embed,
                        format!("{} vectors returned for {} chunks", vectors.len(), texts.len()),
                    )
                }
                Err(e) => return fail(IngestStage::Embed, format!("{:#}", e)),
            }
        };

        let chunks: Vec<Chunk> = drafts
            .into_iter()
            .zip(embeddings)
            .map(|(draft, embedding)| Chunk::from_draft(Uuid::new_v4().to_string(), draft, embedding))
            .collect();

        // Forget the digest first: a failed store must not read as unchanged.
        self.digests.lock().remove(&path);
        if let Err(e) = self.store.delete(&path).await {
            return fail(IngestStage::Store, e.to_string());
        }
        let stored = match self.store.store_batch(chunks).await {
            Ok(n) => n,
            Err(e) => return fail(IngestStage::Store, e.to_string()),
        };

        self.digests.lock().insert(path.clone(), digest);
        debug!(source_path = %path, chunks = stored, "document indexed");
        Outcome::Indexed(stored)
    }
}

/// Source path recorded on chunks: `name` qualified by its source directory.
pub fn document_path(source: &str, name: &str) -> String {
    let source = source.trim().trim_matches('/');
    if source.is_empty() || source == "." {
        name.to_string()
    } else {
        format!("{}/{}", source, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use runbook_rag_core::models::ScoredChunk;
    use runbook_rag_core::store::InMemoryVectorStore;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory storage; documents mapped to `None` fail on fetch.
    #[derive(Default)]
    struct MapStorage {
        docs: Mutex<BTreeMap<String, Option<String>>>,
    }

    impl MapStorage {
        fn put(&self, name: &str, text: &str) {
            self.docs.lock().insert(name.to_string(), Some(text.to_string()));
        }

        fn broken(&self, name: &str) {
            self.docs.lock().insert(name.to_string(), None);
        }
    }

    #[async_trait]
    impl StorageAdapter for MapStorage {
        async fn list_documents(&self, _source: &str) -> anyhow::Result<Vec<String>> {
            Ok(self.docs.lock().keys().cloned().collect())
        }

        async fn get_document_content(
            &self,
            _source: &str,
            name: &str,
        ) -> anyhow::Result<Option<String>> {
            match self.docs.lock().get(name) {
                Some(Some(text)) => Ok(Some(text.clone())),
                Some(None) => anyhow::bail!("permission denied: {}", name),
                None => Ok(None),
            }
        }
    }

    /// Length-based embedder that counts batch calls.
    #[derive(Default)]
    struct CountingEmbedder {
        batches: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, text.len() as f32])
        }

        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            if let Some(marker) = self.fail_on {
                if texts.iter().any(|t| t.contains(marker)) {
                    anyhow::bail!("embedding backend rejected input");
                }
            }
            Ok(texts.iter().map(|t| vec![1.0, t.len() as f32]).collect())
        }
    }

    const TWO_SECTIONS: &str = "# Disk\n## Check usage\nRun `df -h` and look for filesystems above 90% usage on the host.\n\n## Clean up\nRemove rotated logs under /var/log with logrotate and confirm space was freed.\n";

    fn service(
        storage: Arc<MapStorage>,
        embedder: Arc<CountingEmbedder>,
        store: Arc<InMemoryVectorStore>,
    ) -> IngestionService {
        IngestionService::new(storage, embedder, store).with_chunking(ChunkingOptions {
            min_section_chars: 10,
            max_section_chars: 2000,
        })
    }

    #[tokio::test]
    async fn test_ingest_counts_and_batches_per_document() {
        let storage = Arc::new(MapStorage::default());
        storage.put("disk.md", TWO_SECTIONS);
        storage.put("memory.md", "# Memory\n## Diagnose\nRun `free -h` to see memory usage.\n");
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryVectorStore::new());
        let service = service(storage, embedder.clone(), store.clone());

        let stored = service.ingest("runbooks").await.unwrap();
        assert_eq!(stored, 3);
        assert_eq!(store.len().await, 3);
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 2);
        assert_eq!(
            store.source_paths().len(),
            2,
            "chunks are recorded under their qualified paths"
        );
        assert!(store
            .source_paths()
            .iter()
            .all(|p| p.starts_with("runbooks/")));
    }

    /// Fails the first `store_batch` after `arm()`, then delegates.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryVectorStore,
        fail_next: std::sync::atomic::AtomicBool,
    }

    impl FlakyStore {
        fn arm(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn store(&self, chunk: Chunk) -> runbook_rag_core::Result<()> {
            self.inner.store(chunk).await
        }

        async fn store_batch(&self, chunks: Vec<Chunk>) -> runbook_rag_core::Result<usize> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(RagError::collaborator(
                    Collaborator::VectorStore,
                    anyhow::anyhow!("disk full"),
                ));
            }
            self.inner.store_batch(chunks).await
        }

        async fn search(
            &self,
            query: &[f32],
            top_k: usize,
        ) -> runbook_rag_core::Result<Vec<ScoredChunk>> {
            self.inner.search(query, top_k).await
        }

        async fn delete(&self, source_path: &str) -> runbook_rag_core::Result<usize> {
            self.inner.delete(source_path).await
        }

        async fn len(&self) -> usize {
            self.inner.len().await
        }
    }

    #[tokio::test]
    async fn test_failed_store_is_retried_on_next_run() {
        let storage = Arc::new(MapStorage::default());
        storage.put("disk.md", TWO_SECTIONS);
        let store = Arc::new(FlakyStore::default());
        let service = IngestionService::new(
            storage,
            Arc::new(CountingEmbedder::default()),
            store.clone(),
        )
        .with_chunking(ChunkingOptions {
            min_section_chars: 10,
            max_section_chars: 2000,
        });
        assert_eq!(service.ingest("").await.unwrap(), 2);

        store.arm();
        let full = service
            .ingest_with("", IngestOptions { full: true })
            .await
            .unwrap();
        assert_eq!(full.failures.len(), 1);
        assert_eq!(full.failures[0].stage, IngestStage::Store);
        assert_eq!(store.len().await, 0);

        let retry = service
            .ingest_with("", IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(retry.documents_unchanged, 0);
        assert_eq!(retry.chunks_stored, 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_isolated() {
        let storage = Arc::new(MapStorage::default());
        storage.put("a.md", "# A\n## One\nFirst runbook body with enough text.\n");
        storage.broken("b.md");
        storage.put("c.md", "# C\n## Three\nThird runbook body with enough text.\n");
        let store = Arc::new(InMemoryVectorStore::new());
        let service = service(storage, Arc::new(CountingEmbedder::default()), store.clone());

        let report = service
            .ingest_with("", IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.documents_seen, 3);
        assert_eq!(report.documents_indexed, 2);
        assert_eq!(report.chunks_stored, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source_path, "b.md");
        assert_eq!(report.failures[0].stage, IngestStage::Fetch);
        assert!(report.failures[0].error.contains("permission denied"));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_embedding_keeps_previous_chunks() {
        let storage = Arc::new(MapStorage::default());
        storage.put("a.md", "# A\n## One\nOriginal runbook body text.\n");
        let embedder = Arc::new(CountingEmbedder {
            fail_on: Some("POISON"),
            ..CountingEmbedder::default()
        });
        let store = Arc::new(InMemoryVectorStore::new());
        let service = service(storage.clone(), embedder, store.clone());
        assert_eq!(service.ingest("").await.unwrap(), 1);

        storage.put("a.md", "# A\n## One\nPOISON runbook body text.\n");
        let report = service
            .ingest_with("", IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.chunks_stored, 0);
        assert_eq!(report.failures[0].stage, IngestStage::Embed);
        // Old chunks stay because the delete only happens after embedding.
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_reingest_replaces_and_skips_unchanged() {
        let storage = Arc::new(MapStorage::default());
        storage.put("disk.md", TWO_SECTIONS);
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryVectorStore::new());
        let service = service(storage.clone(), embedder.clone(), store.clone());

        assert_eq!(service.ingest("").await.unwrap(), 2);

        let again = service
            .ingest_with("", IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(again.documents_unchanged, 1);
        assert_eq!(again.chunks_stored, 0);
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 1);

        let full = service
            .ingest_with("", IngestOptions { full: true })
            .await
            .unwrap();
        assert_eq!(full.chunks_stored, 2);
        assert_eq!(store.len().await, 2, "delete-then-insert, no duplicates");

        storage.put("disk.md", "# Disk\n## Only\nA single replacement section for the disk runbook.\n");
        assert_eq!(service.ingest("").await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_vanished_document_removes_chunks() {
        let storage = Arc::new(MapStorage::default());
        storage.put("gone.md", "# Gone\n## Soon\nThis runbook is about to be deleted.\n");
        let store = Arc::new(InMemoryVectorStore::new());
        let service = service(storage.clone(), Arc::new(CountingEmbedder::default()), store.clone());
        service.ingest("").await.unwrap();
        assert_eq!(store.len().await, 1);

        // Listed but no longer readable as content.
        storage.docs.lock().clear();
        let names = vec!["gone.md".to_string()];
        let outcome = service.ingest_document("", &names[0], IngestOptions::default()).await;
        assert!(matches!(outcome, Outcome::Missing));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_listing_failure_is_storage_error() {
        struct BrokenStorage;

        #[async_trait]
        impl StorageAdapter for BrokenStorage {
            async fn list_documents(&self, _source: &str) -> anyhow::Result<Vec<String>> {
                anyhow::bail!("bucket not found")
            }

            async fn get_document_content(
                &self,
                _source: &str,
                _name: &str,
            ) -> anyhow::Result<Option<String>> {
                Ok(None)
            }
        }

        let service = IngestionService::new(
            Arc::new(BrokenStorage),
            Arc::new(CountingEmbedder::default()),
            Arc::new(InMemoryVectorStore::new()),
        );
        let err = service.ingest("x").await.unwrap_err();
        assert_eq!(err.failed_collaborator(), Some(Collaborator::Storage));
    }

    #[test]
    fn test_document_path() {
        assert_eq!(document_path("", "a.md"), "a.md");
        assert_eq!(document_path(".", "a.md"), "a.md");
        assert_eq!(document_path("ops/", "db/a.md"), "ops/db/a.md");
    }
}
