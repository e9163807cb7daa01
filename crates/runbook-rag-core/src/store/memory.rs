//! In-memory [`VectorStore`] implementation.
//!
//! Keeps chunks in insertion order in a `Vec` behind a `parking_lot`
//! `RwLock`. Search is a brute-force cosine similarity scan over every
//! stored vector followed by a stable sort, so equal scores keep their
//! insertion order. Nothing survives a process restart.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

use super::VectorStore;

#[derive(Default)]
struct Inner {
    /// Insertion order is preserved across deletes.
    chunks: Vec<Arc<Chunk>>,
    /// Embedding dimension, pinned at construction or by the first insert.
    dims: Option<usize>,
}

/// Brute-force in-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only accepts vectors of length `dims`.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                chunks: Vec::new(),
                dims: Some(dims),
            }),
        }
    }

    /// The pinned embedding dimension, if any.
    pub fn dims(&self) -> Option<usize> {
        self.inner.read().dims
    }

    /// Source paths currently held, deduplicated, in first-insertion order.
    pub fn source_paths(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut paths: Vec<String> = Vec::new();
        for chunk in &inner.chunks {
            if !paths.iter().any(|p| p == &chunk.source_path) {
                paths.push(chunk.source_path.clone());
            }
        }
        paths
    }
}

fn check_dims(expected: Option<usize>, chunk: &Chunk) -> Result<()> {
    if chunk.embedding.is_empty() {
        return Err(RagError::InvalidArgument(format!(
            "chunk {} has an empty embedding",
            chunk.id
        )));
    }
    match expected {
        Some(dims) if dims != chunk.embedding.len() => Err(RagError::InvalidArgument(format!(
            "chunk {} has {} dimensions, store expects {}",
            chunk.id,
            chunk.embedding.len(),
            dims
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store(&self, chunk: Chunk) -> Result<()> {
        let mut inner = self.inner.write();
        check_dims(inner.dims, &chunk)?;
        inner.dims.get_or_insert(chunk.embedding.len());
        inner.chunks.push(Arc::new(chunk));
        Ok(())
    }

    async fn store_batch(&self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.write();
        let dims = inner.dims.or_else(|| chunks.first().map(|c| c.embedding.len()));
        for chunk in &chunks {
            check_dims(dims, chunk)?;
        }
        inner.dims = dims;
        let count = chunks.len();
        inner.chunks.extend(chunks.into_iter().map(Arc::new));
        Ok(count)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be > 0".into()));
        }

        let inner = self.inner.read();
        if inner.chunks.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dims) = inner.dims {
            if query.len() != dims {
                return Err(RagError::InvalidArgument(format!(
                    "query has {} dimensions, store expects {}",
                    query.len(),
                    dims
                )));
            }
        }

        let mut scored: Vec<ScoredChunk> = inner
            .chunks
            .iter()
            .map(|chunk| {
                let sim = cosine_similarity(query, &chunk.embedding);
                ScoredChunk::from_similarity(Arc::clone(chunk), sim)
            })
            .collect();
        drop(inner);

        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, source_path: &str) -> Result<usize> {
        let mut inner = self.inner.write();
        let before = inner.chunks.len();
        inner.chunks.retain(|c| c.source_path != source_path);
        Ok(before - inner.chunks.len())
    }

    async fn len(&self) -> usize {
        self.inner.read().chunks.len()
    }
}
