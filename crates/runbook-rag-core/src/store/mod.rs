//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the seam between the retrieval pipeline and
//! whatever holds chunk embeddings. The reference backend is
//! [`memory::InMemoryVectorStore`], a brute-force scan with no durability;
//! an indexed or durable backend can replace it without touching callers.
//!
//! Implementations must be `Send + Sync`: the store is shared by concurrent
//! ingestion runs and in-flight pipeline requests.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, ScoredChunk};

pub use memory::InMemoryVectorStore;

/// Abstract chunk + vector storage with similarity search.
///
/// All operations are async to match durable backends. In-memory
/// implementations return immediately-ready futures.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`store`](VectorStore::store) | Insert one chunk |
/// | [`store_batch`](VectorStore::store_batch) | Insert many chunks |
/// | [`search`](VectorStore::search) | Cosine similarity top-k search |
/// | [`delete`](VectorStore::delete) | Remove every chunk of a source path |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert one chunk. Visible to every search that starts afterwards.
    async fn store(&self, chunk: Chunk) -> Result<()>;

    /// Insert several chunks, returning how many were stored. A concurrent
    /// search may observe part of the batch.
    async fn store_batch(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Return at most `top_k` chunks ordered by descending cosine
    /// similarity to `query`, ties broken by insertion order.
    ///
    /// Fails with [`RagError::InvalidArgument`](crate::RagError::InvalidArgument)
    /// when `top_k == 0`. An empty store yields an empty list.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Remove every chunk whose source path equals `source_path`, returning
    /// how many were removed. Deleting an unknown path is a no-op.
    async fn delete(&self, source_path: &str) -> Result<usize>;

    /// Number of stored chunks.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
