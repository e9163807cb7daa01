//! Embedding provider trait and vector similarity.
//!
//! Defines the [`EmbeddingProvider`] capability that every embedding
//! backend implements, plus [`cosine_similarity`], the metric used by the
//! vector store.
//!
//! Concrete providers (OpenAI, Ollama, hashing, fastembed) live in the
//! `runbook-rag` app crate and are selected at runtime by provider name.

use anyhow::Result;
use async_trait::async_trait;

/// Text → fixed-length vector.
///
/// `embed_batch` defaults to one `embed` call per text; backends with a
/// native batch endpoint override it so ingestion issues one call per
/// document's chunk set.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts. The output has one vector per input, in input
    /// order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, a
/// zero-magnitude operand, or non-finite input. Never returns NaN.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom.is_nan() || denom < f32::EPSILON {
        return 0.0;
    }

    let sim = dot / denom;
    if sim.is_finite() {
        sim.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
