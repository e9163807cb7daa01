//! Deterministic offline embedder based on feature hashing.
//!
//! Each lower-cased alphanumeric token is hashed with SHA-256; the first
//! eight bytes pick a bucket in `0..dims` and one further bit picks the
//! sign. The accumulated vector is L2-normalised. Texts sharing vocabulary
//! therefore score a positive cosine similarity, with no model download
//! and no network. Quality is far below a learned model; this provider
//! exists for offline runs, demos, and tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use runbook_rag_core::embedding::EmbeddingProvider;

pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            bail!("hash embedder needs dims > 0");
        }
        Ok(Self { dims })
    }

    /// Embed synchronously; the async trait methods delegate here.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbook_rag_core::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalised() {
        let embedder = HashEmbedder::new(64).unwrap();
        let a = embedder.embed_sync("Check memory usage with free -h");
        let b = embedder.embed_sync("Check memory usage with free -h");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::new(128).unwrap();
        let a = embedder.embed_sync("Disk FULL!");
        let b = embedder.embed_sync("disk full");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new(256).unwrap();
        let query = embedder.embed_sync("high memory usage on database host");
        let related = embedder.embed_sync("diagnose high memory usage on a database host");
        let unrelated = embedder.embed_sync("rotate tls certificates for the load balancer");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8).unwrap();
        assert!(embedder.embed_sync("  ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_zero_dims_rejected() {
        assert!(HashEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let embedder = HashEmbedder::new(32).unwrap();
        let texts = vec!["one".to_string(), "two words".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed("two words").await.unwrap());
    }
}
