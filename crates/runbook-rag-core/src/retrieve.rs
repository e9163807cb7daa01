//! Context-aware retrieval over a [`VectorStore`].
//!
//! # Algorithm
//!
//! 1. Fetch `top_k × candidate_multiplier` candidates from the store so that
//!    exclusion below does not starve the final result. When fewer than
//!    `top_k` candidates survive and the store filled the window, the
//!    window doubles until enough survive or the store is exhausted.
//! 2. **Hard exclusion**: drop every candidate whose applicable-target
//!    pattern list is non-empty and matches none of the context's resource
//!    attributes. A chunk without patterns applies to every target.
//! 3. Compute an additive `metadata_boost`:
//!    - `tag_boost` per chunk tag that appears among the alert's labels
//!      (keys or values) or title words,
//!    - `target_boost` when the chunk declares patterns and one matches.
//! 4. Clamp the boost to `[0, max_boost]`. A weak similarity match can
//!    therefore never overtake a stronger one by more than `max_boost`.
//! 5. `final_score = similarity_score + boost`; stable sort by
//!    `final_score` descending (ties keep similarity rank), truncate to
//!    `top_k`.
//!
//! Patterns are globs matched case-insensitively, so a trailing-wildcard
//! prefix such as `"VM.*"` matches `"VM.Standard2.1"`.

use std::collections::HashSet;
use std::sync::Arc;

use globset::{Glob, GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::error::{Collaborator, RagError, Result};
use crate::models::{EnrichedContext, ScoredChunk};
use crate::store::VectorStore;

/// Boost granted per matching tag.
pub const DEFAULT_TAG_BOOST: f32 = 0.05;

/// Boost granted when a chunk's target patterns match the resource.
pub const DEFAULT_TARGET_BOOST: f32 = 0.10;

/// Upper bound on the total boost for a single chunk.
pub const DEFAULT_MAX_BOOST: f32 = 0.15;

/// Candidates fetched per requested result.
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 3;

/// Re-ranking policy values.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPolicy {
    pub candidate_multiplier: usize,
    pub tag_boost: f32,
    pub target_boost: f32,
    pub max_boost: f32,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            tag_boost: DEFAULT_TAG_BOOST,
            target_boost: DEFAULT_TARGET_BOOST,
            max_boost: DEFAULT_MAX_BOOST,
        }
    }
}

/// Queries the vector store and re-ranks hits against the alert context.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    policy: RetrievalPolicy,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self::with_policy(store, RetrievalPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn VectorStore>, policy: RetrievalPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Retrieve at most `top_k` chunks for `query`, re-ranked for `context`.
    ///
    /// Store failures are wrapped as [`Collaborator::VectorStore`].
    pub async fn retrieve(
        &self,
        query: &[f32],
        context: &EnrichedContext,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be > 0".into()));
        }

        let signals = ContextSignals::from_context(context);
        let mut window = top_k.saturating_mul(self.policy.candidate_multiplier.max(1));
        let (mut ranked, fetched) = loop {
            let candidates = self
                .store
                .search(query, window)
                .await
                .map_err(|e| RagError::collaborator(Collaborator::VectorStore, e))?;
            let fetched = candidates.len();
            let ranked: Vec<ScoredChunk> = candidates
                .into_iter()
                .filter_map(|hit| self.rescore(hit, &signals))
                .collect();

            // A window the store could not fill holds every chunk.
            if ranked.len() >= top_k || fetched < window || window == usize::MAX {
                break (ranked, fetched);
            }
            debug!(window, survivors = ranked.len(), "widening candidate window");
            window = window.saturating_mul(2);
        };
        let excluded = fetched - ranked.len();

        // Stable: ties keep the store's similarity order.
        ranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        ranked.truncate(top_k);

        debug!(
            fetched,
            excluded,
            returned = ranked.len(),
            "retrieval re-ranked"
        );
        Ok(ranked)
    }

    /// Apply exclusion and boost to one hit. `None` means excluded.
    fn rescore(&self, mut hit: ScoredChunk, signals: &ContextSignals) -> Option<ScoredChunk> {
        let patterns = &hit.chunk.target_patterns;
        let target_match = if patterns.is_empty() {
            false
        } else if patterns_match(patterns, &signals.attributes) {
            true
        } else {
            debug!(chunk_id = %hit.chunk.id, source = %hit.chunk.source_path, "excluded by target patterns");
            return None;
        };

        let matching_tags = hit
            .chunk
            .tags
            .iter()
            .filter(|t| signals.keywords.contains(&t.trim().to_lowercase()))
            .count();

        let mut boost = matching_tags as f32 * self.policy.tag_boost;
        if target_match {
            boost += self.policy.target_boost;
        }
        let boost = clamp_boost(boost, self.policy.max_boost);

        hit.metadata_boost = boost;
        hit.final_score = hit.similarity_score + boost;
        Some(hit)
    }
}

fn clamp_boost(boost: f32, cap: f32) -> f32 {
    let cap = if cap.is_finite() { cap.max(0.0) } else { 0.0 };
    if boost.is_finite() {
        boost.clamp(0.0, cap)
    } else {
        0.0
    }
}

/// Context values used for pattern matching and (lower-cased) tag overlap.
struct ContextSignals {
    attributes: Vec<String>,
    keywords: HashSet<String>,
}

impl ContextSignals {
    fn from_context(context: &EnrichedContext) -> Self {
        let attributes = context
            .resource_attributes()
            .into_iter()
            .map(|a| a.trim().to_string())
            .collect();

        let mut keywords = HashSet::new();
        for (key, value) in &context.alert.labels {
            keywords.insert(key.trim().to_lowercase());
            keywords.insert(value.trim().to_lowercase());
        }
        for word in context
            .alert
            .title
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .filter(|w| !w.is_empty())
        {
            keywords.insert(word.to_lowercase());
        }
        if let Some(kind) = &context.resource.kind {
            keywords.insert(kind.trim().to_lowercase());
        }

        Self {
            attributes,
            keywords,
        }
    }
}

/// Whether any pattern matches any attribute.
pub fn patterns_match<S: AsRef<str>>(patterns: &[String], attributes: &[S]) -> bool {
    let matchers: Vec<TargetMatcher> = patterns.iter().map(|p| TargetMatcher::new(p)).collect();
    attributes
        .iter()
        .any(|attr| matchers.iter().any(|m| m.is_match(attr.as_ref())))
}

/// One applicable-target pattern. Invalid globs fall back to
/// case-insensitive equality.
enum TargetMatcher {
    Glob(GlobMatcher),
    Literal(String),
}

impl TargetMatcher {
    fn new(pattern: &str) -> Self {
        let pattern = pattern.trim();
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .map(|g: Glob| g.compile_matcher());
        match glob {
            Ok(m) => TargetMatcher::Glob(m),
            Err(_) => TargetMatcher::Literal(pattern.to_lowercase()),
        }
    }

    fn is_match(&self, value: &str) -> bool {
        match self {
            TargetMatcher::Glob(m) => m.is_match(value.trim()),
            TargetMatcher::Literal(p) => value.trim().to_lowercase() == *p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, Chunk, Severity};
    use crate::store::InMemoryVectorStore;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn chunk(id: &str, embedding: Vec<f32>, tags: &[&str], patterns: &[&str]) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_path: format!("{}.md", id),
            section_title: "S".to_string(),
            content: id.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            target_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            chunk_index: 0,
            content_hash: String::new(),
            embedding,
        }
    }

    fn context(shape: Option<&str>, labels: &[(&str, &str)]) -> EnrichedContext {
        let alert = Alert {
            id: "alert-1".to_string(),
            title: "High memory usage".to_string(),
            severity: Severity::Critical,
            message: "memory above 95%".to_string(),
            resource_id: "ocid1.instance.oc1".to_string(),
            resource_name: None,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            fired_at: Utc::now(),
        };
        let mut ctx = EnrichedContext::from_alert(alert);
        ctx.resource.shape = shape.map(str::to_string);
        ctx
    }

    async fn retriever(chunks: Vec<Chunk>) -> Retriever {
        let store = Arc::new(InMemoryVectorStore::new());
        store.store_batch(chunks).await.unwrap();
        Retriever::new(store)
    }

    fn ids(results: &[ScoredChunk]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.id.as_str()).collect()
    }

    #[test]
    fn test_trailing_wildcard_pattern() {
        assert!(patterns_match(&["VM.*".to_string()], &["VM.Standard2.1"]));
        assert!(patterns_match(&["vm.standard*".to_string()], &["VM.Standard2.1"]));
        assert!(!patterns_match(&["VM.GPU*".to_string()], &["VM.Standard2.1"]));
        assert!(!patterns_match(&["BM.*".to_string()], &["VM.Standard2.1"]));
        let none: [&str; 0] = [];
        assert!(!patterns_match(&["VM.*".to_string()], &none));
    }

    #[test]
    fn test_invalid_glob_falls_back_to_literal() {
        assert!(patterns_match(&["[unclosed".to_string()], &["[UNCLOSED"]));
        assert!(!patterns_match(&["[unclosed".to_string()], &["unclosed"]));
    }

    #[test]
    fn test_clamp_boost() {
        assert_eq!(clamp_boost(0.5, 0.15), 0.15);
        assert_eq!(clamp_boost(-1.0, 0.15), 0.0);
        assert_eq!(clamp_boost(f32::NAN, 0.15), 0.0);
        assert_eq!(clamp_boost(0.1, -3.0), 0.0);
    }

    #[tokio::test]
    async fn test_excludes_chunks_for_other_targets() {
        let r = retriever(vec![
            chunk("gpu", vec![1.0, 0.0], &[], &["VM.GPU*", "BM.GPU*"]),
            chunk("generic", vec![0.5, 0.5], &[], &[]),
        ])
        .await;
        let results = r
            .retrieve(&[1.0, 0.0], &context(Some("VM.Standard2.1"), &[]), 5)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["generic"]);
    }

    #[tokio::test]
    async fn test_patterned_chunk_excluded_when_context_has_no_attributes() {
        let r = retriever(vec![chunk("gpu", vec![1.0, 0.0], &[], &["VM.GPU*"])]).await;
        let results = r.retrieve(&[1.0, 0.0], &context(None, &[]), 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_matching_target_gets_boost() {
        let r = retriever(vec![
            chunk("generic", vec![1.0, 0.02], &[], &[]),
            chunk("standard", vec![1.0, 0.05], &[], &["VM.Standard*"]),
        ])
        .await;
        let results = r
            .retrieve(&[1.0, 0.0], &context(Some("VM.Standard2.1"), &[]), 5)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["standard", "generic"]);
        assert!((results[0].metadata_boost - DEFAULT_TARGET_BOOST).abs() < 1e-6);
        assert_eq!(results[1].metadata_boost, 0.0);
    }

    #[tokio::test]
    async fn test_tag_overlap_boost_is_capped() {
        let r = retriever(vec![
            chunk("strong", vec![1.0, 0.0], &[], &[]),
            chunk(
                "tagged",
                vec![0.6, 0.8],
                &["memory", "usage", "oom", "linux", "prod"],
                &[],
            ),
        ])
        .await;
        let ctx = context(None, &[("os", "linux"), ("env", "prod"), ("oom", "true")]);
        let results = r.retrieve(&[1.0, 0.0], &ctx, 5).await.unwrap();

        let tagged = results.iter().find(|h| h.chunk.id == "tagged").unwrap();
        assert!((tagged.metadata_boost - DEFAULT_MAX_BOOST).abs() < 1e-6);
        assert!((tagged.final_score - (0.6 + DEFAULT_MAX_BOOST)).abs() < 1e-5);
        // 0.6 + 0.15 cannot overtake 1.0.
        assert_eq!(ids(&results), vec!["strong", "tagged"]);
    }

    #[tokio::test]
    async fn test_final_score_ties_keep_similarity_rank() {
        let r = retriever(vec![
            chunk("a", vec![1.0, 0.0], &[], &[]),
            chunk("b", vec![1.0, 0.0], &[], &[]),
        ])
        .await;
        let results = r.retrieve(&[1.0, 0.0], &context(None, &[]), 2).await.unwrap();
        assert_eq!(ids(&results), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_respects_top_k_after_exclusion() {
        let mut chunks: Vec<Chunk> = (0..4)
            .map(|i| chunk(&format!("gpu{}", i), vec![1.0, i as f32 * 0.01], &[], &["VM.GPU*"]))
            .collect();
        chunks.push(chunk("c1", vec![0.5, 0.5], &[], &[]));
        chunks.push(chunk("c2", vec![0.4, 0.6], &[], &[]));
        let r = retriever(chunks).await;
        let results = r
            .retrieve(&[1.0, 0.0], &context(Some("VM.Standard2.1"), &[]), 2)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_widens_window_when_exclusion_empties_it() {
        let mut chunks: Vec<Chunk> = (0..6)
            .map(|i| chunk(&format!("gpu{}", i), vec![1.0, 0.0], &[], &["BM.GPU*"]))
            .collect();
        chunks.push(chunk("generic", vec![1.0, 1.0], &[], &[]));
        let r = retriever(chunks).await;
        let results = r
            .retrieve(&[1.0, 0.0], &context(Some("VM.Standard2.1"), &[]), 2)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["generic"]);
        assert!((results[0].similarity_score - 0.707).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_store_failure_names_vector_store() {
        let store = Arc::new(InMemoryVectorStore::with_dims(2));
        store.store(chunk("a", vec![1.0, 0.0], &[], &[])).await.unwrap();
        let r = Retriever::new(store);
        let err = r
            .retrieve(&[1.0, 0.0, 0.0], &context(None, &[]), 1)
            .await
            .unwrap_err();
        assert_eq!(err.failed_collaborator(), Some(Collaborator::VectorStore));
        assert!(std::error::Error::source(&err)
            .unwrap()
            .to_string()
            .contains("dimensions"));
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let r = retriever(vec![]).await;
        let err = r.retrieve(&[1.0], &context(None, &[]), 0).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }
}
