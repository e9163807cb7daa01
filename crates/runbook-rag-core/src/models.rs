//! Core data models flowing through ingestion, retrieval, and generation.
//!
//! [`Chunk`]s are created during ingestion and replaced wholesale when their
//! source path is re-ingested. [`ScoredChunk`]s are transient per-query
//! results. [`EnrichedContext`] is built by the enrichment collaborator and
//! consumed read-only. [`Checklist`] is the terminal artifact.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ═══════════════════════════════════════════════════════════════════════
// Runbook chunks
// ═══════════════════════════════════════════════════════════════════════

/// A section of a runbook produced by the chunker, before it has an id or
/// an embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub source_path: String,
    pub section_title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub target_patterns: Vec<String>,
    /// Position of this section within its document, starting at 0.
    pub chunk_index: usize,
}

/// A retrievable unit of runbook text with its embedding attached.
///
/// Immutable after creation. The embedding length is constant for a
/// deployment and matches the embedding provider's output dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub source_path: String,
    pub section_title: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Applicable-target patterns (e.g. `"VM.GPU*"`). Empty means the
    /// chunk applies to every target.
    pub target_patterns: Vec<String>,
    pub chunk_index: usize,
    /// SHA-256 of `content`, hex encoded.
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Attach an id and an embedding to a draft.
    pub fn from_draft(id: String, draft: ChunkDraft, embedding: Vec<f32>) -> Self {
        let content_hash = crate::chunk::content_hash(&draft.content);
        Self {
            id,
            source_path: draft.source_path,
            section_title: draft.section_title,
            content: draft.content,
            tags: draft.tags,
            target_patterns: draft.target_patterns,
            chunk_index: draft.chunk_index,
            content_hash,
            embedding,
        }
    }
}

/// A search hit: a stored chunk plus its scores for one query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    /// Cosine similarity between the query and the chunk embedding.
    pub similarity_score: f32,
    /// Clamped additive boost from contextual signals.
    pub metadata_boost: f32,
    /// `similarity_score + metadata_boost`.
    pub final_score: f32,
}

impl ScoredChunk {
    /// A hit with no boost applied yet.
    pub fn from_similarity(chunk: Arc<Chunk>, similarity_score: f32) -> Self {
        Self {
            chunk,
            similarity_score,
            metadata_boost: 0.0,
            final_score: similarity_score,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Alert context
// ═══════════════════════════════════════════════════════════════════════

/// Alert severity as reported by the monitoring system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        f.write_str(s)
    }
}

/// A live infrastructure alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    /// Identifier of the affected resource.
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Free-form labels/dimensions attached by the alerting rule.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    pub fired_at: DateTime<Utc>,
}

impl Alert {
    /// Reject alerts that cannot drive retrieval.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RagError::Validation("alert id is empty".into()));
        }
        if self.title.trim().is_empty() && self.message.trim().is_empty() {
            return Err(RagError::Validation(format!(
                "alert {} has neither a title nor a message",
                self.id
            )));
        }
        Ok(())
    }

    /// The descriptive text embedded to form the retrieval query.
    pub fn descriptive_text(&self) -> String {
        let mut parts = vec![self.title.trim().to_string()];
        if !self.message.trim().is_empty() {
            parts.push(self.message.trim().to_string());
        }
        parts.extend(self.labels.values().map(|v| v.trim().to_string()));
        parts.retain(|p| !p.is_empty());
        parts.join("\n")
    }
}

/// Metadata about the resource an alert fired on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Resource kind (e.g. `"instance"`, `"database"`).
    #[serde(default)]
    pub kind: Option<String>,
    /// Compute shape or instance type (e.g. `"VM.Standard2.1"`).
    #[serde(default)]
    pub shape: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// One recent metric observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One recent log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub level: Option<String>,
    pub message: String,
}

/// The query context for retrieval and generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedContext {
    pub alert: Alert,
    #[serde(default)]
    pub resource: ResourceMetadata,
    #[serde(default)]
    pub metrics: Vec<MetricSample>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl EnrichedContext {
    /// A context carrying only the alert.
    pub fn from_alert(alert: Alert) -> Self {
        Self {
            alert,
            resource: ResourceMetadata::default(),
            metrics: Vec::new(),
            logs: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.alert.validate()
    }

    /// Every attribute value of the affected resource that applicable-target
    /// patterns are matched against: shape, kind, region, and free-form
    /// attributes.
    pub fn resource_attributes(&self) -> Vec<&str> {
        let r = &self.resource;
        r.shape
            .iter()
            .chain(r.kind.iter())
            .chain(r.region.iter())
            .map(String::as_str)
            .chain(r.attributes.values().map(String::as_str))
            .filter(|v| !v.trim().is_empty())
            .collect()
    }

    /// Text embedded to form the retrieval query.
    pub fn query_text(&self) -> String {
        let mut text = self.alert.descriptive_text();
        if let Some(kind) = &self.resource.kind {
            text.push('\n');
            text.push_str(kind);
        }
        text
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Checklist
// ═══════════════════════════════════════════════════════════════════════

/// Priority of a checklist step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" | "p1" => Ok(Priority::High),
            "medium" | "med" | "normal" | "p2" => Ok(Priority::Medium),
            "low" | "p3" => Ok(Priority::Low),
            other => Err(RagError::InvalidArgument(format!(
                "unknown priority: {}",
                other
            ))),
        }
    }
}

/// One ordered remediation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistStep {
    /// 1-based, strictly increasing within a checklist.
    pub order: u32,
    pub instruction: String,
    pub rationale: String,
    pub current_value: Option<String>,
    pub expected_value: Option<String>,
    pub priority: Priority,
    pub commands: Vec<String>,
}

/// The structured troubleshooting checklist returned for an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checklist {
    pub alert_id: String,
    pub summary: String,
    pub steps: Vec<ChecklistStep>,
    /// Deduplicated source paths of the chunks included in the prompt.
    pub source_paths: Vec<String>,
    pub generated_at: DateTime<Utc>,
    /// Identifier of the generation provider used.
    pub provider: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Request lifecycle
// ═══════════════════════════════════════════════════════════════════════

/// Per-request pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Received,
    Enriching,
    Retrieving,
    Generating,
    Completed,
    Failed,
}

impl PipelineState {
    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Received, Enriching)
                | (Received, Retrieving)
                | (Enriching, Retrieving)
                | (Retrieving, Generating)
                | (Generating, Completed)
                | (Enriching, Failed)
                | (Retrieving, Failed)
                | (Generating, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Received => "received",
            PipelineState::Enriching => "enriching",
            PipelineState::Retrieving => "retrieving",
            PipelineState::Generating => "generating",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}
