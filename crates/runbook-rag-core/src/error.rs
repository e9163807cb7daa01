//! Error taxonomy shared by every stage of the pipeline.
//!
//! Collaborator traits report failures as [`anyhow::Error`]; the core wraps
//! each one exactly once into [`RagError::Collaborator`] at the seam where
//! the collaborator is called, keeping the original cause as the error
//! source. Unparseable generation output is not an error at all (see
//! [`crate::generate`]), and per-document ingestion failures are recorded
//! in a report rather than returned.

use std::fmt;

use thiserror::Error;

use crate::models::PipelineState;

/// Identity of an external dependency whose failure is being surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Storage,
    Embedding,
    Generation,
    Enrichment,
    VectorStore,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collaborator::Storage => "storage",
            Collaborator::Embedding => "embedding",
            Collaborator::Generation => "generation",
            Collaborator::Enrichment => "enrichment",
            Collaborator::VectorStore => "vector store",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the retrieval-augmented generation core.
#[derive(Debug, Error)]
pub enum RagError {
    /// A required input was missing or malformed. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An argument was outside its accepted range (e.g. `top_k == 0`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An external dependency failed; `source` is the original cause.
    #[error("{collaborator} collaborator failed: {source}")]
    Collaborator {
        collaborator: Collaborator,
        #[source]
        source: anyhow::Error,
    },

    /// The overall request deadline elapsed before the pipeline settled.
    #[error("request timed out after {timeout_ms}ms while {stage}")]
    Timeout { stage: PipelineState, timeout_ms: u64 },
}

impl RagError {
    /// Wrap a collaborator failure, preserving the original cause.
    pub fn collaborator(collaborator: Collaborator, source: impl Into<anyhow::Error>) -> Self {
        RagError::Collaborator {
            collaborator,
            source: source.into(),
        }
    }

    /// Returns the failing collaborator, if this is a collaborator failure.
    pub fn failed_collaborator(&self) -> Option<Collaborator> {
        match self {
            RagError::Collaborator { collaborator, .. } => Some(*collaborator),
            _ => None,
        }
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, RagError>;
