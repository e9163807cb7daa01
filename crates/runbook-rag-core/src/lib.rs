//! # Runbook RAG Core
//!
//! Runtime-agnostic logic for Runbook RAG: the data model, the runbook
//! chunker, capability traits for the external collaborators (embedding,
//! text generation, document storage, context enrichment), the vector
//! store abstraction with its in-memory brute-force backend, context-aware
//! re-ranking, and checklist generation.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Orchestration
//! with deadlines, concrete providers, and configuration live in the
//! `runbook-rag` application crate.
//!
//! ```text
//! runbook text ─▶ chunk ─▶ embed ─▶ VectorStore
//!                                        │
//! alert context ─▶ embed query ─▶ Retriever ─▶ Generator ─▶ Checklist
//! ```

pub mod chunk;
pub mod collaborators;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod models;
pub mod retrieve;
pub mod store;

pub use error::{Collaborator, RagError, Result};
