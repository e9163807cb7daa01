//! # Runbook RAG
//!
//! Turns live infrastructure alerts into ranked troubleshooting checklists
//! grounded in a team's own runbook documents.
//!
//! Runbooks are chunked by heading, embedded, and held in an in-memory
//! vector store. When an alert fires, its context (resource metadata,
//! recent metrics and logs) is gathered concurrently, the most relevant
//! runbook sections are retrieved and re-ranked against the affected
//! resource, and an LLM turns them into an ordered checklist.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Storage    │──▶│  Ingestion   │──▶│ Vector Store │
//! │ (runbooks)  │   │ Chunk+Embed  │   │  (in-memory) │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//! ┌─────────────┐   ┌──────────────┐   ┌──────▼───────┐   ┌───────────┐
//! │   Alert     │──▶│  Enrichment  │──▶│  Retriever   │──▶│ Generator │──▶ Checklist
//! └─────────────┘   │ metrics/logs │   │  re-ranking  │   │   (LLM)   │
//!                   └──────────────┘   └──────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rbk ingest                            # index ./runbooks
//! rbk search "disk full" --shape VM.Standard2.1
//! rbk checklist --alert alert.json      # ingest, then print a checklist as JSON
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Filesystem runbook storage |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Text-generation providers |
//! | [`enrich`] | Concurrent alert enrichment |
//! | [`ingest`] | Ingestion service |
//! | [`pipeline`] | Request orchestration |
//! | [`engine`] | Wiring from configuration |
//!
//! The data model, chunker, vector store, retriever, and generator live in
//! the `runbook-rag-core` crate, re-exported here as [`rag_core`].

pub mod config;
pub mod connector_fs;
pub mod embedding;
pub mod engine;
pub mod enrich;
mod http;
pub mod ingest;
pub mod llm;
pub mod pipeline;

pub use runbook_rag_core as rag_core;
