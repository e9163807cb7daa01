//! Pipeline orchestration: alert in, checklist out.
//!
//! # Request flow
//!
//! ```text
//! RECEIVED ─▶ ENRICHING ─▶ RETRIEVING ─▶ GENERATING ─▶ COMPLETED
//!                 │             │              │
//!                 └─────────────┴──────────────┴────▶ FAILED
//! ```
//!
//! - **Enriching**: the [`EnrichmentCollaborator`] builds the context.
//!   Skipped when the caller already supplies an [`EnrichedContext`].
//! - **Retrieving**: the context's query text is embedded and the
//!   [`Retriever`] re-ranks store hits. Finishes before generation starts.
//! - **Generating**: the [`Generator`] prompts the LLM and parses steps.
//!
//! Input validation runs before anything is awaited. Every stage failure
//! is returned once, wrapped with the failing collaborator; nothing is
//! retried or swallowed here. The whole request runs under a deadline
//! (`tokio::time::timeout`); when it elapses the in-flight call is dropped
//! and the result is [`RagError::Timeout`] naming the stage reached.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use runbook_rag_core::collaborators::EnrichmentCollaborator;
use runbook_rag_core::embedding::EmbeddingProvider;
use runbook_rag_core::generate::Generator;
use runbook_rag_core::models::{Alert, Checklist, EnrichedContext, PipelineState};
use runbook_rag_core::retrieve::Retriever;
use runbook_rag_core::{Collaborator, RagError, Result};

/// Results requested when the caller gives no `top_k`.
pub const DEFAULT_TOP_K: usize = 5;

/// End-to-end deadline for one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Input to [`Orchestrator::produce`].
#[derive(Debug, Clone)]
pub enum ChecklistRequest {
    /// A raw alert; enrichment runs first.
    Alert(Alert),
    /// A caller-enriched context; enrichment is skipped.
    Context(EnrichedContext),
}

impl ChecklistRequest {
    pub fn alert(&self) -> &Alert {
        match self {
            ChecklistRequest::Alert(alert) => alert,
            ChecklistRequest::Context(context) => &context.alert,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ChecklistRequest::Alert(alert) => alert.validate(),
            ChecklistRequest::Context(context) => context.validate(),
        }
    }
}

impl From<Alert> for ChecklistRequest {
    fn from(alert: Alert) -> Self {
        ChecklistRequest::Alert(alert)
    }
}

impl From<EnrichedContext> for ChecklistRequest {
    fn from(context: EnrichedContext) -> Self {
        ChecklistRequest::Context(context)
    }
}

/// State history of one request.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    history: Vec<PipelineState>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            history: vec![PipelineState::Received],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    /// Every state visited, starting with `Received`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(RagError::InvalidArgument(format!(
                "invalid pipeline transition {} -> {}",
                current, next
            )));
        }
        debug!(from = %current, to = %next, "pipeline state");
        self.history.push(next);
        Ok(())
    }

    /// Mark the request failed if a working stage was reached.
    fn fail(&mut self) {
        if self.state().can_transition_to(PipelineState::Failed) {
            self.history.push(PipelineState::Failed);
        }
    }
}

/// Runs enrichment, retrieval, and generation for one request at a time.
/// Shareable across tasks; every dependency is behind an `Arc`.
pub struct Orchestrator {
    enricher: Arc<dyn EnrichmentCollaborator>,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Arc<Retriever>,
    generator: Arc<Generator>,
    default_top_k: usize,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        enricher: Arc<dyn EnrichmentCollaborator>,
        embedder: Arc<dyn EmbeddingProvider>,
        retriever: Arc<Retriever>,
        generator: Arc<Generator>,
    ) -> Self {
        Self {
            enricher,
            embedder,
            retriever,
            generator,
            default_top_k: DEFAULT_TOP_K,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Checklist for an already-enriched context. `top_k` defaults to 5.
    pub async fn process(
        &self,
        context: EnrichedContext,
        top_k: Option<usize>,
    ) -> Result<Checklist> {
        self.process_with_lifecycle(ChecklistRequest::Context(context), top_k)
            .await
            .0
    }

    /// Enrich `alert`, then produce its checklist.
    pub async fn process_alert(&self, alert: Alert, top_k: Option<usize>) -> Result<Checklist> {
        self.process_with_lifecycle(ChecklistRequest::Alert(alert), top_k)
            .await
            .0
    }

    /// The single outward operation: alert or context in, checklist out.
    pub async fn produce(&self, request: impl Into<ChecklistRequest>) -> Result<Checklist> {
        self.process_with_lifecycle(request.into(), None).await.0
    }

    /// Run a request and also return the states it went through.
    #[instrument(skip_all, fields(alert_id = %request.alert().id))]
    pub async fn process_with_lifecycle(
        &self,
        request: ChecklistRequest,
        top_k: Option<usize>,
    ) -> (Result<Checklist>, RequestLifecycle) {
        let lifecycle = Mutex::new(RequestLifecycle::new());
        let result = self.execute(request, top_k, &lifecycle).await;
        (result, lifecycle.into_inner())
    }

    async fn execute(
        &self,
        request: ChecklistRequest,
        top_k: Option<usize>,
        lifecycle: &Mutex<RequestLifecycle>,
    ) -> Result<Checklist> {
        request.validate()?;
        let top_k = top_k.unwrap_or(self.default_top_k);
        if top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be > 0".into()));
        }

        let outcome = tokio::time::timeout(
            self.request_timeout,
            self.run_stages(request, top_k, lifecycle),
        )
        .await;

        let mut lifecycle = lifecycle.lock();
        let stage = lifecycle.state();
        let result = match outcome {
            Ok(Ok(checklist)) => lifecycle
                .advance(PipelineState::Completed)
                .map(|_| checklist),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RagError::Timeout {
                stage,
                timeout_ms: millis(self.request_timeout),
            }),
        };
        if let Err(e) = &result {
            warn!(%stage, error = %e, "pipeline failed");
            lifecycle.fail();
        }
        result
    }

    async fn run_stages(
        &self,
        request: ChecklistRequest,
        top_k: usize,
        lifecycle: &Mutex<RequestLifecycle>,
    ) -> Result<Checklist> {
        let context = match request {
            ChecklistRequest::Alert(alert) => {
                lifecycle.lock().advance(PipelineState::Enriching)?;
                let context = self
                    .enricher
                    .enrich(&alert)
                    .await
                    .map_err(|e| RagError::collaborator(Collaborator::Enrichment, e))?;
                context.validate()?;
                context
            }
            ChecklistRequest::Context(context) => context,
        };

        lifecycle.lock().advance(PipelineState::Retrieving)?;
        let query = self
            .embedder
            .embed(&context.query_text())
            .await
            .map_err(|e| RagError::collaborator(Collaborator::Embedding, e))?;
        let chunks = self.retriever.retrieve(&query, &context, top_k).await?;
        debug!(retrieved = chunks.len(), "retrieval complete");

        lifecycle.lock().advance(PipelineState::Generating)?;
        self.generator.generate(&context, &chunks).await
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
