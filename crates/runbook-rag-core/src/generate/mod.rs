//! Checklist generation.
//!
//! The [`Generator`] turns an enriched alert context and the ranked
//! runbook chunks into a [`Checklist`]:
//!
//! 1. [`prompt::build_prompt`] assembles the alert context block, the
//!    excerpts that fit the context budget, and the step-format
//!    instruction.
//! 2. The configured [`LlmProvider`] produces raw text.
//! 3. [`parse::parse_checklist`] recovers the summary and numbered steps.
//!    If nothing parses, the whole answer becomes a single step so the
//!    engineer still sees what the model said.
//!
//! Provider failures surface as
//! [`RagError::Collaborator`] with [`Collaborator::Generation`].

pub mod parse;
pub mod prompt;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::collaborators::{GenerationConfig, LlmProvider};
use crate::error::{Collaborator, RagError, Result};
use crate::models::{Checklist, ChecklistStep, EnrichedContext, Priority, ScoredChunk};

pub use parse::{parse_checklist, ParsedChecklist};
pub use prompt::{build_prompt, PromptPlan, DEFAULT_MAX_CONTEXT_CHARS};

const DEFAULT_SUMMARY: &str = "Troubleshooting checklist generated from the alert context.";
const FALLBACK_RATIONALE: &str = "The model answer did not follow the step format; shown verbatim.";

/// Produces checklists with one LLM provider and default parameters.
pub struct Generator {
    llm: Arc<dyn LlmProvider>,
    config: GenerationConfig,
    max_context_chars: usize,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            config: GenerationConfig::default(),
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.llm.name()
    }

    /// Generate a checklist using the default generation parameters.
    pub async fn generate(
        &self,
        context: &EnrichedContext,
        chunks: &[ScoredChunk],
    ) -> Result<Checklist> {
        self.generate_with(context, chunks, &self.config).await
    }

    /// Generate a checklist with per-request generation parameters.
    ///
    /// An empty `chunks` slice is valid: the prompt then tells the model no
    /// runbook matched.
    pub async fn generate_with(
        &self,
        context: &EnrichedContext,
        chunks: &[ScoredChunk],
        config: &GenerationConfig,
    ) -> Result<Checklist> {
        let plan = build_prompt(context, chunks, self.max_context_chars);
        debug!(
            alert_id = %context.alert.id,
            provider = self.llm.name(),
            excerpts = plan.included_chunks,
            prompt_chars = plan.prompt.user.len(),
            "Requesting checklist"
        );

        let raw = self
            .llm
            .generate_text(&plan.prompt, config)
            .await
            .map_err(|e| RagError::collaborator(Collaborator::Generation, e))?;

        let parsed = parse_checklist(&raw);
        let steps = if parsed.steps.is_empty() {
            warn!(
                alert_id = %context.alert.id,
                provider = self.llm.name(),
                "Model output had no parseable steps, using raw text"
            );
            fallback_steps(&raw)
        } else {
            parsed.steps
        };

        Ok(Checklist {
            alert_id: context.alert.id.clone(),
            summary: parsed
                .summary
                .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            steps,
            source_paths: plan.source_paths,
            generated_at: Utc::now(),
            provider: self.llm.name().to_string(),
        })
    }
}

fn fallback_steps(raw: &str) -> Vec<ChecklistStep> {
    let text = raw.trim();
    let instruction = if text.is_empty() {
        "The model returned no text. Follow the standard escalation procedure for this alert."
            .to_string()
    } else {
        text.to_string()
    };
    vec![ChecklistStep {
        order: 1,
        instruction,
        rationale: FALLBACK_RATIONALE.to_string(),
        current_value: None,
        expected_value: None,
        priority: Priority::Medium,
        commands: Vec::new(),
    }]
}
