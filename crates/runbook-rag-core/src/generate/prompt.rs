//! Prompt construction for checklist generation.
//!
//! The user message has four parts: the alert context block, the ranked
//! runbook excerpts (bounded by a character budget), and a closing
//! instruction that pins the step format understood by
//! [`parse`](super::parse).

use std::fmt::Write as _;

use crate::collaborators::Prompt;
use crate::models::{EnrichedContext, ScoredChunk};

/// Default budget for runbook excerpt text in one prompt, in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Metric samples and log lines shown in the context block, most recent last.
const MAX_METRICS: usize = 10;
const MAX_LOGS: usize = 10;

const SYSTEM_INSTRUCTION: &str = "\
You are an on-call site reliability assistant. Given an infrastructure alert \
and excerpts from the team's runbooks, you write a short, ordered \
troubleshooting checklist for the engineer handling the alert. Prefer the \
procedures and commands from the runbook excerpts when they apply. Never \
invent destructive commands. If the excerpts do not cover the alert, say so \
in the summary and fall back to general diagnostic steps.";

const NO_EXCERPTS: &str = "\
No runbook content matched this alert. Base the checklist on general \
troubleshooting practice and state in the summary that no runbook applied.";

const FORMAT_INSTRUCTION: &str = "\
Write the checklist in exactly this format and nothing else:

Summary: <one or two sentences describing the likely problem>

1. [HIGH|MEDIUM|LOW] <what to do>
   Rationale: <why this step matters>
   Current: <value observed in the alert context, or N/A>
   Expected: <healthy value, or N/A>
   ```
   <one shell command per line; omit the block if there are none>
   ```
2. ...

Order steps by the sequence the engineer should follow.";

/// A built prompt plus the runbook sources it drew on.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub prompt: Prompt,
    /// Distinct source paths of the included excerpts, in rank order.
    pub source_paths: Vec<String>,
    /// Number of excerpts that made it into the prompt.
    pub included_chunks: usize,
}

/// Build the generation prompt for `context` from the ranked `chunks`.
///
/// Excerpts are added in rank order until the next one would push the
/// total excerpt text past `max_context_chars`. The first excerpt is
/// always included so a single long section is not silently dropped.
pub fn build_prompt(
    context: &EnrichedContext,
    chunks: &[ScoredChunk],
    max_context_chars: usize,
) -> PromptPlan {
    let mut user = String::new();
    write_context_block(&mut user, context);

    user.push_str("\n## Runbook excerpts\n\n");
    let mut used = 0usize;
    let mut included = 0usize;
    let mut source_paths: Vec<String> = Vec::new();

    for scored in chunks {
        let chunk = &scored.chunk;
        let len = chunk.content.chars().count();
        if included > 0 && used + len > max_context_chars {
            break;
        }
        used += len;
        included += 1;

        let _ = writeln!(
            user,
            "### [{}] {} / {}\n",
            included, chunk.source_path, chunk.section_title
        );
        user.push_str(chunk.content.trim_end());
        user.push_str("\n\n");

        if !source_paths.iter().any(|p| p == &chunk.source_path) {
            source_paths.push(chunk.source_path.clone());
        }
    }
    if included == 0 {
        user.push_str(NO_EXCERPTS);
        user.push_str("\n\n");
    }

    user.push_str("## Task\n\n");
    user.push_str(FORMAT_INSTRUCTION);
    user.push('\n');

    PromptPlan {
        prompt: Prompt {
            system: SYSTEM_INSTRUCTION.to_string(),
            user,
        },
        source_paths,
        included_chunks: included,
    }
}

fn write_context_block(out: &mut String, context: &EnrichedContext) {
    let alert = &context.alert;
    out.push_str("## Alert\n\n");
    let _ = writeln!(out, "Title: {}", alert.title);
    let _ = writeln!(out, "Severity: {}", alert.severity);
    if !alert.message.trim().is_empty() {
        let _ = writeln!(out, "Message: {}", alert.message.trim());
    }
    let _ = writeln!(out, "Fired at: {}", alert.fired_at.to_rfc3339());

    let resource = match (&alert.resource_name, alert.resource_id.trim()) {
        (Some(name), "") => Some(name.clone()),
        (Some(name), id) => Some(format!("{} ({})", name, id)),
        (None, "") => None,
        (None, id) => Some(id.to_string()),
    };
    if let Some(resource) = resource {
        let _ = writeln!(out, "Resource: {}", resource);
    }

    let meta = &context.resource;
    if let Some(kind) = &meta.kind {
        let _ = writeln!(out, "Resource kind: {}", kind);
    }
    if let Some(shape) = &meta.shape {
        let _ = writeln!(out, "Shape: {}", shape);
    }
    if let Some(region) = &meta.region {
        let _ = writeln!(out, "Region: {}", region);
    }
    for (key, value) in &meta.attributes {
        let _ = writeln!(out, "{}: {}", key, value);
    }
    if !alert.labels.is_empty() {
        let labels: Vec<String> = alert
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let _ = writeln!(out, "Labels: {}", labels.join(", "));
    }

    if !context.metrics.is_empty() {
        out.push_str("\n## Recent metrics\n\n");
        let skip = context.metrics.len().saturating_sub(MAX_METRICS);
        for m in context.metrics.iter().skip(skip) {
            let unit = m.unit.as_deref().unwrap_or("");
            let _ = writeln!(
                out,
                "- {} = {}{} at {}",
                m.name,
                m.value,
                if unit.is_empty() {
                    String::new()
                } else {
                    format!(" {}", unit)
                },
                m.timestamp.to_rfc3339()
            );
        }
    }

    if !context.logs.is_empty() {
        out.push_str("\n## Recent logs\n\n");
        let skip = context.logs.len().saturating_sub(MAX_LOGS);
        for entry in context.logs.iter().skip(skip) {
            let level = entry.level.as_deref().unwrap_or("LOG");
            let _ = writeln!(
                out,
                "- {} [{}] {}",
                entry.timestamp.to_rfc3339(),
                level,
                entry.message.trim()
            );
        }
    }
}
