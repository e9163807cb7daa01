//! Lenient parser for LLM checklist output.
//!
//! Accepts the numbered format requested by the prompt plus the usual
//! drift: markdown bold around numbers and field names, `Step 3:`
//! prefixes, `1)` numbering, bulleted fields, and priorities written as
//! `[HIGH]`, `(high)` or `Priority: High`. Fenced code blocks inside a
//! step become its commands.

use crate::chunk::FenceTracker;
use crate::models::{ChecklistStep, Priority};

/// What [`parse_checklist`] could recover from raw model output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedChecklist {
    pub summary: Option<String>,
    pub steps: Vec<ChecklistStep>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Instruction,
    Rationale,
    Current,
    Expected,
    Priority,
    Command,
}

#[derive(Default)]
struct StepBuilder {
    instruction: String,
    rationale: String,
    current: Option<String>,
    expected: Option<String>,
    priority: Option<Priority>,
    commands: Vec<String>,
    last_field: Option<Field>,
}

impl StepBuilder {
    fn build(self, order: u32) -> Option<ChecklistStep> {
        let instruction = self.instruction.trim().to_string();
        if instruction.is_empty() {
            return None;
        }
        Some(ChecklistStep {
            order,
            instruction,
            rationale: self.rationale.trim().to_string(),
            current_value: self.current,
            expected_value: self.expected,
            priority: self.priority.unwrap_or(Priority::Medium),
            commands: self.commands,
        })
    }

    fn append_text(&mut self, text: &str) {
        let target = match self.last_field {
            Some(Field::Rationale) => &mut self.rationale,
            _ => &mut self.instruction,
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text);
    }

    fn apply_field(&mut self, field: Field, value: &str) {
        self.last_field = Some(field);
        match field {
            Field::Instruction => self.append_text(value),
            Field::Rationale => {
                if !self.rationale.is_empty() {
                    self.rationale.push(' ');
                }
                self.rationale.push_str(value);
            }
            Field::Current => self.current = optional_value(value),
            Field::Expected => self.expected = optional_value(value),
            Field::Priority => {
                if let Ok(p) = value.trim_matches(|c| c == '[' || c == ']').parse() {
                    self.priority = Some(p);
                }
            }
            Field::Command => {
                let cmd = value.trim().trim_matches('`').trim();
                if !cmd.is_empty() {
                    self.commands.push(strip_prompt(cmd).to_string());
                }
            }
        }
    }
}

/// Parse raw model output into a summary and well-formed steps.
///
/// Steps without an instruction are dropped and the survivors are
/// renumbered `1..=n`. An empty `steps` list means nothing usable was
/// found; the caller decides on a fallback.
pub fn parse_checklist(raw: &str) -> ParsedChecklist {
    let mut summary_lines: Vec<String> = Vec::new();
    let mut builders: Vec<StepBuilder> = Vec::new();
    let mut current: Option<StepBuilder> = None;
    let mut fence = FenceTracker::default();
    let mut block: Option<Vec<String>> = None;

    for line in raw.lines() {
        let trimmed = line.trim();

        let was_open = fence.is_open();
        if fence.observe(trimmed) {
            if !was_open {
                block = Some(Vec::new());
            } else if !fence.is_open() {
                if let (Some(lines), Some(step)) = (block.take(), current.as_mut()) {
                    step.commands.extend(block_commands(&lines));
                }
            } else if let Some(lines) = block.as_mut() {
                lines.push(trimmed.to_string());
            }
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        if let Some(headline) = step_start(line) {
            if let Some(done) = current.take() {
                builders.push(done);
            }
            let mut step = StepBuilder::default();
            let (priority, text) = split_priority(headline);
            step.priority = priority;
            if !text.is_empty() {
                step.apply_field(Field::Instruction, &text);
            }
            current = Some(step);
            continue;
        }

        match current.as_mut() {
            Some(step) => match field_line(trimmed) {
                Some((field, value)) => step.apply_field(field, value),
                None => step.append_text(strip_bullet(trimmed)),
            },
            None => {
                if let Some(text) = summary_text(trimmed) {
                    summary_lines.push(text.to_string());
                }
            }
        }
    }

    // Unterminated fence at end of output.
    if let (Some(lines), Some(step)) = (block.take(), current.as_mut()) {
        step.commands.extend(block_commands(&lines));
    }
    if let Some(done) = current.take() {
        builders.push(done);
    }

    let steps = builders
        .into_iter()
        .filter_map(|b| b.build(0))
        .enumerate()
        .map(|(i, mut step)| {
            step.order = i as u32 + 1;
            step
        })
        .collect();

    let summary = summary_lines.join(" ");
    ParsedChecklist {
        summary: (!summary.is_empty()).then_some(summary),
        steps,
    }
}

/// Shell commands from a fenced block: comments and blank lines dropped,
/// `$ ` prompts stripped, backslash continuations joined.
pub fn block_commands(lines: &[String]) -> Vec<String> {
    let mut commands = Vec::new();
    let mut pending = String::new();
    for line in lines {
        let line = line.trim();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#')) {
            continue;
        }
        let line = if pending.is_empty() { strip_prompt(line) } else { line };
        match line.strip_suffix('\\') {
            Some(head) => {
                pending.push_str(head.trim_end());
                pending.push(' ');
            }
            None => {
                pending.push_str(line);
                commands.push(pending.trim().to_string());
                pending.clear();
            }
        }
    }
    if !pending.trim().is_empty() {
        commands.push(pending.trim().to_string());
    }
    commands
}

fn strip_prompt(line: &str) -> &str {
    line.strip_prefix("$ ").unwrap_or(line)
}

/// Headline text of a numbered step line, or `None`.
///
/// Only lines indented by at most one space start a step, so nested
/// numbered lists stay inside the step they belong to.
fn step_start(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start().len();
    if indent > 1 {
        return None;
    }
    let mut rest = line.trim().trim_start_matches('#').trim_start();
    rest = rest.trim_start_matches('*').trim_start();
    if rest.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("step ")) {
        rest = rest[5..].trim_start();
    }

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 3 {
        return None;
    }
    let after = &rest[digits..];
    let after = after
        .strip_prefix('.')
        .or_else(|| after.strip_prefix(')'))
        .or_else(|| after.strip_prefix(':'))?;
    // "1.5 GB" is not a step.
    if !(after.is_empty() || after.starts_with(char::is_whitespace) || after.starts_with('*')) {
        return None;
    }
    Some(after.trim_start_matches('*').trim())
}

/// Pull a priority marker off the front or back of a step headline.
fn split_priority(headline: &str) -> (Option<Priority>, String) {
    let text = headline.trim();

    if let Some(open) = text.chars().next().filter(|c| *c == '[' || *c == '(') {
        let close = if open == '[' { ']' } else { ')' };
        if let Some(end) = text.find(close) {
            if let Some(p) = priority_marker(&text[1..end]) {
                let rest = text[end + 1..].trim_start_matches([':', '-', '*', ' ']);
                return (Some(p), clean_headline(rest));
            }
        }
    }

    if let Some((head, tail)) = text.split_once(':') {
        if let Some(p) = priority_marker(head) {
            return (Some(p), clean_headline(tail));
        }
    }

    if let Some(stripped) = text.strip_suffix(']').or_else(|| text.strip_suffix(')')) {
        let open = if text.ends_with(']') { '[' } else { '(' };
        if let Some(start) = stripped.rfind(open) {
            if let Some(p) = priority_marker(&stripped[start + 1..]) {
                return (Some(p), clean_headline(&stripped[..start]));
            }
        }
    }

    (None, clean_headline(text))
}

fn priority_marker(text: &str) -> Option<Priority> {
    let text = text.trim().trim_matches('*').trim();
    let text = match text.split_once(':') {
        Some((key, value)) if key.trim().eq_ignore_ascii_case("priority") => value,
        _ => text,
    };
    text.parse().ok()
}

fn clean_headline(text: &str) -> String {
    text.trim().trim_matches('*').trim().to_string()
}

/// Recognise `Rationale: ...`-style lines, tolerating bullets and bold.
fn field_line(line: &str) -> Option<(Field, &str)> {
    let body = strip_bullet(line);
    let (key, value) = body.split_once(':')?;
    let key = key.trim().trim_matches(|c| c == '*' || c == '_').trim();
    if key.len() > 24 {
        return None;
    }
    let field = match key.to_ascii_lowercase().as_str() {
        "instruction" | "action" | "step" => Field::Instruction,
        "rationale" | "why" | "reason" => Field::Rationale,
        "current" | "current value" | "observed" | "observed value" => Field::Current,
        "expected" | "expected value" | "target" | "healthy value" => Field::Expected,
        "priority" => Field::Priority,
        "command" | "commands" | "run" => Field::Command,
        _ => return None,
    };
    let value = value.trim().trim_start_matches(['*', '_']).trim();
    Some((field, value))
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim_start();
        }
    }
    line
}

fn summary_text(line: &str) -> Option<&str> {
    if line.starts_with('#') {
        return None;
    }
    let line = line.trim_start_matches(['*', '_']).trim_start();
    let text = match line.split_once(':') {
        Some((key, rest)) if key.trim_matches(['*', '_']).eq_ignore_ascii_case("summary") => {
            rest.trim_start_matches(['*', '_']).trim()
        }
        _ => line,
    };
    (!text.is_empty()).then_some(text)
}

fn optional_value(value: &str) -> Option<String> {
    let value = value.trim().trim_matches('`').trim();
    match value.to_ascii_lowercase().as_str() {
        "" | "n/a" | "na" | "none" | "unknown" | "-" => None,
        _ => Some(value.to_string()),
    }
}
