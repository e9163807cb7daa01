//! Heading-aware runbook chunker.
//!
//! Splits one runbook document into [`ChunkDraft`]s along level-2/level-3
//! heading boundaries, carrying the document's front-matter tags and
//! applicable-target patterns onto every section.
//!
//! # Algorithm
//!
//! 1. Strip optional front-matter (a TOML table between `+++` or `---`
//!    lines). Malformed front-matter is ignored: the whole text becomes the
//!    body and the metadata lists stay empty.
//! 2. Walk the body line by line. Lines inside a fenced code block (```` ``` ````
//!    or `~~~`) are never inspected for headings.
//! 3. Every `##`/`###` heading starts a new section. Text before the first
//!    such heading forms a preamble section named after the document.
//! 4. Sections shorter than `min_section_chars` are merged into the previous
//!    section (or into the next one when there is no previous section).
//! 5. Sections longer than `max_section_chars` are re-split at paragraph
//!    boundaries. A fenced code block is an atomic unit and is never split,
//!    even when it alone exceeds the limit.
//!
//! An empty document yields no drafts.
//!
//! # Example
//!
//! ```rust
//! use runbook_rag_core::chunk::{chunk_document, ChunkingOptions};
//!
//! let drafts = chunk_document(
//!     "memory.md",
//!     "# Memory\n## Diagnose\nRun `free -h`",
//!     &ChunkingOptions::default(),
//! );
//! assert_eq!(drafts.len(), 1);
//! assert_eq!(drafts[0].section_title, "Diagnose");
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::models::ChunkDraft;

/// Sections shorter than this are merged into a neighbour.
pub const DEFAULT_MIN_SECTION_CHARS: usize = 100;

/// Sections longer than this are re-split at paragraph boundaries.
pub const DEFAULT_MAX_SECTION_CHARS: usize = 2000;

/// Size bounds applied to chunked sections, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    pub min_section_chars: usize,
    pub max_section_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            min_section_chars: DEFAULT_MIN_SECTION_CHARS,
            max_section_chars: DEFAULT_MAX_SECTION_CHARS,
        }
    }
}

/// Runbook front-matter. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, alias = "applicable_targets", alias = "applicable_shapes")]
    targets: Vec<String>,
}

struct Section {
    title: String,
    text: String,
}

/// Split a runbook document into chunk drafts.
///
/// Never fails: unparseable input degrades to fewer, larger sections and
/// empty input yields an empty list.
pub fn chunk_document(source_path: &str, text: &str, opts: &ChunkingOptions) -> Vec<ChunkDraft> {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Vec::new();
    }

    let (front, body) = split_front_matter(text);
    let doc_title = front
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| first_h1(body))
        .unwrap_or_else(|| file_stem(source_path));

    let sections = merge_short_sections(split_sections(body, &doc_title), opts.min_section_chars);

    let max_chars = opts.max_section_chars.max(1);
    let mut drafts = Vec::new();
    for section in sections {
        for piece in split_oversized(&section.text, max_chars) {
            drafts.push(ChunkDraft {
                source_path: source_path.to_string(),
                section_title: section.title.clone(),
                content: piece,
                tags: front.tags.clone(),
                target_patterns: front.targets.clone(),
                chunk_index: drafts.len(),
            });
        }
    }
    drafts
}

/// SHA-256 of a chunk's text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============ Front-matter ============

fn split_front_matter(text: &str) -> (FrontMatter, &str) {
    let first_line_end = text.find('\n').unwrap_or(text.len());
    let delimiter = text[..first_line_end].trim();
    if delimiter != "+++" && delimiter != "---" {
        return (FrontMatter::default(), text);
    }

    let rest = &text[(first_line_end + 1).min(text.len())..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim() == delimiter {
            let inner = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return match toml::from_str::<FrontMatter>(inner) {
                Ok(front) => (front, body),
                Err(_) => (FrontMatter::default(), text),
            };
        }
        offset += line.len();
    }

    // No closing delimiter.
    (FrontMatter::default(), text)
}

fn first_h1(body: &str) -> Option<String> {
    let mut fence = FenceTracker::default();
    for line in body.lines() {
        if fence.observe(line) {
            continue;
        }
        if let Some((1, title)) = heading(line) {
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

fn file_stem(source_path: &str) -> String {
    let name = source_path.rsplit('/').next().unwrap_or(source_path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

// ============ Sections ============

/// Tracks whether the current line is inside a fenced code block.
#[derive(Default)]
pub(crate) struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    /// Feed one line; returns true if the line is a fence line or lies
    /// inside a fenced block.
    pub(crate) fn observe(&mut self, line: &str) -> bool {
        let marker = fence_marker(line);
        match (self.open, marker) {
            (Some((ch, len)), Some((mch, mlen, rest)))
                if mch == ch && mlen >= len && rest.trim().is_empty() =>
            {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, Some((mch, mlen, _))) => {
                self.open = Some((mch, mlen));
                true
            }
            (None, None) => false,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

/// Returns `(fence char, run length, info string)` for a fence line.
fn fence_marker(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let run = trimmed.chars().take_while(|c| *c == ch).count();
    if run < 3 {
        return None;
    }
    Some((ch, run, &trimmed[run..]))
}

/// Returns `(level, title)` for an ATX heading line.
fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim_end()))
}

fn split_sections(body: &str, doc_title: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        title: doc_title.to_string(),
        text: String::new(),
    };
    let mut fence = FenceTracker::default();

    for line in body.lines() {
        let in_fence = fence.observe(line);
        if !in_fence {
            if let Some((level, title)) = heading(line) {
                if level == 2 || level == 3 {
                    sections.push(current);
                    current = Section {
                        title: if title.is_empty() {
                            doc_title.to_string()
                        } else {
                            title.to_string()
                        },
                        text: String::new(),
                    };
                }
            }
        }
        current.text.push_str(line);
        current.text.push('\n');
    }
    sections.push(current);

    sections
        .into_iter()
        .map(|s| Section {
            title: s.title,
            text: trim_blank_lines(&s.text).to_string(),
        })
        .filter(|s| !s.text.is_empty())
        .collect()
}

fn merge_short_sections(sections: Vec<Section>, min_chars: usize) -> Vec<Section> {
    let mut merged: Vec<Section> = Vec::new();
    let mut carry: Option<Section> = None;

    for mut section in sections {
        if let Some(prefix) = carry.take() {
            section.text = format!("{}\n\n{}", prefix.text, section.text);
        }
        if char_len(&section.text) >= min_chars {
            merged.push(section);
            continue;
        }
        match merged.last_mut() {
            Some(prev) => {
                prev.text.push_str("\n\n");
                prev.text.push_str(&section.text);
            }
            None => carry = Some(section),
        }
    }

    if let Some(rest) = carry {
        merged.push(rest);
    }
    merged
}

// ============ Oversized sections ============

#[derive(PartialEq)]
enum BlockKind {
    Prose,
    Code,
}

struct Block {
    kind: BlockKind,
    text: String,
}

/// Group a section into paragraph blocks, keeping each fenced code block
/// (fence lines included) as a single block.
fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut fence = FenceTracker::default();

    let flush = |current: &mut String, kind: BlockKind, blocks: &mut Vec<Block>| {
        let trimmed = trim_blank_lines(current);
        if !trimmed.is_empty() {
            blocks.push(Block {
                kind,
                text: trimmed.to_string(),
            });
        }
        current.clear();
    };

    for line in text.lines() {
        let was_open = fence.is_open();
        let in_fence = fence.observe(line);

        if in_fence && !was_open {
            // Opening fence: close any paragraph in progress.
            flush(&mut current, BlockKind::Prose, &mut blocks);
        }

        if in_fence {
            current.push_str(line);
            current.push('\n');
            if !fence.is_open() {
                flush(&mut current, BlockKind::Code, &mut blocks);
            }
            continue;
        }

        if line.trim().is_empty() {
            flush(&mut current, BlockKind::Prose, &mut blocks);
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }

    // An unterminated fence swallows the rest of the section.
    let kind = if fence.is_open() {
        BlockKind::Code
    } else {
        BlockKind::Prose
    };
    flush(&mut current, kind, &mut blocks);
    blocks
}

fn split_oversized(text: &str, max_chars: usize) -> Vec<String> {
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut buf = String::new();

    for block in split_blocks(text) {
        let block_len = char_len(&block.text);
        if !buf.is_empty() && char_len(&buf) + 2 + block_len > max_chars {
            pieces.push(std::mem::take(&mut buf));
        }

        if block_len > max_chars && block.kind == BlockKind::Prose {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            pieces.extend(hard_split(&block.text, max_chars));
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(&block.text);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

/// Split a single oversized paragraph at the nearest newline or space
/// before the limit.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let limit = byte_index_of_char(remaining, max_chars);
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
    pieces
}

/// Byte offset of the `n`-th character (or the string length).
fn byte_index_of_char(s: &str, n: usize) -> usize {
    s.char_indices()
        .nth(n.max(1))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn trim_blank_lines(s: &str) -> &str {
    let mut start = 0;
    for line in s.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    let s = &s[start..];
    let mut end = s.len();
    for line in s.split_inclusive('\n').collect::<Vec<_>>().into_iter().rev() {
        if !line.trim().is_empty() {
            break;
        }
        end -= line.len();
    }
    s[..end].trim_end_matches(['\n', '\r'])
}
