//! Line scanner that locates fenced, executable code chunks.
//!
//! A chunk opens with a column-0 backtick fence carrying a brace header
//! (` ```{engine label, key=value, ...} `) and closes at a line of the
//! same fence character with run length at least the opener's. Generic
//! fenced blocks (no brace header, or tilde fences) are tracked only so
//! chunk-like lines inside them are not mistaken for openers; they
//! belong to the prose parser.

use std::collections::HashSet;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::types::{ChunkOptions, CodeChunkDescriptor, Span};

struct ChunkHeader {
    engine: String,
    label: Option<String>,
    options: ChunkOptions,
}

enum HeaderItem {
    Option(String, String),
    Bare(String),
}

/// Scan body text for chunk fences, producing descriptors in source
/// order with non-overlapping, ascending ranges.
///
/// `base_line` and `base_offset` locate the body within the full source
/// so spans come out in absolute coordinates. An unterminated chunk
/// fence is fatal; a malformed header downgrades its region to a
/// generic fence and scanning continues.
pub fn scan(
    body: &str,
    base_line: usize,
    base_offset: usize,
    warnings: &mut Vec<Diagnostic>,
) -> Result<Vec<CodeChunkDescriptor>, Diagnostic> {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut descriptors = Vec::new();
    let mut seen_labels: HashSet<String> = HashSet::new();
    // open generic fence, if any: (fence char, opening run length)
    let mut generic: Option<(char, usize)> = None;
    let mut offset = 0usize;
    let mut idx = 0usize;

    while idx < lines.len() {
        let line = lines[idx];

        if let Some((ch, run)) = generic {
            if closes_generic_fence(line, ch, run) {
                generic = None;
            }
        } else if let Some((open_run, header_src)) = chunk_fence_open(line) {
            match parse_header(header_src) {
                Ok(header) => {
                    let mut close: Option<(usize, usize)> = None;
                    let mut scan_offset = offset + line.len() + 1;
                    for (j, candidate) in lines.iter().enumerate().skip(idx + 1) {
                        if closes_chunk_fence(candidate, open_run) {
                            close = Some((j, scan_offset));
                            break;
                        }
                        scan_offset += candidate.len() + 1;
                    }

                    let Some((close_idx, close_offset)) = close else {
                        return Err(Diagnostic::error(
                            DiagnosticKind::UnterminatedChunk,
                            format!(
                                "chunk fence opened at line {} has no closing fence",
                                base_line + idx
                            ),
                            Some(Span {
                                start_line: base_line + idx,
                                end_line: base_line + lines.len() - 1,
                                start_offset: base_offset + offset,
                                end_offset: base_offset + body.len(),
                            }),
                        ));
                    };

                    let content_start = (offset + line.len() + 1).min(body.len());
                    let content = &body[content_start..close_offset];
                    let code = content.strip_suffix('\n').unwrap_or(content);

                    let span = Span {
                        start_line: base_line + idx,
                        end_line: base_line + close_idx,
                        start_offset: base_offset + offset,
                        end_offset: base_offset + close_offset + lines[close_idx].len(),
                    };

                    let label = match header.label {
                        Some(label) if !seen_labels.insert(label.clone()) => {
                            warnings.push(Diagnostic::warning(
                                DiagnosticKind::DuplicateChunkLabel,
                                format!(
                                    "chunk label `{label}` already used; treating this chunk as unlabeled"
                                ),
                                Some(span),
                            ));
                            None
                        }
                        other => other,
                    };

                    descriptors.push(CodeChunkDescriptor {
                        label,
                        engine: header.engine,
                        options: header.options,
                        code: code.to_string(),
                        source_range: span,
                    });

                    offset = close_offset + lines[close_idx].len() + 1;
                    idx = close_idx + 1;
                    continue;
                }
                Err(reason) => {
                    warnings.push(Diagnostic::warning(
                        DiagnosticKind::MalformedChunkHeader,
                        format!("cannot read chunk header `{}`: {reason}", line.trim_end()),
                        Some(Span {
                            start_line: base_line + idx,
                            end_line: base_line + idx,
                            start_offset: base_offset + offset,
                            end_offset: base_offset + offset + line.len(),
                        }),
                    ));
                    generic = Some(('`', open_run));
                }
            }
        } else if let Some((ch, run)) = generic_fence_open(line) {
            generic = Some((ch, run));
        }

        offset += line.len() + 1;
        idx += 1;
    }

    Ok(descriptors)
}

// ------------------------------------------------------------------
// Line classification
// ------------------------------------------------------------------

/// A column-0 backtick fence followed by a brace header. Returns the
/// fence run length and the remainder starting at `{`.
fn chunk_fence_open(line: &str) -> Option<(usize, &str)> {
    if !line.starts_with("```") {
        return None;
    }
    let run = line.chars().take_while(|&c| c == '`').count();
    let rest = line[run..].trim_start();
    if rest.starts_with('{') {
        Some((run, rest))
    } else {
        None
    }
}

fn closes_chunk_fence(line: &str, open_run: usize) -> bool {
    let t = line.trim_end();
    !t.is_empty() && t.len() >= open_run && t.chars().all(|c| c == '`')
}

/// A generic fence opener per CommonMark: up to 3 spaces of indent, a
/// run of 3+ backticks or tildes, and (for backticks) an info string
/// free of backticks.
fn generic_fence_open(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let run = trimmed.chars().take_while(|&c| c == ch).count();
    if run < 3 {
        return None;
    }
    if ch == '`' && trimmed[run..].contains('`') {
        return None;
    }
    Some((ch, run))
}

fn closes_generic_fence(line: &str, ch: char, open_run: usize) -> bool {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return false;
    }
    let t = trimmed.trim_end();
    !t.is_empty() && t.chars().all(|c| c == ch) && t.chars().count() >= open_run
}

// ------------------------------------------------------------------
// Header grammar
// ------------------------------------------------------------------

/// Parse `{engine[ label][, label][, key=value]*}` starting at the
/// opening brace. Values may be double-quoted to carry commas, braces,
/// or quotes; `\"` and `\\` are the only recognized escapes.
fn parse_header(rest: &str) -> Result<ChunkHeader, String> {
    let inner_src = &rest[1..];
    let mut in_quotes = false;
    let mut escaped = false;
    let mut close = None;
    for (i, c) in inner_src.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '}' if !in_quotes => {
                close = Some(i);
                break;
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return Err("no closing `}`".into());
    };
    if !inner_src[close + 1..].trim().is_empty() {
        return Err("unexpected text after `}`".into());
    }

    let items = split_items(&inner_src[..close])?;
    let first = &items[0];
    if first.is_empty() {
        return Err("missing engine".into());
    }

    let mut words = first.split_whitespace();
    let engine = words.next().unwrap_or_default();
    if !valid_engine(engine) {
        return Err(format!("invalid engine `{engine}`"));
    }
    let mut label = match words.next() {
        Some(word) if valid_label(word) => Some(word.to_string()),
        Some(word) => return Err(format!("invalid label `{word}`")),
        None => None,
    };
    if words.next().is_some() {
        return Err("too many tokens before the first comma".into());
    }

    let mut options = ChunkOptions::new();
    for item in &items[1..] {
        if item.is_empty() {
            return Err("empty option entry".into());
        }
        match parse_item(item)? {
            HeaderItem::Option(key, value) => options.push((key, value)),
            HeaderItem::Bare(word) => {
                if label.is_some() {
                    return Err(format!("unexpected bare token `{word}`; label already set"));
                }
                label = Some(word);
            }
        }
    }

    Ok(ChunkHeader {
        engine: engine.to_string(),
        label,
        options,
    })
}

/// Split header items at commas, leaving quoted segments intact.
fn split_items(inner: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in inner.chars() {
        if in_quotes {
            if escaped {
                current.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    current.push(c);
                    escaped = true;
                }
                '"' => {
                    current.push(c);
                    in_quotes = false;
                }
                _ => current.push(c),
            }
        } else {
            match c {
                '"' => {
                    current.push(c);
                    in_quotes = true;
                }
                ',' => {
                    items.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            }
        }
    }
    if in_quotes {
        return Err("unterminated quoted value".into());
    }
    items.push(current.trim().to_string());
    Ok(items)
}

fn parse_item(item: &str) -> Result<HeaderItem, String> {
    let eq = item.find('=');
    let quote = item.find('"');
    match eq {
        Some(pos) if quote.is_none_or(|q| pos < q) => {
            let key = item[..pos].trim();
            if !valid_key(key) {
                return Err(format!("invalid option key `{key}`"));
            }
            let value = parse_value(item[pos + 1..].trim())?;
            Ok(HeaderItem::Option(key.to_string(), value))
        }
        _ => {
            if !valid_label(item) {
                return Err(format!("invalid token `{item}`"));
            }
            Ok(HeaderItem::Bare(item.to_string()))
        }
    }
}

fn parse_value(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("missing value after `=`".into());
    }
    let Some(quoted) = raw.strip_prefix('"') else {
        if raw.contains('"') {
            return Err("quote inside unquoted value".into());
        }
        return Ok(raw.to_string());
    };

    let mut value = String::new();
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next @ ('"' | '\\')) => value.push(next),
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => return Err("dangling escape in quoted value".into()),
            },
            '"' => {
                if !chars.as_str().trim().is_empty() {
                    return Err("unexpected text after closing quote".into());
                }
                return Ok(value);
            }
            _ => value.push(c),
        }
    }
    Err("unterminated quoted value".into())
}

fn valid_engine(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '.'))
}

fn valid_label(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn valid_key(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
