use std::collections::BTreeMap;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::types::{FrontMatter, Span};

/// Outcome of splitting the leading front matter block off the source.
#[derive(Debug)]
pub struct BodySplit<'a> {
    pub front_matter: FrontMatter,
    /// Remaining text with the block and its delimiters stripped.
    pub body: &'a str,
    /// 1-based line number of the body's first line in the source.
    pub body_line: usize,
    /// Byte offset of the body within the source.
    pub body_offset: usize,
}

/// Split YAML front matter from the beginning of the source.
///
/// A source that does not open with a `---` delimiter line passes
/// through unchanged with empty front matter. An opening delimiter with
/// no closing delimiter is fatal. A terminated block whose YAML does
/// not deserialize degrades to unrecognized-key capture with a warning.
pub fn extract<'a>(
    source: &'a str,
    warnings: &mut Vec<Diagnostic>,
) -> Result<BodySplit<'a>, Diagnostic> {
    let lines: Vec<&str> = source.split('\n').collect();
    if lines.is_empty() || lines[0].trim_end() != "---" {
        return Ok(BodySplit {
            front_matter: FrontMatter::default(),
            body: source,
            body_line: 1,
            body_offset: 0,
        });
    }

    // Find the closing delimiter. Leading whitespace disqualifies a
    // line so indented `---` inside YAML block scalars cannot close.
    let mut offset = lines[0].len() + 1;
    let mut close: Option<(usize, usize)> = None;
    for (idx, line) in lines.iter().enumerate().skip(1) {
        if line.trim_end() == "---" {
            close = Some((idx, offset));
            break;
        }
        offset += line.len() + 1;
    }

    let Some((close_idx, close_offset)) = close else {
        return Err(Diagnostic::error(
            DiagnosticKind::UnterminatedFrontMatter,
            "front matter opened with `---` but never closed",
            Some(Span {
                start_line: 1,
                end_line: 1,
                start_offset: 0,
                end_offset: lines[0].len(),
            }),
        ));
    };

    let block_span = Span {
        start_line: 1,
        end_line: close_idx + 1,
        start_offset: 0,
        end_offset: close_offset + lines[close_idx].len(),
    };
    let yaml = lines[1..close_idx].join("\n");
    let front_matter = parse_yaml(&yaml, block_span, warnings);

    let body_offset = (close_offset + lines[close_idx].len() + 1).min(source.len());
    Ok(BodySplit {
        front_matter,
        body: &source[body_offset..],
        body_line: close_idx + 2,
        body_offset,
    })
}

fn parse_yaml(yaml: &str, span: Span, warnings: &mut Vec<Diagnostic>) -> FrontMatter {
    if yaml.trim().is_empty() {
        return FrontMatter::default();
    }
    match serde_yaml::from_str::<FrontMatter>(yaml) {
        Ok(front_matter) => front_matter,
        Err(e) => {
            warnings.push(Diagnostic::warning(
                DiagnosticKind::InvalidFrontMatter,
                format!("front matter YAML did not deserialize: {e}"),
                Some(span),
            ));
            // Salvage what we can: a plain mapping still round-trips
            // through `extra` even when the typed fields reject it.
            match serde_yaml::from_str::<BTreeMap<String, serde_yaml::Value>>(yaml) {
                Ok(extra) => FrontMatter {
                    extra,
                    ..Default::default()
                },
                Err(_) => FrontMatter::default(),
            }
        }
    }
}
