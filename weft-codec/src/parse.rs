//! Parsing pipeline.
//!
//! Source text runs through front matter extraction, the chunk
//! scanner, placeholder shielding, the prose parser, and finally tree
//! assembly. Fatal diagnostics stop the pipeline; recoverable ones
//! accumulate as warnings alongside a complete document.

use serde::Serialize;

use crate::error::Diagnostic;
use crate::types::{CodeChunkDescriptor, Document};
use crate::{assemble, chunks, front_matter, prose, shield};

/// Result of parsing. `document` is present exactly when `errors` is
/// empty; `warnings` may be non-empty either way.
#[derive(Debug, Serialize)]
pub struct ParseOutput {
    pub document: Option<Document>,
    pub metadata: ParseMetadata,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Side products of a successful parse.
#[derive(Debug, Default, Serialize)]
pub struct ParseMetadata {
    /// Code chunk descriptors in source order, with absolute spans
    /// into the (line-ending normalized) source.
    pub code_chunks: Vec<CodeChunkDescriptor>,
}

/// Parse source text into a canonical document.
///
/// Line endings are normalized to `\n` first, so spans index into the
/// normalized text. This function does not panic on any input.
pub fn parse(source: &str) -> ParseOutput {
    let normalized = source.replace("\r\n", "\n");
    let mut warnings = Vec::new();

    let split = match front_matter::extract(&normalized, &mut warnings) {
        Ok(split) => split,
        Err(diag) => return fatal(vec![diag], warnings),
    };

    let descriptors = match chunks::scan(
        split.body,
        split.body_line,
        split.body_offset,
        &mut warnings,
    ) {
        Ok(descriptors) => descriptors,
        Err(diag) => return fatal(vec![diag], warnings),
    };

    let shielded = shield::shield(split.body, split.body_offset, &descriptors);
    let blocks = prose::parse_blocks(&shielded.text, &shielded.map);

    match assemble::assemble(blocks, &descriptors, &shielded.map, split.front_matter) {
        Ok(document) => ParseOutput {
            document: Some(document),
            metadata: ParseMetadata {
                code_chunks: descriptors,
            },
            errors: Vec::new(),
            warnings,
        },
        Err(errors) => fatal(errors, warnings),
    }
}

fn fatal(errors: Vec<Diagnostic>, warnings: Vec<Diagnostic>) -> ParseOutput {
    ParseOutput {
        document: None,
        metadata: ParseMetadata::default(),
        errors,
        warnings,
    }
}
