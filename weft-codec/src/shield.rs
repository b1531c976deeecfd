//! Placeholder substitution for chunk regions.
//!
//! The prose parser must never see chunk bodies, otherwise markdown
//! metacharacters inside code would distort the surrounding document.
//! Each descriptor's source range is replaced with an opaque token that
//! parses as a standalone paragraph; the assembler swaps the tokens
//! back for code-block nodes.

use std::collections::HashMap;

use uuid::Uuid;

use crate::types::CodeChunkDescriptor;

/// Body text with chunk regions replaced by placeholder tokens.
pub struct ShieldedBody {
    /// Prose text handed to the markdown parser.
    pub text: String,
    /// Token to descriptor index, for the assembler.
    pub map: HashMap<String, usize>,
}

/// Replace every descriptor's range with a freshly minted token.
///
/// Descriptor ranges are absolute, so `body_offset` converts them back
/// into `body` coordinates. Tokens are checked against the whole body
/// before use; a colliding draw is discarded and re-minted.
pub fn shield(
    body: &str,
    body_offset: usize,
    descriptors: &[CodeChunkDescriptor],
) -> ShieldedBody {
    let mut text = String::with_capacity(body.len());
    let mut map = HashMap::with_capacity(descriptors.len());
    let mut last = 0usize;

    for (index, descriptor) in descriptors.iter().enumerate() {
        let start = descriptor.source_range.start_offset - body_offset;
        let end = (descriptor.source_range.end_offset - body_offset).min(body.len());
        text.push_str(&body[last..start]);
        // A chunk fence sits at column 0, so anything before it already
        // ends with a newline. Add one more so the token is its own
        // paragraph even when the preceding line holds prose.
        if !text.is_empty() && !text.ends_with("\n\n") {
            text.push('\n');
        }
        let token = mint_token(body, index);
        text.push_str(&token);
        text.push('\n');
        map.insert(token, index);
        last = end;
        // skip the newline that followed the closing fence
        if body[last..].starts_with('\n') {
            last += 1;
        }
        // and isolate the token from a directly adjacent prose line
        if !body[last..].is_empty() && !body[last..].starts_with('\n') {
            text.push('\n');
        }
    }
    text.push_str(&body[last..]);

    ShieldedBody { text, map }
}

fn mint_token(body: &str, index: usize) -> String {
    loop {
        let suffix = Uuid::new_v4().simple().to_string();
        let token = format!("weft-shield-{index}-{}", &suffix[..16]);
        if !body.contains(&token) {
            return token;
        }
    }
}
