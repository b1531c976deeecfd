//! `weft-codec`: bidirectional codec for the WeftDoc format.
//!
//! WeftDoc is a literate-document format: YAML front matter, markdown
//! prose, and fenced executable code chunks. This crate parses source
//! text into a canonical [`Document`] tree and renders trees back to
//! source, such that parsing the rendered text reproduces the tree.
//!
//! # Quick start
//!
//! ```
//! let result = weft_codec::parse("---\ntitle: Demo\n---\n\n# Hello\n\nBody text.\n");
//! assert!(result.errors.is_empty());
//! let doc = result.document.expect("no fatal errors");
//! assert_eq!(doc.metadata.title.as_deref(), Some("Demo"));
//! assert_eq!(doc.children.len(), 2);
//! ```

pub mod assemble;
pub mod chunks;
pub mod error;
pub mod front_matter;
pub mod parse;
pub mod prose;
pub mod render;
pub mod shield;
pub mod types;

pub use error::*;
pub use parse::{ParseMetadata, ParseOutput, parse};
pub use render::{RenderOutput, render};
pub use types::*;

impl Document {
    /// Render this document back to WeftDoc source text.
    pub fn to_source(&self) -> RenderOutput {
        render::render(self)
    }
}
