//! Tree assembly.
//!
//! Folds prose blocks and chunk descriptors into the canonical
//! [`Document`]: placeholders resolve to executable code-block nodes,
//! every node gets a pre-order id, and any shield token still visible
//! in text content is reported as fatal.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Diagnostic, DiagnosticKind};
use crate::prose::ProseBlock;
use crate::types::{
    ChunkOptions, CodeChunkDescriptor, ContentNode, Document, FrontMatter, NodeId, NodeKind, Run,
};

/// Build a document from parsed blocks.
///
/// Ids are assigned in pre-order, parent before children, so that two
/// structurally equal documents compare equal. Any unresolved or leaked
/// placeholder is collected into the returned error list; a document is
/// only produced when that list would be empty.
pub fn assemble(
    blocks: Vec<ProseBlock>,
    descriptors: &[CodeChunkDescriptor],
    tokens: &HashMap<String, usize>,
    front_matter: FrontMatter,
) -> Result<Document, Vec<Diagnostic>> {
    let mut assembler = Assembler {
        descriptors,
        tokens,
        next_id: 0,
        errors: Vec::new(),
    };
    let children = assembler.convert_all(blocks);

    let mut leaked = BTreeSet::new();
    for node in &children {
        scan_node(node, tokens, &mut leaked);
    }
    for token in leaked {
        assembler.errors.push(Diagnostic::error(
            DiagnosticKind::UnresolvedPlaceholder,
            format!("placeholder `{token}` leaked into the document tree"),
            None,
        ));
    }

    if assembler.errors.is_empty() {
        Ok(Document {
            metadata: front_matter,
            children,
        })
    } else {
        Err(assembler.errors)
    }
}

struct Assembler<'a> {
    descriptors: &'a [CodeChunkDescriptor],
    tokens: &'a HashMap<String, usize>,
    next_id: u32,
    errors: Vec<Diagnostic>,
}

impl Assembler<'_> {
    fn next(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn convert_all(&mut self, blocks: Vec<ProseBlock>) -> Vec<ContentNode> {
        blocks
            .into_iter()
            .filter_map(|block| self.convert(block))
            .collect()
    }

    fn convert(&mut self, block: ProseBlock) -> Option<ContentNode> {
        let id = self.next();
        let kind = match block {
            ProseBlock::Paragraph(text) => NodeKind::Paragraph { text },
            ProseBlock::Heading { level, text } => NodeKind::Heading { level, text },
            ProseBlock::CodeFence { language, code } => NodeKind::CodeBlock {
                language,
                label: None,
                options: ChunkOptions::new(),
                executable: false,
                code,
            },
            ProseBlock::ThematicBreak => NodeKind::ThematicBreak,
            ProseBlock::Blockquote(blocks) => NodeKind::Blockquote {
                children: self.convert_all(blocks),
            },
            ProseBlock::List {
                ordered,
                start,
                items,
            } => NodeKind::List {
                ordered,
                start,
                children: items
                    .into_iter()
                    .map(|item| {
                        let item_id = self.next();
                        let children = self.convert_all(item);
                        ContentNode::new(item_id, NodeKind::ListItem { children })
                    })
                    .collect(),
            },
            ProseBlock::Placeholder(token) => {
                let descriptor = self
                    .tokens
                    .get(&token)
                    .and_then(|&index| self.descriptors.get(index));
                match descriptor {
                    Some(d) => NodeKind::CodeBlock {
                        language: Some(d.engine.clone()),
                        label: d.label.clone(),
                        options: d.options.clone(),
                        executable: true,
                        code: d.code.clone(),
                    },
                    None => {
                        self.errors.push(Diagnostic::error(
                            DiagnosticKind::UnresolvedPlaceholder,
                            format!("placeholder `{token}` does not match any code chunk"),
                            None,
                        ));
                        return None;
                    }
                }
            }
        };
        Some(ContentNode::new(id, kind))
    }
}

// ------------------------------------------------------------------
// Leak detection
// ------------------------------------------------------------------

fn scan_node(node: &ContentNode, tokens: &HashMap<String, usize>, found: &mut BTreeSet<String>) {
    match &node.kind {
        NodeKind::Paragraph { text } | NodeKind::Heading { text, .. } => {
            scan_runs(text, tokens, found);
        }
        NodeKind::CodeBlock {
            code, executable, ..
        } => {
            // executable bodies came straight from descriptors and
            // tokens are minted to never collide with them
            if !executable {
                scan_str(code, tokens, found);
            }
        }
        _ => {}
    }
    for child in node.children() {
        scan_node(child, tokens, found);
    }
}

fn scan_runs(runs: &[Run], tokens: &HashMap<String, usize>, found: &mut BTreeSet<String>) {
    for run in runs {
        match run {
            Run::Text(s) | Run::Code(s) => scan_str(s, tokens, found),
            Run::Emphasis(inner) | Run::Strong(inner) => scan_runs(inner, tokens, found),
            Run::Link { text, .. } => scan_runs(text, tokens, found),
            Run::Image { alt, .. } => scan_str(alt, tokens, found),
            Run::HardBreak => {}
        }
    }
}

fn scan_str(s: &str, tokens: &HashMap<String, usize>, found: &mut BTreeSet<String>) {
    for token in tokens.keys() {
        if s.contains(token) {
            found.insert(token.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunks, prose, shield};
    use pretty_assertions::assert_eq;

    fn assemble_source(body: &str) -> Result<Document, Vec<Diagnostic>> {
        let mut warnings = Vec::new();
        let descriptors = chunks::scan(body, 1, 0, &mut warnings).expect("scan");
        let shielded = shield::shield(body, 0, &descriptors);
        let blocks = prose::parse_blocks(&shielded.text, &shielded.map);
        assemble(blocks, &descriptors, &shielded.map, FrontMatter::default())
    }

    fn collect_ids(nodes: &[ContentNode], out: &mut Vec<u32>) {
        for node in nodes {
            out.push(node.id.0);
            collect_ids(node.children(), out);
        }
    }

    #[test]
    fn ids_are_dense_preorder() {
        let doc = assemble_source("# H\n\n- a\n- b\n\ntext\n").expect("assemble");
        let mut ids = Vec::new();
        collect_ids(&doc.children, &mut ids);
        assert_eq!(ids, (0..ids.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn placeholder_resolves_to_executable_code_block() {
        let doc = assemble_source("intro\n\n```{r setup, echo=TRUE}\ncode()\n```\n").expect("ok");
        assert_eq!(doc.children.len(), 2);
        let NodeKind::CodeBlock {
            language,
            label,
            options,
            executable,
            code,
        } = &doc.children[1].kind
        else {
            panic!("expected code block, got {:?}", doc.children[1].kind);
        };
        assert_eq!(language.as_deref(), Some("r"));
        assert_eq!(label.as_deref(), Some("setup"));
        assert_eq!(options, &vec![("echo".to_string(), "TRUE".to_string())]);
        assert!(*executable);
        assert_eq!(code, "code()");
    }

    #[test]
    fn plain_fence_is_not_executable() {
        let doc = assemble_source("```text\nx\n```\n").expect("ok");
        let NodeKind::CodeBlock {
            language,
            executable,
            label,
            ..
        } = &doc.children[0].kind
        else {
            panic!("expected code block");
        };
        assert_eq!(language.as_deref(), Some("text"));
        assert!(!*executable);
        assert_eq!(*label, None);
    }

    #[test]
    fn token_swallowed_by_raw_html_is_fatal() {
        // <pre> opens an HTML block that only a closing tag ends, so
        // the shield token is captured as raw text instead of its own
        // paragraph.
        let err = assemble_source("<pre>\n```{r}\nx\n```\n</pre>\n").unwrap_err();
        assert!(
            err.iter()
                .all(|d| d.kind == DiagnosticKind::UnresolvedPlaceholder),
            "diagnostics: {err:?}"
        );
        assert!(!err.is_empty());
    }

    #[test]
    fn front_matter_is_attached() {
        let mut warnings = Vec::new();
        let descriptors = chunks::scan("hello\n", 1, 0, &mut warnings).expect("scan");
        let shielded = shield::shield("hello\n", 0, &descriptors);
        let blocks = prose::parse_blocks(&shielded.text, &shielded.map);
        let fm = FrontMatter {
            title: Some("T".to_string()),
            ..FrontMatter::default()
        };
        let doc = assemble(blocks, &descriptors, &shielded.map, fm).expect("ok");
        assert_eq!(doc.metadata.title.as_deref(), Some("T"));
    }

    #[test]
    fn chunks_interleave_with_prose_in_order() {
        let doc = assemble_source("```{r a}\n1\n```\n\nmiddle\n\n```{python}\n2\n```\n")
            .expect("ok");
        let kinds: Vec<&str> = doc.children.iter().map(|n| n.type_tag()).collect();
        assert_eq!(kinds, vec!["code_block", "paragraph", "code_block"]);
        let NodeKind::CodeBlock { language, .. } = &doc.children[2].kind else {
            panic!("expected code block");
        };
        assert_eq!(language.as_deref(), Some("python"));
    }
}
