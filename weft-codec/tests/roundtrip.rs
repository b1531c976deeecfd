//! Round-trip tests: parsing rendered output must reproduce the same
//! tree, and rendering that tree again must reproduce the same bytes.

use pretty_assertions::assert_eq;
use weft_codec::{
    ChunkOptions, ContentNode, Document, FrontMatter, NodeId, NodeKind, Run, parse,
};

fn read_fixture(name: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture '{}': {}", path.display(), e))
}

/// Parse, render, reparse, render again. Asserts the tree survives the
/// first cycle and the text is a fixed point of the second.
fn roundtrip(source: &str) -> (Document, String) {
    let first = parse(source);
    assert_eq!(first.errors, vec![], "first parse reported errors");
    let doc = first.document.expect("first parse produced no document");

    let out = doc.to_source();
    assert_eq!(out.errors, vec![], "render reported errors");
    let content = out.content.expect("render produced no content");

    let second = parse(&content);
    assert_eq!(second.errors, vec![], "reparse reported errors:\n{content}");
    let redoc = second.document.expect("reparse produced no document");
    assert_eq!(doc, redoc, "tree changed across a roundtrip:\n{content}");

    let again = redoc.to_source().content.expect("second render");
    assert_eq!(content, again, "rendering is not idempotent");
    (doc, content)
}

fn node(id: u32, kind: NodeKind) -> ContentNode {
    ContentNode::new(NodeId(id), kind)
}

fn text(s: &str) -> Run {
    Run::Text(s.to_string())
}

#[test]
fn analysis_fixture_roundtrips() {
    let source = read_fixture("analysis.weft");
    let (doc, _) = roundtrip(&source);

    // Typed front matter survives the cycle.
    assert_eq!(doc.metadata.title.as_deref(), Some("Penguin Morphology"));
    assert_eq!(doc.metadata.authors.len(), 2);
    assert_eq!(doc.metadata.date.as_deref(), Some("2026-03-14"));
    assert!(doc.metadata.output.is_some());
    assert!(doc.metadata.extra.contains_key("abstract"));
}

#[test]
fn nesting_fixture_roundtrips() {
    let source = read_fixture("nesting.weft");
    let (doc, rendered) = roundtrip(&source);

    // The guarded chunk keeps its inner triple-backtick lines.
    let outer = doc
        .children
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::CodeBlock {
                label: Some(label),
                code,
                ..
            } if label == "outer" => Some(code.clone()),
            _ => None,
        })
        .expect("outer chunk");
    assert!(outer.contains("```\nnot a fence\n```"));
    // and its rendering still opens with a four-backtick fence
    assert!(rendered.contains("````{python outer}\n"));
}

#[test]
fn minimal_fixture_renders_byte_identical() {
    let source = read_fixture("minimal.weft");
    let (_, rendered) = roundtrip(&source);
    assert_eq!(rendered, source);
}

#[test]
fn malformed_fixture_roundtrips_despite_warnings() {
    let source = read_fixture("malformed.weft");
    let first = parse(&source);
    assert_eq!(first.errors, vec![]);
    let codes: Vec<&str> = first.warnings.iter().map(|w| w.code()).collect();
    assert_eq!(codes, vec!["W203", "W201", "W202"]);
    let doc = first.document.expect("document");

    let content = doc.to_source().content.expect("content");
    let second = parse(&content);
    assert_eq!(second.errors, vec![]);
    assert_eq!(second.document, Some(doc));
    // Only the unparseable front matter still warns; the salvaged fence
    // and the renamed duplicate are now ordinary source.
    let codes: Vec<&str> = second.warnings.iter().map(|w| w.code()).collect();
    assert_eq!(codes, vec!["W203"]);
}

#[test]
fn markup_looking_text_survives_as_text() {
    let doc = Document {
        metadata: FrontMatter::default(),
        children: vec![
            node(
                0,
                NodeKind::Paragraph {
                    text: vec![text("# not a heading")],
                },
            ),
            node(
                1,
                NodeKind::Paragraph {
                    text: vec![text("1. not a list, *stars* kept, [brackets] too")],
                },
            ),
            node(
                2,
                NodeKind::Paragraph {
                    text: vec![text("> not a quote\n--- not a break")],
                },
            ),
        ],
    };

    let rendered = doc.to_source().content.expect("content");
    let reparsed = parse(&rendered);
    assert_eq!(reparsed.errors, vec![]);
    assert_eq!(reparsed.warnings, vec![]);
    assert_eq!(reparsed.document, Some(doc));
}

#[test]
fn nested_structure_keeps_preorder_ids() {
    let doc = Document {
        metadata: FrontMatter::default(),
        children: vec![
            node(
                0,
                NodeKind::List {
                    ordered: true,
                    start: 3,
                    children: vec![
                        node(
                            1,
                            NodeKind::ListItem {
                                children: vec![node(
                                    2,
                                    NodeKind::Paragraph {
                                        text: vec![text("first")],
                                    },
                                )],
                            },
                        ),
                        node(
                            3,
                            NodeKind::ListItem {
                                children: vec![node(
                                    4,
                                    NodeKind::Paragraph {
                                        text: vec![text("second")],
                                    },
                                )],
                            },
                        ),
                    ],
                },
            ),
            node(5, NodeKind::ThematicBreak),
            node(
                6,
                NodeKind::Blockquote {
                    children: vec![node(
                        7,
                        NodeKind::Paragraph {
                            text: vec![text("quoted")],
                        },
                    )],
                },
            ),
        ],
    };

    let rendered = doc.to_source().content.expect("content");
    let reparsed = parse(&rendered).document.expect("document");
    assert_eq!(reparsed, doc);
}

#[test]
fn quoted_option_values_reach_a_fixed_point() {
    let source = "```{python viz, caption=\"Fig, 1: \\\"scatter\\\"\", echo=FALSE}\nplot()\n```\n";
    let (doc, rendered) = roundtrip(source);
    assert_eq!(rendered, source);

    let NodeKind::CodeBlock { options, .. } = &doc.children[0].kind else {
        panic!("expected code block");
    };
    let expected: ChunkOptions = vec![
        ("caption".to_string(), "Fig, 1: \"scatter\"".to_string()),
        ("echo".to_string(), "FALSE".to_string()),
    ];
    assert_eq!(options, &expected);
}

#[test]
fn single_author_front_matter_stays_scalar() {
    let source = "---\nauthor: Ada Lovelace\ntitle: Notes\n---\n\nBody.\n";
    let (doc, rendered) = roundtrip(source);
    assert_eq!(doc.metadata.authors, vec!["Ada Lovelace".to_string()]);
    assert!(
        rendered.contains("author: Ada Lovelace\n"),
        "scalar author was rewritten: {rendered}"
    );
}

#[test]
fn crlf_input_normalizes_then_roundtrips() {
    let source = "---\r\ntitle: T\r\n---\r\n\r\npara one\r\n\r\n```{r x}\r\na <- 1\r\n```\r\n";
    let first = parse(source);
    assert_eq!(first.errors, vec![]);
    let doc = first.document.expect("document");
    let rendered = doc.to_source().content.expect("content");
    assert!(!rendered.contains('\r'));
    assert_eq!(parse(&rendered).document, Some(doc));
}
