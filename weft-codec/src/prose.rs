//! Markdown prose parsing.
//!
//! Runs pulldown-cmark over shielded body text and folds the event
//! stream into [`ProseBlock`]s, one step short of canonical nodes.
//! Container blocks (quotes, lists, items) are tracked on an explicit
//! stack; inline markup folds into [`Run`] sequences.

use std::collections::HashMap;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::types::{Run, SemanticText};

/// Block-level parse tree for prose.
///
/// `Placeholder` marks a paragraph consisting solely of a shield token;
/// the assembler swaps it for the corresponding code chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ProseBlock {
    Paragraph(SemanticText),
    Heading { level: u8, text: SemanticText },
    CodeFence { language: Option<String>, code: String },
    List { ordered: bool, start: u64, items: Vec<Vec<ProseBlock>> },
    Blockquote(Vec<ProseBlock>),
    ThematicBreak,
    Placeholder(String),
}

/// Parse shielded body text into blocks.
///
/// `placeholders` holds the shield tokens; a paragraph whose entire
/// content is one such token becomes [`ProseBlock::Placeholder`]. Tight
/// and loose lists normalize to the same shape, with item inlines
/// always wrapped in a paragraph.
pub fn parse_blocks(text: &str, placeholders: &HashMap<String, usize>) -> Vec<ProseBlock> {
    let mut parser = BlockParser {
        placeholders,
        blocks: Vec::new(),
        containers: Vec::new(),
        leaf: Leaf::None,
    };
    for event in Parser::new_ext(text, Options::empty()) {
        parser.handle(event);
    }
    parser.finish()
}

enum Container {
    Blockquote(Vec<ProseBlock>),
    List {
        ordered: bool,
        start: u64,
        items: Vec<Vec<ProseBlock>>,
    },
    Item(Vec<ProseBlock>),
}

/// Leaf block currently accumulating content.
enum Leaf {
    None,
    Paragraph(InlineSink),
    Heading { level: u8, sink: InlineSink },
    Code { language: Option<String>, text: String },
    Html(String),
}

struct BlockParser<'a> {
    placeholders: &'a HashMap<String, usize>,
    blocks: Vec<ProseBlock>,
    containers: Vec<Container>,
    leaf: Leaf,
}

impl BlockParser<'_> {
    fn handle(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => match &mut self.leaf {
                Leaf::Code { text: buf, .. } => buf.push_str(&text),
                Leaf::Html(buf) => buf.push_str(&text),
                _ => self.sink().push_text(&text),
            },
            Event::Code(code) => self.sink().push_run(Run::Code(code.to_string())),
            Event::Html(html) => match &mut self.leaf {
                Leaf::Html(buf) => buf.push_str(&html),
                _ => self.sink().push_text(&html),
            },
            Event::InlineHtml(html) => self.sink().push_text(&html),
            Event::SoftBreak => self.sink().push_text("\n"),
            Event::HardBreak => self.sink().push_run(Run::HardBreak),
            Event::Rule => {
                self.flush_leaf();
                self.push_block(ProseBlock::ThematicBreak);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Paragraph => {
                self.flush_leaf();
                self.leaf = Leaf::Paragraph(InlineSink::default());
            }
            Tag::Heading { level, .. } => {
                self.flush_leaf();
                self.leaf = Leaf::Heading {
                    level: level as u8,
                    sink: InlineSink::default(),
                };
            }
            Tag::CodeBlock(kind) => {
                self.flush_leaf();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        let info = info.trim();
                        (!info.is_empty()).then(|| info.to_string())
                    }
                    CodeBlockKind::Indented => None,
                };
                self.leaf = Leaf::Code {
                    language,
                    text: String::new(),
                };
            }
            Tag::HtmlBlock => {
                self.flush_leaf();
                self.leaf = Leaf::Html(String::new());
            }
            Tag::BlockQuote(_) => {
                self.flush_leaf();
                self.containers.push(Container::Blockquote(Vec::new()));
            }
            Tag::List(start) => {
                self.flush_leaf();
                self.containers.push(Container::List {
                    ordered: start.is_some(),
                    start: start.unwrap_or(1),
                    items: Vec::new(),
                });
            }
            Tag::Item => {
                self.flush_leaf();
                self.containers.push(Container::Item(Vec::new()));
            }
            Tag::Emphasis => self.sink().open(SpanKind::Emphasis),
            Tag::Strong => self.sink().open(SpanKind::Strong),
            Tag::Link {
                dest_url, title, ..
            } => self.sink().open(SpanKind::Link {
                url: dest_url.to_string(),
                title: (!title.is_empty()).then(|| title.to_string()),
            }),
            Tag::Image {
                dest_url, title, ..
            } => self.sink().open(SpanKind::Image {
                url: dest_url.to_string(),
                title: (!title.is_empty()).then(|| title.to_string()),
            }),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::HtmlBlock => {
                self.flush_leaf();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush_leaf();
                match self.containers.pop() {
                    Some(Container::Blockquote(blocks)) => {
                        self.push_block(ProseBlock::Blockquote(blocks));
                    }
                    Some(other) => self.containers.push(other),
                    None => {}
                }
            }
            TagEnd::List(_) => {
                self.flush_leaf();
                match self.containers.pop() {
                    Some(Container::List {
                        ordered,
                        start,
                        items,
                    }) => {
                        self.push_block(ProseBlock::List {
                            ordered,
                            start,
                            items,
                        });
                    }
                    Some(other) => self.containers.push(other),
                    None => {}
                }
            }
            TagEnd::Item => {
                self.flush_leaf();
                match self.containers.pop() {
                    Some(Container::Item(blocks)) => self.push_item(blocks),
                    Some(other) => self.containers.push(other),
                    None => {}
                }
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Link | TagEnd::Image => {
                self.sink().close();
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<ProseBlock> {
        self.flush_leaf();
        // pulldown balances every Start with an End, so this drains
        // nothing in practice
        while let Some(container) = self.containers.pop() {
            match container {
                Container::Blockquote(blocks) => self.push_block(ProseBlock::Blockquote(blocks)),
                Container::List {
                    ordered,
                    start,
                    items,
                } => self.push_block(ProseBlock::List {
                    ordered,
                    start,
                    items,
                }),
                Container::Item(blocks) => self.push_item(blocks),
            }
        }
        self.blocks
    }

    /// Inline sink of the open leaf, opening an implicit paragraph when
    /// none is open. Tight list items deliver inlines without a
    /// surrounding paragraph; the implicit wrap normalizes them.
    fn sink(&mut self) -> &mut InlineSink {
        if !matches!(self.leaf, Leaf::Paragraph(_) | Leaf::Heading { .. }) {
            self.flush_leaf();
            self.leaf = Leaf::Paragraph(InlineSink::default());
        }
        match &mut self.leaf {
            Leaf::Paragraph(sink) => sink,
            Leaf::Heading { sink, .. } => sink,
            _ => unreachable!("leaf was just set to a paragraph"),
        }
    }

    fn flush_leaf(&mut self) {
        match std::mem::replace(&mut self.leaf, Leaf::None) {
            Leaf::None => {}
            Leaf::Paragraph(sink) => {
                let runs = sink.finish();
                if let Some(token) = self.placeholder_token(&runs) {
                    self.push_block(ProseBlock::Placeholder(token));
                } else if !runs.is_empty() {
                    self.push_block(ProseBlock::Paragraph(runs));
                }
            }
            Leaf::Heading { level, sink } => {
                self.push_block(ProseBlock::Heading {
                    level,
                    text: single_line(sink.finish()),
                });
            }
            Leaf::Code { language, mut text } => {
                if text.ends_with('\n') {
                    text.pop();
                }
                self.push_block(ProseBlock::CodeFence {
                    language,
                    code: text,
                });
            }
            Leaf::Html(text) => {
                // Raw HTML is carried as plain text. Per-line trims and
                // blank-line removal keep the text stable under a
                // further parse of the rendered (escaped) form, where
                // paragraph continuation lines lose their margins.
                let text: Vec<&str> = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .collect();
                if !text.is_empty() {
                    self.push_block(ProseBlock::Paragraph(vec![Run::Text(text.join("\n"))]));
                }
            }
        }
    }

    fn placeholder_token(&self, runs: &[Run]) -> Option<String> {
        let [Run::Text(text)] = runs else {
            return None;
        };
        let trimmed = text.trim();
        self.placeholders
            .contains_key(trimmed)
            .then(|| trimmed.to_string())
    }

    fn push_block(&mut self, block: ProseBlock) {
        match self.containers.last_mut() {
            Some(Container::Blockquote(blocks)) | Some(Container::Item(blocks)) => {
                blocks.push(block);
            }
            // blocks inside a list always sit inside an item; a stray
            // one opens its own
            Some(Container::List { items, .. }) => items.push(vec![block]),
            None => self.blocks.push(block),
        }
    }

    fn push_item(&mut self, blocks: Vec<ProseBlock>) {
        match self.containers.last_mut() {
            Some(Container::List { items, .. }) => items.push(blocks),
            _ => {
                for block in blocks {
                    self.push_block(block);
                }
            }
        }
    }
}

// ------------------------------------------------------------------
// Inline runs
// ------------------------------------------------------------------

enum SpanKind {
    Emphasis,
    Strong,
    Link { url: String, title: Option<String> },
    Image { url: String, title: Option<String> },
}

/// Collects inline runs, with a stack for nested spans. Adjacent text
/// (including soft breaks, kept as `\n`) merges into one run.
#[derive(Default)]
struct InlineSink {
    runs: Vec<Run>,
    spans: Vec<(SpanKind, Vec<Run>)>,
}

impl InlineSink {
    fn current(&mut self) -> &mut Vec<Run> {
        match self.spans.last_mut() {
            Some((_, runs)) => runs,
            None => &mut self.runs,
        }
    }

    fn push_text(&mut self, text: &str) {
        let runs = self.current();
        if let Some(Run::Text(existing)) = runs.last_mut() {
            existing.push_str(text);
        } else {
            runs.push(Run::Text(text.to_string()));
        }
    }

    fn push_run(&mut self, run: Run) {
        self.current().push(run);
    }

    fn open(&mut self, kind: SpanKind) {
        self.spans.push((kind, Vec::new()));
    }

    fn close(&mut self) {
        let Some((kind, runs)) = self.spans.pop() else {
            return;
        };
        let run = match kind {
            SpanKind::Emphasis => Run::Emphasis(runs),
            SpanKind::Strong => Run::Strong(runs),
            SpanKind::Link { url, title } => Run::Link {
                text: runs,
                url,
                title,
            },
            SpanKind::Image { url, title } => Run::Image {
                alt: flatten(&runs),
                url,
                title,
            },
        };
        self.push_run(run);
    }

    fn finish(mut self) -> SemanticText {
        while !self.spans.is_empty() {
            self.close();
        }
        self.runs
    }
}

/// Collapse line breaks to spaces. Setext headings may span source
/// lines, but a heading holds a single line of inline content.
fn single_line(runs: Vec<Run>) -> SemanticText {
    let mut out: Vec<Run> = Vec::new();
    for run in runs {
        let run = match run {
            Run::Text(s) => Run::Text(s.replace('\n', " ")),
            Run::HardBreak => Run::Text(" ".to_string()),
            Run::Emphasis(inner) => Run::Emphasis(single_line(inner)),
            Run::Strong(inner) => Run::Strong(single_line(inner)),
            Run::Link { text, url, title } => Run::Link {
                text: single_line(text),
                url,
                title,
            },
            Run::Image { alt, url, title } => Run::Image {
                alt: alt.replace('\n', " "),
                url,
                title,
            },
            other => other,
        };
        match (out.last_mut(), run) {
            (Some(Run::Text(last)), Run::Text(s)) => last.push_str(&s),
            (_, run) => out.push(run),
        }
    }
    out
}

/// Plain-text projection of runs, used for image alt text.
fn flatten(runs: &[Run]) -> String {
    let mut out = String::new();
    for run in runs {
        match run {
            Run::Text(s) | Run::Code(s) => out.push_str(s),
            Run::Emphasis(inner) | Run::Strong(inner) => out.push_str(&flatten(inner)),
            Run::Link { text, .. } => out.push_str(&flatten(text)),
            Run::Image { alt, .. } => out.push_str(alt),
            Run::HardBreak => out.push(' '),
        }
    }
    out
}
