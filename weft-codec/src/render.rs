//! Canonical tree to source text.
//!
//! The inverse of parsing: emits front matter, prose blocks, and chunk
//! fences such that parsing the output reproduces the same tree. Text
//! runs are escaped so prose can never be re-read as structure, and
//! fence runs grow past any fence-like lines inside code.

use serde::Serialize;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::types::{ChunkOptions, ContentNode, Document, FrontMatter, NodeKind, Run};

/// Result of rendering. `content` is present exactly when `errors` is
/// empty.
#[derive(Debug, Serialize)]
pub struct RenderOutput {
    pub content: Option<String>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Render a document to source text.
///
/// The whole tree is walked even after an error so that every foreign
/// node and engine-less executable block is reported in one pass.
pub fn render(document: &Document) -> RenderOutput {
    let mut errors = Vec::new();
    let warnings = Vec::new();

    let front = match front_matter_block(&document.metadata) {
        Ok(front) => front,
        Err(diag) => {
            errors.push(diag);
            None
        }
    };
    let body = render_children(&document.children, &mut errors);

    if !errors.is_empty() {
        return RenderOutput {
            content: None,
            errors,
            warnings,
        };
    }

    let mut content = match front {
        Some(front) if body.is_empty() => front,
        Some(front) => format!("{front}\n\n{body}"),
        None => body,
    };
    content.push('\n');
    RenderOutput {
        content: Some(content),
        errors,
        warnings,
    }
}

fn front_matter_block(metadata: &FrontMatter) -> Result<Option<String>, Diagnostic> {
    if metadata.is_empty() {
        return Ok(None);
    }
    let yaml = serde_yaml::to_string(metadata).map_err(|err| {
        Diagnostic::error(
            DiagnosticKind::InvalidFrontMatter,
            format!("cannot serialize front matter: {err}"),
            None,
        )
    })?;
    Ok(Some(format!("---\n{yaml}---")))
}

/// Render sibling blocks, joined by blank lines.
///
/// Adjacent lists of the same kind would merge on a further parse, so
/// consecutive sibling lists alternate their marker (`-`/`*`, `.`/`)`).
fn render_children(nodes: &[ContentNode], errors: &mut Vec<Diagnostic>) -> String {
    let mut parts = Vec::with_capacity(nodes.len());
    let mut last_list: Option<(bool, char)> = None;
    for node in nodes {
        let part = match &node.kind {
            NodeKind::List {
                ordered,
                start,
                children,
            } => {
                let default = if *ordered { '.' } else { '-' };
                let alt = if *ordered { ')' } else { '*' };
                let ch = match last_list {
                    Some((prev_ordered, prev_ch))
                        if prev_ordered == *ordered && prev_ch == default =>
                    {
                        alt
                    }
                    _ => default,
                };
                last_list = Some((*ordered, ch));
                render_list(*ordered, *start, children, ch, errors)
            }
            _ => {
                last_list = None;
                render_block(node, errors)
            }
        };
        parts.push(part);
    }
    parts.join("\n\n")
}

fn render_block(node: &ContentNode, errors: &mut Vec<Diagnostic>) -> String {
    match &node.kind {
        NodeKind::Paragraph { text } => render_inline(text),
        NodeKind::Heading { level, text } => {
            let hashes = "#".repeat((*level).clamp(1, 6) as usize);
            if text.is_empty() {
                return hashes;
            }
            let mut writer = InlineWriter::new();
            writer.markup(&hashes);
            writer.markup(" ");
            writer.runs(text);
            let mut out = writer.out;
            escape_heading_tail(&mut out);
            out
        }
        NodeKind::CodeBlock {
            language,
            label,
            options,
            executable,
            code,
        } => {
            if !executable {
                return generic_fence(language.as_deref(), code);
            }
            match language {
                Some(engine) => chunk_fence(engine, label.as_deref(), options, code),
                None => {
                    let what = match label {
                        Some(label) => format!("executable code block `{label}`"),
                        None => "executable code block".to_string(),
                    };
                    errors.push(Diagnostic::error(
                        DiagnosticKind::MissingRequiredField,
                        format!("{what} has no language"),
                        None,
                    ));
                    String::new()
                }
            }
        }
        NodeKind::List {
            ordered,
            start,
            children,
        } => {
            let ch = if *ordered { '.' } else { '-' };
            render_list(*ordered, *start, children, ch, errors)
        }
        NodeKind::ListItem { children } => render_children(children, errors),
        NodeKind::Blockquote { children } => {
            let inner = render_children(children, errors);
            prefix_lines(&inner, "> ", ">")
        }
        // `---` would read back as a front matter fence at the top of
        // the document and `===`/`---` can attach to a paragraph as a
        // setext underline; stars are inert
        NodeKind::ThematicBreak => "***".to_string(),
        NodeKind::Foreign { tag, .. } => {
            errors.push(Diagnostic::error(
                DiagnosticKind::UnknownBlockType,
                format!("cannot render unknown block kind `{tag}`"),
                None,
            ));
            String::new()
        }
    }
}

// ------------------------------------------------------------------
// Block helpers
// ------------------------------------------------------------------

fn render_list(
    ordered: bool,
    start: u64,
    children: &[ContentNode],
    ch: char,
    errors: &mut Vec<Diagnostic>,
) -> String {
    let tight = children.iter().all(|item| match &item.kind {
        NodeKind::ListItem { children } => {
            children.len() == 1 && matches!(children[0].kind, NodeKind::Paragraph { .. })
        }
        _ => false,
    });

    let mut items = Vec::with_capacity(children.len());
    for (index, item) in children.iter().enumerate() {
        let marker = if ordered {
            format!("{}{ch} ", start + index as u64)
        } else {
            format!("{ch} ")
        };
        let blocks = match &item.kind {
            NodeKind::ListItem { children } => children.as_slice(),
            _ => std::slice::from_ref(item),
        };
        let inner = render_children(blocks, errors);
        items.push(attach_marker(&marker, &inner));
    }
    items.join(if tight { "\n" } else { "\n\n" })
}

/// Put `marker` on the first line and indent the rest to its width,
/// leaving interior blank lines bare.
fn attach_marker(marker: &str, inner: &str) -> String {
    if inner.is_empty() {
        return marker.trim_end().to_string();
    }
    let indent = " ".repeat(marker.len());
    let mut out = String::with_capacity(marker.len() + inner.len());
    for (index, line) in inner.split('\n').enumerate() {
        if index == 0 {
            out.push_str(marker);
        } else {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&indent);
            }
        }
        out.push_str(line);
    }
    out
}

/// Prefix every line; blank lines get the bare prefix so the block
/// stays contiguous.
fn prefix_lines(text: &str, prefix: &str, empty: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                empty.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn chunk_fence(engine: &str, label: Option<&str>, options: &ChunkOptions, code: &str) -> String {
    let mut header = String::from("{");
    header.push_str(engine);
    if let Some(label) = label {
        header.push(' ');
        header.push_str(label);
    }
    for (key, value) in options {
        header.push_str(", ");
        header.push_str(key);
        header.push('=');
        header.push_str(&quote_value(value));
    }
    header.push('}');

    let fence = "`".repeat((longest_run(code, '`') + 1).max(3));
    if code.is_empty() {
        format!("{fence}{header}\n{fence}")
    } else {
        format!("{fence}{header}\n{code}\n{fence}")
    }
}

/// A plain fence. Backticks by default; tildes when the info string
/// opens with a brace (which would re-read as a chunk header) or itself
/// contains a backtick.
fn generic_fence(language: Option<&str>, code: &str) -> String {
    let needs_tilde = language.is_some_and(|l| l.starts_with('{') || l.contains('`'));
    let ch = if needs_tilde { '~' } else { '`' };
    let fence = ch.to_string().repeat((longest_run(code, ch) + 1).max(3));
    let info = language.unwrap_or("");
    if code.is_empty() {
        format!("{fence}{info}\n{fence}")
    } else {
        format!("{fence}{info}\n{code}\n{fence}")
    }
}

/// Quote an option value when it could not survive as a bare token.
fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| matches!(c, ',' | '{' | '}' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Escape the final `#` run of a rendered heading when a space
/// precedes it, so it does not read back as an ATX closing sequence.
fn escape_heading_tail(out: &mut String) {
    let run = out.bytes().rev().take_while(|&b| b == b'#').count();
    if run == 0 {
        return;
    }
    let run_start = out.len() - run;
    if out[..run_start].ends_with(' ') {
        out.insert(run_start, '\\');
    }
}

// ------------------------------------------------------------------
// Inline rendering
// ------------------------------------------------------------------

fn render_inline(runs: &[Run]) -> String {
    let mut writer = InlineWriter::new();
    writer.runs(runs);
    writer.out
}

/// Writes runs with escaping. Tracks line starts so characters that
/// only matter at the margin (`#`, `>`, bullets, setext underlines,
/// ordered-list dots after digits) are escaped just there.
struct InlineWriter {
    out: String,
    at_line_start: bool,
    leading_digits: bool,
}

impl InlineWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            at_line_start: true,
            leading_digits: false,
        }
    }

    fn runs(&mut self, runs: &[Run]) {
        for run in runs {
            match run {
                Run::Text(text) => self.text(text),
                Run::Code(code) => self.code(code),
                Run::Emphasis(inner) => {
                    self.markup("*");
                    self.runs(inner);
                    self.markup("*");
                }
                Run::Strong(inner) => {
                    self.markup("**");
                    self.runs(inner);
                    self.markup("**");
                }
                Run::Link { text, url, title } => {
                    self.markup("[");
                    self.runs(text);
                    self.markup("](");
                    self.dest(url);
                    self.title(title.as_deref());
                    self.markup(")");
                }
                Run::Image { alt, url, title } => {
                    self.markup("![");
                    self.text(alt);
                    self.markup("](");
                    self.dest(url);
                    self.title(title.as_deref());
                    self.markup(")");
                }
                Run::HardBreak => {
                    self.out.push_str("\\\n");
                    self.at_line_start = true;
                    self.leading_digits = false;
                }
            }
        }
    }

    /// Literal syntax emitted by the writer itself, never escaped.
    fn markup(&mut self, s: &str) {
        self.out.push_str(s);
        self.at_line_start = false;
        self.leading_digits = false;
    }

    fn text(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.out.push('\n');
                self.at_line_start = true;
                self.leading_digits = false;
                continue;
            }
            let escape = match c {
                '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '&' => true,
                '#' | '>' | '-' | '+' | '=' | '~' => self.at_line_start,
                '.' | ')' => self.leading_digits,
                _ => false,
            };
            if escape {
                self.out.push('\\');
            }
            self.leading_digits = c.is_ascii_digit() && (self.at_line_start || self.leading_digits);
            self.out.push(c);
            self.at_line_start = false;
        }
    }

    fn code(&mut self, code: &str) {
        // code spans cannot hold line endings; they read back as spaces
        let code = code.replace('\n', " ");
        let delim = "`".repeat(longest_run(&code, '`') + 1);
        let pad = code.starts_with('`')
            || code.ends_with('`')
            || ((code.starts_with(' ') || code.ends_with(' ')) && !code.trim().is_empty());
        self.out.push_str(&delim);
        if pad {
            self.out.push(' ');
        }
        self.out.push_str(&code);
        if pad {
            self.out.push(' ');
        }
        self.out.push_str(&delim);
        self.at_line_start = false;
        self.leading_digits = false;
    }

    fn dest(&mut self, url: &str) {
        let bracketed = url.is_empty()
            || url
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '(' | ')'));
        if bracketed {
            self.out.push('<');
        }
        for c in url.chars() {
            if matches!(c, '<' | '>' | '\\') {
                self.out.push('\\');
            }
            self.out.push(c);
        }
        if bracketed {
            self.out.push('>');
        }
        self.at_line_start = false;
        self.leading_digits = false;
    }

    fn title(&mut self, title: Option<&str>) {
        let Some(title) = title else {
            return;
        };
        self.out.push_str(" \"");
        for c in title.chars() {
            if matches!(c, '"' | '\\') {
                self.out.push('\\');
            }
            self.out.push(c);
        }
        self.out.push('"');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;
    use pretty_assertions::assert_eq;

    fn node(kind: NodeKind) -> ContentNode {
        ContentNode::new(NodeId(0), kind)
    }

    fn para(s: &str) -> ContentNode {
        node(NodeKind::Paragraph {
            text: vec![Run::Text(s.to_string())],
        })
    }

    fn item(children: Vec<ContentNode>) -> ContentNode {
        node(NodeKind::ListItem { children })
    }

    fn doc(children: Vec<ContentNode>) -> Document {
        Document {
            metadata: FrontMatter::default(),
            children,
        }
    }

    fn rendered(document: &Document) -> String {
        let out = render(document);
        assert!(out.errors.is_empty(), "errors: {:?}", out.errors);
        out.content.expect("content")
    }

    #[test]
    fn paragraph_and_heading() {
        let document = doc(vec![
            node(NodeKind::Heading {
                level: 2,
                text: vec![Run::Text("Title".to_string())],
            }),
            para("Body."),
        ]);
        assert_eq!(rendered(&document), "## Title\n\nBody.\n");
    }

    #[test]
    fn front_matter_comes_first() {
        let document = Document {
            metadata: FrontMatter {
                title: Some("T".to_string()),
                ..FrontMatter::default()
            },
            children: vec![para("Body.")],
        };
        assert_eq!(rendered(&document), "---\ntitle: T\n---\n\nBody.\n");
    }

    #[test]
    fn metacharacters_are_escaped() {
        let document = doc(vec![para("*not* `em` [x]")]);
        assert_eq!(rendered(&document), "\\*not\\* \\`em\\` \\[x\\]\n");
    }

    #[test]
    fn line_start_guards() {
        let document = doc(vec![para("# not a heading\n- not a list\n12. not an item")]);
        assert_eq!(
            rendered(&document),
            "\\# not a heading\n\\- not a list\n12\\. not an item\n"
        );
    }

    #[test]
    fn executable_chunk_renders_brace_header() {
        let document = doc(vec![node(NodeKind::CodeBlock {
            language: Some("r".to_string()),
            label: Some("setup".to_string()),
            options: vec![("echo".to_string(), "TRUE".to_string())],
            executable: true,
            code: "code()".to_string(),
        })]);
        assert_eq!(rendered(&document), "```{r setup, echo=TRUE}\ncode()\n```\n");
    }

    #[test]
    fn option_value_is_quoted_when_needed() {
        let document = doc(vec![node(NodeKind::CodeBlock {
            language: Some("r".to_string()),
            label: None,
            options: vec![("fig.cap".to_string(), "a, b".to_string())],
            executable: true,
            code: "plot(x)".to_string(),
        })]);
        assert_eq!(
            rendered(&document),
            "```{r, fig.cap=\"a, b\"}\nplot(x)\n```\n"
        );
    }

    #[test]
    fn plain_fence_renders_literal_info() {
        let document = doc(vec![node(NodeKind::CodeBlock {
            language: Some("python".to_string()),
            label: None,
            options: ChunkOptions::new(),
            executable: false,
            code: "x=1".to_string(),
        })]);
        assert_eq!(rendered(&document), "```python\nx=1\n```\n");
    }

    #[test]
    fn fence_grows_past_backtick_runs_in_code() {
        let document = doc(vec![node(NodeKind::CodeBlock {
            language: None,
            label: None,
            options: ChunkOptions::new(),
            executable: false,
            code: "```\ninner\n```".to_string(),
        })]);
        assert_eq!(rendered(&document), "````\n```\ninner\n```\n````\n");
    }

    #[test]
    fn chunk_fence_grows_too() {
        let document = doc(vec![node(NodeKind::CodeBlock {
            language: Some("r".to_string()),
            label: None,
            options: ChunkOptions::new(),
            executable: true,
            code: "x\n```\ny".to_string(),
        })]);
        assert_eq!(rendered(&document), "````{r}\nx\n```\ny\n````\n");
    }

    #[test]
    fn brace_info_plain_fence_uses_tildes() {
        let document = doc(vec![node(NodeKind::CodeBlock {
            language: Some("{r}".to_string()),
            label: None,
            options: ChunkOptions::new(),
            executable: false,
            code: "x".to_string(),
        })]);
        assert_eq!(rendered(&document), "~~~{r}\nx\n~~~\n");
    }

    #[test]
    fn executable_block_without_language_is_fatal() {
        let document = doc(vec![node(NodeKind::CodeBlock {
            language: None,
            label: Some("bad".to_string()),
            options: ChunkOptions::new(),
            executable: true,
            code: "x".to_string(),
        })]);
        let out = render(&document);
        assert_eq!(out.content, None);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].kind, DiagnosticKind::MissingRequiredField);
        assert_eq!(out.errors[0].code(), "E105");
    }

    #[test]
    fn foreign_node_is_fatal() {
        let document = doc(vec![node(NodeKind::Foreign {
            tag: "callout".to_string(),
            data: serde_json::Value::Null,
        })]);
        let out = render(&document);
        assert_eq!(out.content, None);
        assert_eq!(out.errors[0].kind, DiagnosticKind::UnknownBlockType);
        assert_eq!(out.errors[0].code(), "E104");
    }

    #[test]
    fn thematic_break_renders_stars() {
        let document = doc(vec![node(NodeKind::ThematicBreak)]);
        assert_eq!(rendered(&document), "***\n");
    }

    #[test]
    fn blockquote_prefixes_every_line() {
        let document = doc(vec![node(NodeKind::Blockquote {
            children: vec![para("a"), para("b")],
        })]);
        assert_eq!(rendered(&document), "> a\n>\n> b\n");
    }

    #[test]
    fn tight_list() {
        let document = doc(vec![node(NodeKind::List {
            ordered: false,
            start: 1,
            children: vec![item(vec![para("a")]), item(vec![para("b")])],
        })]);
        assert_eq!(rendered(&document), "- a\n- b\n");
    }

    #[test]
    fn multi_block_item_renders_loose() {
        let document = doc(vec![node(NodeKind::List {
            ordered: false,
            start: 1,
            children: vec![item(vec![para("a"), para("c")]), item(vec![para("b")])],
        })]);
        assert_eq!(rendered(&document), "- a\n\n  c\n\n- b\n");
    }

    #[test]
    fn ordered_list_counts_from_start() {
        let document = doc(vec![node(NodeKind::List {
            ordered: true,
            start: 3,
            children: vec![item(vec![para("x")]), item(vec![para("y")])],
        })]);
        assert_eq!(rendered(&document), "3. x\n4. y\n");
    }

    #[test]
    fn adjacent_sibling_lists_alternate_markers() {
        let document = doc(vec![
            node(NodeKind::List {
                ordered: false,
                start: 1,
                children: vec![item(vec![para("a")])],
            }),
            node(NodeKind::List {
                ordered: false,
                start: 1,
                children: vec![item(vec![para("b")])],
            }),
        ]);
        assert_eq!(rendered(&document), "- a\n\n* b\n");
    }

    #[test]
    fn links_and_images() {
        let document = doc(vec![node(NodeKind::Paragraph {
            text: vec![
                Run::Link {
                    text: vec![Run::Text("x".to_string())],
                    url: "https://e.com".to_string(),
                    title: Some("T".to_string()),
                },
                Run::Text(" ".to_string()),
                Run::Image {
                    alt: "a".to_string(),
                    url: "i.png".to_string(),
                    title: None,
                },
            ],
        })]);
        assert_eq!(rendered(&document), "[x](https://e.com \"T\") ![a](i.png)\n");
    }

    #[test]
    fn url_with_spaces_uses_pointed_brackets() {
        let document = doc(vec![node(NodeKind::Paragraph {
            text: vec![Run::Link {
                text: vec![Run::Text("x".to_string())],
                url: "a b".to_string(),
                title: None,
            }],
        })]);
        assert_eq!(rendered(&document), "[x](<a b>)\n");
    }

    #[test]
    fn inline_code_pads_and_grows_delimiters() {
        let document = doc(vec![node(NodeKind::Paragraph {
            text: vec![
                Run::Code("a`b".to_string()),
                Run::Text(" ".to_string()),
                Run::Code("`x".to_string()),
            ],
        })]);
        assert_eq!(rendered(&document), "``a`b`` `` `x ``\n");
    }

    #[test]
    fn hard_break_renders_backslash_newline() {
        let document = doc(vec![node(NodeKind::Paragraph {
            text: vec![
                Run::Text("a".to_string()),
                Run::HardBreak,
                Run::Text("b".to_string()),
            ],
        })]);
        assert_eq!(rendered(&document), "a\\\nb\n");
    }

    #[test]
    fn heading_trailing_hash_is_escaped() {
        let document = doc(vec![node(NodeKind::Heading {
            level: 1,
            text: vec![Run::Text("a #".to_string())],
        })]);
        assert_eq!(rendered(&document), "# a \\#\n");
    }

    #[test]
    fn empty_document_renders_bare_newline() {
        assert_eq!(rendered(&doc(Vec::new())), "\n");
    }

    #[test]
    fn error_walk_reports_every_problem() {
        let document = doc(vec![
            node(NodeKind::Foreign {
                tag: "aside".to_string(),
                data: serde_json::Value::Null,
            }),
            node(NodeKind::CodeBlock {
                language: None,
                label: None,
                options: ChunkOptions::new(),
                executable: true,
                code: String::new(),
            }),
        ]);
        let out = render(&document);
        assert_eq!(out.content, None);
        assert_eq!(out.errors.len(), 2);
    }
}
