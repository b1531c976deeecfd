use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A parsed WeftDoc document.
///
/// Constructed fresh by each parse call and never mutated afterward.
/// Rendering borrows the document and yields new text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document-level metadata from the front matter block.
    pub metadata: FrontMatter,
    /// Ordered sequence of top-level content nodes.
    pub children: Vec<ContentNode>,
}

/// Identifier of a node, unique within its document.
///
/// Ids are assigned in pre-order during assembly, so two structurally
/// identical documents carry identical ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// A node in the canonical content tree.
///
/// The `tags` set and `extensions` map are reserved for downstream
/// consumers (content generators, schema validators); the codec carries
/// them but never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl ContentNode {
    /// Create a node with empty tags and extensions.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        ContentNode {
            id,
            kind,
            tags: BTreeSet::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// Stable string tag identifying this node's kind.
    pub fn type_tag(&self) -> &str {
        self.kind.type_tag()
    }

    /// Child nodes in reading order. Empty for leaf kinds.
    pub fn children(&self) -> &[ContentNode] {
        self.kind.children()
    }

    /// Attach a free-form tag. Tags belong to downstream collaborators;
    /// the codec stores them but never interprets them.
    pub fn insert_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    /// Extension value stored under `key`, if any.
    pub fn extension(&self, key: &str) -> Option<&serde_json::Value> {
        self.extensions.get(key)
    }

    pub fn set_extension(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extensions.insert(key.into(), value);
    }
}

/// The tagged payload of a [`ContentNode`].
///
/// Container kinds own their children exclusively; child order is the
/// canonical reading order and is preserved end-to-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// A run of prose.
    Paragraph { text: SemanticText },
    /// A heading with level 1..=6.
    Heading { level: u8, text: SemanticText },
    /// A fenced code region. Executable blocks carry the chunk header
    /// fields (engine, label, options); plain fenced code does not.
    CodeBlock {
        language: Option<String>,
        label: Option<String>,
        options: ChunkOptions,
        executable: bool,
        code: String,
    },
    /// Ordered or bullet list of `ListItem` children. `start` is the
    /// first item number of an ordered list and 1 for bullet lists.
    List {
        ordered: bool,
        start: u64,
        children: Vec<ContentNode>,
    },
    /// A single list item.
    ListItem { children: Vec<ContentNode> },
    /// Quoted block content.
    Blockquote { children: Vec<ContentNode> },
    /// Horizontal rule.
    ThematicBreak,
    /// A node kind this codec has no serializer for. Downstream
    /// collaborators may attach these; rendering one is an error.
    Foreign { tag: String, data: serde_json::Value },
}

impl NodeKind {
    /// Stable string tag for this kind.
    pub fn type_tag(&self) -> &str {
        match self {
            NodeKind::Paragraph { .. } => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::CodeBlock { .. } => "code_block",
            NodeKind::List { .. } => "list",
            NodeKind::ListItem { .. } => "list_item",
            NodeKind::Blockquote { .. } => "blockquote",
            NodeKind::ThematicBreak => "thematic_break",
            NodeKind::Foreign { tag, .. } => tag,
        }
    }

    /// Child nodes for container kinds, empty otherwise.
    pub fn children(&self) -> &[ContentNode] {
        match self {
            NodeKind::List { children, .. }
            | NodeKind::ListItem { children }
            | NodeKind::Blockquote { children } => children,
            _ => &[],
        }
    }
}

/// Ordered inline runs making up the text payload of a block.
pub type SemanticText = Vec<Run>;

/// A single inline run within a [`SemanticText`] sequence.
///
/// Soft line breaks are kept as `\n` characters inside `Text` runs;
/// explicit breaks are `HardBreak`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Run {
    /// Plain text.
    Text(String),
    /// Emphasised (`*...*`) span.
    Emphasis(Vec<Run>),
    /// Strong (`**...**`) span.
    Strong(Vec<Run>),
    /// Inline code span.
    Code(String),
    /// Hyperlink with link text, destination, and optional title.
    Link {
        text: Vec<Run>,
        url: String,
        title: Option<String>,
    },
    /// Image with alt text, source, and optional title.
    Image {
        alt: String,
        url: String,
        title: Option<String>,
    },
    /// Explicit line break within a paragraph.
    HardBreak,
}

/// Ordered key/value options from a chunk header, in declaration order.
pub type ChunkOptions = Vec<(String, String)>;

/// A fenced executable code chunk located by the lexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChunkDescriptor {
    /// Chunk label, when the header carries one. Unique per document;
    /// a duplicated label is reported and dropped from the later chunk.
    pub label: Option<String>,
    /// Engine/language token, e.g. `r` or `python`.
    pub engine: String,
    /// Header options in declaration order.
    pub options: ChunkOptions,
    /// Raw code body, verbatim, without the fence lines and without a
    /// trailing newline.
    pub code: String,
    /// Location of the whole chunk, opening fence line through closing
    /// fence line inclusive.
    pub source_range: Span,
}

/// YAML front matter fields.
///
/// Known fields are typed; unknown fields are captured in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The YAML `author` key accepts a single scalar or a sequence. A lone
    /// author is written back as a scalar so the common case round-trips.
    #[serde(
        rename = "author",
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many",
        serialize_with = "one_as_scalar"
    )]
    pub authors: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Output target configuration, e.g. `html_document` or a nested map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_yaml::Value>,

    /// Any front matter fields not covered by the typed fields above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl FrontMatter {
    /// True when no field carries a value. Empty front matter is not
    /// rendered back out.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.authors.is_empty()
            && self.date.is_none()
            && self.output.is_none()
            && self.extra.is_empty()
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(author) => vec![author],
        OneOrMany::Many(authors) => authors,
    })
}

fn one_as_scalar<S>(authors: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::Serialize as _;
    match authors {
        [single] => single.serialize(serializer),
        many => many.serialize(serializer),
    }
}

/// Source location of a region in the normalised source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// 1-based starting line number.
    pub start_line: usize,
    /// 1-based ending line number (inclusive).
    pub end_line: usize,
    /// 0-based byte offset of the first character.
    pub start_offset: usize,
    /// 0-based byte offset past the last character.
    pub end_offset: usize,
}
