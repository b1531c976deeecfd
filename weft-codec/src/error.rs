use serde::{Deserialize, Serialize};

use crate::types::Span;

/// Classification of every problem the codec reports.
///
/// Structural failures that prevent producing a well-formed tree are
/// fatal: the call returns no document/content and a non-empty error
/// list. Recoverable issues are reported as warnings and processing of
/// the rest of the document continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DiagnosticKind {
    /// Front matter opened with a delimiter line but never closed.
    #[error("unterminated front matter")]
    UnterminatedFrontMatter,

    /// A chunk fence opened but no closing fence follows before
    /// end of input.
    #[error("unterminated code chunk")]
    UnterminatedChunk,

    /// A chunk header that could not be tokenized into
    /// engine/label/options. The chunk degrades to plain fenced code.
    #[error("malformed chunk header")]
    MalformedChunkHeader,

    /// Two chunks share a label; the later chunk's label is dropped.
    #[error("duplicate chunk label")]
    DuplicateChunkLabel,

    /// A shield placeholder survived assembly into the final tree.
    #[error("unresolved placeholder")]
    UnresolvedPlaceholder,

    /// A node kind with no registered serializer was rendered.
    #[error("unknown block type")]
    UnknownBlockType,

    /// A code block payload is missing a field rendering requires.
    #[error("missing required field")]
    MissingRequiredField,

    /// A terminated front matter block whose body is not valid YAML.
    /// Parsing continues with whatever could be salvaged.
    #[error("invalid front matter")]
    InvalidFrontMatter,
}

impl DiagnosticKind {
    /// Stable diagnostic code, `E`-prefixed for fatal kinds and
    /// `W`-prefixed for recoverable ones.
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::UnterminatedFrontMatter => "E101",
            DiagnosticKind::UnterminatedChunk => "E102",
            DiagnosticKind::UnresolvedPlaceholder => "E103",
            DiagnosticKind::UnknownBlockType => "E104",
            DiagnosticKind::MissingRequiredField => "E105",
            DiagnosticKind::MalformedChunkHeader => "W201",
            DiagnosticKind::DuplicateChunkLabel => "W202",
            DiagnosticKind::InvalidFrontMatter => "W203",
        }
    }
}

/// A problem report attached to a parse or render outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Diagnostic {
    /// A fatal diagnostic.
    pub fn error(kind: DiagnosticKind, message: impl Into<String>, span: Option<Span>) -> Self {
        Diagnostic {
            kind,
            severity: Severity::Error,
            message: message.into(),
            span,
        }
    }

    /// A recoverable diagnostic.
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>, span: Option<Span>) -> Self {
        Diagnostic {
            kind,
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }

    /// Stable code for this diagnostic's kind.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}
