//! Diagnostics: the value type every compiler phase accumulates into.
//!
//! The lexer, parser, resolver and code generator never abort on the first
//! problem they find (except for true internal-invariant violations, which
//! panic). Instead they push a [`Diagnostic`] and keep going, so a single
//! invocation can report more than one mistake per run.

use std::fmt;
use std::path::PathBuf;

/// A byte-offset span into the source file a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "Span: start ({start}) must be <= end ({end})");
        Span { start, end }
    }

    pub fn point(offset: u32) -> Self {
        Span::new(offset, offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single diagnostic, ready to be rendered against the file it came from.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Source span the diagnostic points at; absent for whole-file problems
    /// (e.g. "failed to read java.base.jmod").
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn error_no_span(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span: None,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span: None,
        }
        .with_span(span)
    }

    fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render as `path:line:col: severity: message`, resolving the span
    /// against `line_table` so callers never format offsets by hand.
    pub fn render(&self, file: &PathBuf, line_table: &crate::lexer::LineTable) -> String {
        match self.span {
            Some(span) => {
                let (line, col) = line_table.line_col(span.start);
                format!(
                    "{}:{}:{}: {}: {}",
                    file.display(),
                    line + 1,
                    col + 1,
                    self.severity,
                    self.message
                )
            }
            None => format!("{}: {}: {}", file.display(), self.severity, self.message),
        }
    }
}

/// Accumulates diagnostics across a phase (or the whole compilation).
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
