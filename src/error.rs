//! Top-level error type returned by the compilation driver.
//!
//! Mirrors the phase-local error enums (e.g. [`crate::codegen::CodeGenError`]):
//! a small hand-written `enum` with a `Display` impl, no `anyhow`/`thiserror`.

use crate::diagnostics::Diagnostic;
use crate::lexer::LineTable;
use std::fmt;
use std::path::PathBuf;

/// Everything that can make `ktjvmc` exit non-zero.
#[derive(Debug)]
pub enum CompileError {
    /// Malformed invocation: bad flags, wrong extension, missing `JAVA_HOME`.
    /// Maps to exit code 2.
    Usage(String),
    /// A file on disk (source, class-path entry, `java.base.jmod`) could not
    /// be read or written. Maps to exit code 1, except that a missing
    /// `java.base.jmod` is promoted to `Usage` by the caller (it is a host
    /// misconfiguration, not a problem with the user's source).
    Io { path: PathBuf, source: std::io::Error },
    /// One or more diagnostics were raised by the lexer, parser, resolver or
    /// code generator. Maps to exit code 1. Carries the source file and its
    /// line table so `Display` can render `path:line:col: message` instead
    /// of a bare message.
    Diagnostics {
        file: PathBuf,
        line_table: LineTable,
        diagnostics: Vec<Diagnostic>,
    },
}

impl CompileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn diagnostics(
        file: impl Into<PathBuf>,
        line_table: LineTable,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        CompileError::Diagnostics {
            file: file.into(),
            line_table,
            diagnostics,
        }
    }

    /// The process exit code this error should produce.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Usage(_) => 2,
            CompileError::Io { .. } | CompileError::Diagnostics { .. } => 1,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Usage(message) => write!(f, "{message}"),
            CompileError::Io { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            CompileError::Diagnostics {
                file,
                line_table,
                diagnostics,
            } => {
                for (i, diagnostic) in diagnostics.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", diagnostic.render(file, line_table))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CompileError {}
