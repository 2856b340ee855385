use mcdoc_diagnostics::{Diagnostic, DiagnosticKind, SchemaLocation, Span};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unclosed delimiter")]
    UnclosedDelimiter,
    #[error("illegal range")]
    IllegalRange,
    #[error("unexpected end of file")]
    UnexpectedEof,
}

/// A recoverable syntax error. The parser keeps going after recording one,
/// so a single parse reports every malformed statement in the module.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub span: Span,
    pub kind: ParseErrorKind,
    /// What the parser was looking for when it gave up, e.g. `"}"` or "type".
    pub expected: Option<&'static str>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            expected: None,
        }
    }

    pub fn expecting(kind: ParseErrorKind, span: Span, expected: &'static str) -> Self {
        Self {
            kind,
            span,
            expected: Some(expected),
        }
    }

    pub fn to_diagnostic(&self, module: &str) -> Diagnostic {
        let message = match self.expected {
            Some(expected) => format!("{}, expected {}", self.kind, expected),
            None => self.kind.to_string(),
        };
        Diagnostic::error(DiagnosticKind::ParseError, message)
            .with_schema_location(SchemaLocation::new(module, self.span))
    }
}
