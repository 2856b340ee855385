//! Diagnostic model shared by every stage of the mcdoc pipeline.
//!
//! Parse errors, resolution failures and validation findings all surface as
//! [`Diagnostic`] values. The pipeline never throws for schema-vs-data
//! mismatches; stages accumulate diagnostics and keep going, so a single run
//! reports everything it can. Callers decide what is fatal by inspecting
//! severities.

use serde::Serialize;
use std::fmt;

/// Half-open byte range into a module's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both inputs.
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    ParseError,
    UnresolvedReference,
    UnresolvedUse,
    MissingRequiredField,
    UnexpectedField,
    TypeMismatch,
    OutOfRange,
    NoUnionMatch,
    UnknownDispatchKey,
    EnumValueNotAllowed,
    LengthOutOfRange,
    ConstraintOnNonNumeric,
    InternalError,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ParseError => "parse-error",
            Self::UnresolvedReference => "unresolved-reference",
            Self::UnresolvedUse => "unresolved-use",
            Self::MissingRequiredField => "missing-required-field",
            Self::UnexpectedField => "unexpected-field",
            Self::TypeMismatch => "type-mismatch",
            Self::OutOfRange => "out-of-range",
            Self::NoUnionMatch => "no-union-match",
            Self::UnknownDispatchKey => "unknown-dispatch-key",
            Self::EnumValueNotAllowed => "enum-value-not-allowed",
            Self::LengthOutOfRange => "length-out-of-range",
            Self::ConstraintOnNonNumeric => "constraint-on-non-numeric",
            Self::InternalError => "internal-error",
        };
        write!(f, "{}", s)
    }
}

/// Where in the schema corpus a diagnostic points, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaLocation {
    /// Canonical module path, e.g. `java::data::worldgen::biome`.
    pub module: String,
    pub span: Span,
}

impl SchemaLocation {
    pub fn new(module: impl Into<String>, span: Span) -> Self {
        Self {
            module: module.into(),
            span,
        }
    }
}

/// A single structured finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    /// Dot-and-bracket JSON path (`features[0].biome`), empty at the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_location: Option<SchemaLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            json_path: None,
            schema_location: None,
            hint: None,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, message)
        }
    }

    pub fn with_json_path(mut self, path: impl Into<String>) -> Self {
        self.json_path = Some(path.into());
        self
    }

    pub fn with_schema_location(mut self, location: SchemaLocation) -> Self {
        self.schema_location = Some(location);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// First line of the message, used when summarizing nested findings.
    pub fn summary_line(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.severity, self.kind)?;
        if let Some(path) = &self.json_path {
            if !path.is_empty() {
                write!(f, " at {}", path)?;
            }
        }
        write!(f, ": {}", self.message)?;
        if let Some(loc) = &self.schema_location {
            write!(f, " (schema {}:{})", loc.module, loc.span.start)?;
        }
        Ok(())
    }
}

/// True iff any diagnostic in the slice is error-severity.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
