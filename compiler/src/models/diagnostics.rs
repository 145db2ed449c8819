//! Structured diagnostics accumulated by the parser and semantic analyzer.
//!
//! The front-end never aborts the process: every failure becomes a
//! `Diagnostic` with a stable code and a primary span, and the driver
//! decides whether error severity blocks the rest of the pipeline.

use serde::{Deserialize, Serialize};

use crate::models::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Stable diagnostic codes. The string form is part of the tool's
/// external contract and must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Parse errors
    UnexpectedToken,
    UnterminatedConstruct,
    TrailingComma,
    LegacyAnnotation,
    UnsupportedConstraint,

    // Semantic errors
    UndefinedSymbol,
    DuplicateSymbol,
    TypeMismatch,
    InvalidLiteral,
    TypeAnnotationRequired,
    InvalidOperation,
    InvalidExpression,
    NonExhaustiveMatch,

    // Annotation errors
    UnknownAnnotation,
    InvalidContext,
    ConflictingAnnotations,

    // Ownership errors
    ZoneMismatch,
    TransferViolation,
    LifetimeViolation,
    FfiBoundaryError,

    // Bug sentinel; never expected in normal operation
    Internal,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::UnexpectedToken => "UNEXPECTED_TOKEN",
            DiagnosticCode::UnterminatedConstruct => "UNTERMINATED_CONSTRUCT",
            DiagnosticCode::TrailingComma => "TRAILING_COMMA",
            DiagnosticCode::LegacyAnnotation => "LEGACY_ANNOTATION",
            DiagnosticCode::UnsupportedConstraint => "UNSUPPORTED_CONSTRAINT",
            DiagnosticCode::UndefinedSymbol => "UNDEFINED_SYMBOL",
            DiagnosticCode::DuplicateSymbol => "DUPLICATE_SYMBOL",
            DiagnosticCode::TypeMismatch => "TYPE_MISMATCH",
            DiagnosticCode::InvalidLiteral => "INVALID_LITERAL",
            DiagnosticCode::TypeAnnotationRequired => "TYPE_ANNOTATION_REQUIRED",
            DiagnosticCode::InvalidOperation => "INVALID_OPERATION",
            DiagnosticCode::InvalidExpression => "INVALID_EXPRESSION",
            DiagnosticCode::NonExhaustiveMatch => "NON_EXHAUSTIVE_MATCH",
            DiagnosticCode::UnknownAnnotation => "UNKNOWN_ANNOTATION",
            DiagnosticCode::InvalidContext => "INVALID_CONTEXT",
            DiagnosticCode::ConflictingAnnotations => "CONFLICTING_ANNOTATIONS",
            DiagnosticCode::ZoneMismatch => "ZONE_MISMATCH",
            DiagnosticCode::TransferViolation => "TRANSFER_VIOLATION",
            DiagnosticCode::LifetimeViolation => "LIFETIME_VIOLATION",
            DiagnosticCode::FfiBoundaryError => "FFI_BOUNDARY_ERROR",
            DiagnosticCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One user-visible finding with its primary span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    /// "did you mean ..." candidate, when one is close enough.
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Info,
            code,
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] {} at {}",
            self.severity,
            self.code.as_str(),
            self.message,
            self.span.start
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean `{}`?)", suggestion)?;
        }
        Ok(())
    }
}

/// Convenience over a batch of diagnostics.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
