//! Error types for every stage of query compilation.
//!
//! Each stage has its own error type so callers that drive the stages by hand
//! can match on them precisely. [`QueryError`] wraps all three and is what
//! [`crate::compile_query`] returns; it exposes a stable error code, a message
//! and the source span for the host to turn into a client error response.

use serde::Serialize;
use thiserror::Error;

use crate::schema::ValueType;
use crate::token::Span;

/// What went wrong while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
}

/// Scanning failure, reported at the byte offset where scanning stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {position}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: usize,
}

impl LexError {
    pub fn new(kind: LexErrorKind, position: usize) -> Self {
        Self { kind, position }
    }

    pub fn span(&self) -> Span {
        match self.kind {
            LexErrorKind::UnterminatedString => Span::new(self.position, self.position + 1),
            LexErrorKind::UnexpectedCharacter(c) => {
                Span::new(self.position, self.position + c.len_utf8())
            }
        }
    }
}

/// Syntax error with the offending token's span.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// What the parser would have accepted at this point.
    pub expected: Option<String>,
    pub span: Span,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            expected: None,
            span,
        }
    }

    pub(crate) fn expected(expected: impl Into<String>, found: &str, span: Span) -> Self {
        let expected = expected.into();
        Self {
            message: format!("expected {expected}, found {found}"),
            expected: Some(expected),
            span,
        }
    }
}

/// Errors found while checking a parsed query against the field schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    #[error("unknown field '{identifier}'")]
    UnknownField { identifier: String, span: Span },

    #[error("operator {operator} is not supported for field '{field}'")]
    UnsupportedOperator {
        field: String,
        operator: String,
        span: Span,
    },

    #[error("field '{field}' expects a {expected} value, got {got}")]
    TypeMismatch {
        field: String,
        expected: ValueType,
        got: &'static str,
        span: Span,
    },

    #[error("field '{field}' cannot be used in ORDER BY")]
    UnorderableField { field: String, span: Span },

    #[error("'{text}' is not a valid date for field '{field}'")]
    InvalidDate {
        field: String,
        text: String,
        span: Span,
    },
}

impl SemanticError {
    pub fn span(&self) -> Span {
        match self {
            SemanticError::UnknownField { span, .. }
            | SemanticError::UnsupportedOperator { span, .. }
            | SemanticError::TypeMismatch { span, .. }
            | SemanticError::UnorderableField { span, .. }
            | SemanticError::InvalidDate { span, .. } => *span,
        }
    }
}

/// The single error type surfaced by [`crate::compile_query`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("semantic error: {0}")]
    Semantic(#[from] SemanticError),
}

impl QueryError {
    /// Stable machine readable code.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Lex(e) => match e.kind {
                LexErrorKind::UnterminatedString => "LEX_UNTERMINATED_STRING",
                LexErrorKind::UnexpectedCharacter(_) => "LEX_UNEXPECTED_CHARACTER",
            },
            QueryError::Parse(_) => "PARSE_ERROR",
            QueryError::Semantic(e) => match e {
                SemanticError::UnknownField { .. } => "UNKNOWN_FIELD",
                SemanticError::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
                SemanticError::TypeMismatch { .. } => "TYPE_MISMATCH",
                SemanticError::UnorderableField { .. } => "UNORDERABLE_FIELD",
                SemanticError::InvalidDate { .. } => "INVALID_DATE",
            },
        }
    }

    /// Message without the stage prefix.
    pub fn message(&self) -> String {
        match self {
            QueryError::Lex(e) => e.kind.to_string(),
            QueryError::Parse(e) => e.message.clone(),
            QueryError::Semantic(e) => e.to_string(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            QueryError::Lex(e) => e.span(),
            QueryError::Parse(e) => e.span,
            QueryError::Semantic(e) => e.span(),
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.message(),
            span: self.span(),
        }
    }

    /// Renders the offending source line with a caret underline.
    pub fn render(&self, source: &str) -> String {
        let span = self.span();
        let start = span.start.min(source.len());
        let end = span.end.clamp(start, source.len());

        let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[start..]
            .find('\n')
            .map_or(source.len(), |i| start + i);
        let line = &source[line_start..line_end];

        let column = source[line_start..start].chars().count();
        let width = source[start..end.min(line_end)].chars().count().max(1);

        format!(
            "error[{}]: {}\n  | {}\n  | {}{}",
            self.code(),
            self.message(),
            line,
            " ".repeat(column),
            "^".repeat(width)
        )
    }
}

/// Serializable error summary for the host's client-error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
}
