//! The token definition for the query language.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// The raw source slice the token was read from.
    pub text: &'a str,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    And,     // "AND", "&&"
    Or,      // "OR", "||"
    Not,     // "NOT", "!"
    In,      // "IN"
    Is,      // "IS"
    OrderBy, // "ORDER BY"
    Asc,     // "ASC"
    Desc,    // "DESC"
    Empty,   // "EMPTY", "NULL"
    True,    // "TRUE"
    False,   // "FALSE"

    // Literals
    Identifier(&'a str),
    /// String contents with quotes removed and escapes applied.
    String(Cow<'a, str>),
    /// Numeric text, optionally signed, validated by the parser.
    Number(&'a str),
    /// Signed count followed by a unit, e.g. `-1d`. Validated by the parser.
    RelativeDate(&'a str),

    // Punctuation
    LParen, // (
    RParen, // )
    Comma,  // ,

    // Operators
    Eq,    // =
    NotEq, // !=
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=

    Eof,
}

impl TokenKind<'_> {
    /// Short human readable description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::And => "AND".to_string(),
            TokenKind::Or => "OR".to_string(),
            TokenKind::Not => "NOT".to_string(),
            TokenKind::In => "IN".to_string(),
            TokenKind::Is => "IS".to_string(),
            TokenKind::OrderBy => "ORDER BY".to_string(),
            TokenKind::Asc => "ASC".to_string(),
            TokenKind::Desc => "DESC".to_string(),
            TokenKind::Empty => "EMPTY".to_string(),
            TokenKind::True => "TRUE".to_string(),
            TokenKind::False => "FALSE".to_string(),
            TokenKind::Identifier(name) => format!("identifier '{name}'"),
            TokenKind::String(s) => format!("string \"{s}\""),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::RelativeDate(d) => format!("relative date {d}"),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Eq => "'='".to_string(),
            TokenKind::NotEq => "'!='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Gte => "'>='".to_string(),
            TokenKind::Lte => "'<='".to_string(),
            TokenKind::Eof => "end of query".to_string(),
        }
    }

    pub fn is_comparator(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::NotEq
                | TokenKind::Gt
                | TokenKind::Lt
                | TokenKind::Gte
                | TokenKind::Lte
        )
    }
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}
