//! Recursive descent parser for the query language.
//!
//! ## Call graph
//!
//! ```text
//! parse()
//!   ├─ parse_or_expression()            (unless the query starts with ORDER BY or is empty)
//!   │    └─ parse_and_expression()
//!   │         └─ parse_not_expression()
//!   │              ├─ "NOT" → parse_not_expression()   (right-recursive, NOT NOT x)
//!   │              ├─ "("   → parse_or_expression() then ")"
//!   │              └─ parse_comparison()
//!   │                   ├─ field comparator operand
//!   │                   ├─ field [NOT] IN ( operand, ... )
//!   │                   └─ field IS [NOT] EMPTY
//!   ├─ "ORDER BY" → parse_order_list()
//!   └─ end of query
//! ```
//!
//! ## Precedence (highest first)
//!
//! 1. parentheses
//! 2. `NOT`
//! 3. comparisons, `IN`, `IS EMPTY`
//! 4. `AND`
//! 5. `OR`
//!
//! ## Examples
//!
//! ```text
//! status = "Open" AND assignee = currentUser() ORDER BY created DESC
//! type = Bug AND priority in (Highest, High) AND statusCategory != Done
//! updatedDate >= -1d
//! assignee IS EMPTY OR NOT (flagged = true)
//! ORDER BY createdDate DESC, key ASC
//! ```
//!
//! Only the first error is reported; there is no recovery.
//!
//! Nesting is capped at [`MAX_DEPTH`] and the number of comparisons at
//! [`MAX_TERMS`], which keeps every tree walk after parsing shallow.

use crate::ast::{
    Comparator, DateFunction, Direction, Expr, Identifier, Literal, Number, Operand, OrderSpec,
    Query, RelativeDate,
};
use crate::error::ParseError;
use crate::token::{Span, Token, TokenKind};

/// Deepest allowed nesting of parentheses and `NOT`.
pub const MAX_DEPTH: usize = 128;

/// Most comparisons one query may hold. `AND`/`OR` chains build a tree as
/// deep as they are long, so this bounds the depth every later stage walks.
pub const MAX_TERMS: usize = 256;

pub struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    position: usize,
    depth: usize,
    terms: usize,
}

/// Parses a token stream as produced by [`crate::lexer::tokenize`].
pub fn parse(tokens: &[Token<'_>]) -> Result<Query, ParseError> {
    Parser::new(tokens).parse()
}

fn comparator_of(kind: &TokenKind<'_>) -> Option<Comparator> {
    match kind {
        TokenKind::Eq => Some(Comparator::Eq),
        TokenKind::NotEq => Some(Comparator::NotEq),
        TokenKind::Gt => Some(Comparator::Gt),
        TokenKind::Gte => Some(Comparator::Gte),
        TokenKind::Lt => Some(Comparator::Lt),
        TokenKind::Lte => Some(Comparator::Lte),
        _ => None,
    }
}

fn function_of(name: &str) -> Option<Literal> {
    match name.to_ascii_lowercase().as_str() {
        "currentuser" => Some(Literal::CurrentUser),
        "now" => Some(Literal::Function(DateFunction::Now)),
        "startofday" => Some(Literal::Function(DateFunction::StartOfDay)),
        "endofday" => Some(Literal::Function(DateFunction::EndOfDay)),
        _ => None,
    }
}

impl<'t, 'a> Parser<'t, 'a> {
    pub fn new(tokens: &'t [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            terms: 0,
        }
    }

    /// Returns the current token without advancing.
    fn peek(&self) -> Option<&'t Token<'a>> {
        self.tokens.get(self.position)
    }

    /// Returns the token after the current one without advancing.
    fn peek_next(&self) -> Option<&'t Token<'a>> {
        self.tokens.get(self.position + 1)
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Option<&'t Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// Checks whether the current token has the given kind, ignoring payloads.
    fn match_token(&self, kind: &TokenKind<'_>) -> bool {
        self.peek().is_some_and(|token| {
            std::mem::discriminant(&token.kind) == std::mem::discriminant(kind)
        })
    }

    /// Advances past the current token if it has the given kind.
    fn eat(&mut self, kind: &TokenKind<'_>) -> Option<&'t Token<'a>> {
        if self.match_token(kind) {
            self.advance()
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind<'_>, expected: &str) -> Result<&'t Token<'a>, ParseError> {
        self.eat(&kind).ok_or_else(|| self.unexpected(expected))
    }

    /// Error pointing at the current token.
    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::expected(expected, &token.kind.describe(), token.span),
            None => {
                let end = self.tokens.last().map_or(0, |t| t.span.end);
                ParseError::expected(expected, "end of query", Span::new(end, end))
            }
        }
    }

    fn at_eof(&self) -> bool {
        self.peek().map_or(true, |token| token.kind == TokenKind::Eof)
    }

    fn enter(&mut self, span: Span) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new(
                format!("expression is nested deeper than {MAX_DEPTH} levels"),
                span,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    pub fn parse(&mut self) -> Result<Query, ParseError> {
        let expr = if self.at_eof() || self.match_token(&TokenKind::OrderBy) {
            None
        } else {
            Some(self.parse_or_expression()?)
        };

        let mut order_by = Vec::new();
        if self.eat(&TokenKind::OrderBy).is_some() {
            order_by = self.parse_order_list()?;
        } else if !self.at_eof() {
            return Err(self.unexpected("AND, OR, ORDER BY or end of query"));
        }

        if !self.at_eof() {
            return Err(self.unexpected("',', ASC, DESC or end of query"));
        }

        Ok(Query { expr, order_by })
    }

    /// `and_expr (OR and_expr)*`
    fn parse_or_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expression()?;

        while self.eat(&TokenKind::Or).is_some() {
            let right = self.parse_and_expression()?;
            let span = left.span().to(right.span());
            left = Expr::Or {
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    /// `not_expr (AND not_expr)*`
    fn parse_and_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not_expression()?;

        while self.eat(&TokenKind::And).is_some() {
            let right = self.parse_not_expression()?;
            let span = left.span().to(right.span());
            left = Expr::And {
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    /// `NOT not_expr | "(" or_expr ")" | comparison`
    fn parse_not_expression(&mut self) -> Result<Expr, ParseError> {
        if let Some(not) = self.eat(&TokenKind::Not) {
            self.enter(not.span)?;
            let inner = self.parse_not_expression()?;
            self.leave();
            let span = not.span.to(inner.span());
            return Ok(Expr::Not {
                inner: Box::new(inner),
                span,
            });
        }

        if let Some(lparen) = self.eat(&TokenKind::LParen) {
            self.enter(lparen.span)?;
            let expr = self.parse_or_expression()?;
            self.expect(TokenKind::RParen, "')'")?;
            self.leave();
            return Ok(expr);
        }

        self.parse_comparison()
    }

    /// A field name: bare word or quoted string (`"story points"`).
    fn parse_field(&mut self, expected: &str) -> Result<Identifier, ParseError> {
        let token = self.peek().ok_or_else(|| self.unexpected(expected))?;
        let name = match &token.kind {
            TokenKind::Identifier(name) => name.to_string(),
            TokenKind::String(name) => name.to_string(),
            _ => return Err(self.unexpected(expected)),
        };
        self.advance();
        Ok(Identifier {
            name,
            span: token.span,
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let field = self.parse_field("a field name, NOT or '('")?;

        self.terms += 1;
        if self.terms > MAX_TERMS {
            let message =
                format!("query has more than {MAX_TERMS} comparisons, use IN for long value lists");
            return Err(ParseError::new(message, field.span));
        }

        let expected = "a comparison operator, IN, NOT IN or IS";
        let token = self.peek().ok_or_else(|| self.unexpected(expected))?;

        if let Some(op) = comparator_of(&token.kind) {
            self.advance();
            let value = self.parse_operand()?;
            let span = field.span.to(value.span);
            return Ok(Expr::Compare {
                field,
                op,
                value,
                span,
            });
        }

        match token.kind {
            TokenKind::In => {
                self.advance();
                self.parse_in_list(field, false)
            }
            TokenKind::Not => {
                self.advance();
                self.expect(TokenKind::In, "IN after NOT")?;
                self.parse_in_list(field, true)
            }
            TokenKind::Is => {
                self.advance();
                let negated = self.eat(&TokenKind::Not).is_some();
                let empty = self.expect(TokenKind::Empty, "EMPTY")?;
                let op = if negated {
                    Comparator::NotEq
                } else {
                    Comparator::Eq
                };
                let span = field.span.to(empty.span);
                Ok(Expr::Compare {
                    field,
                    op,
                    value: Operand {
                        literal: Literal::Empty,
                        span: empty.span,
                    },
                    span,
                })
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// `"(" operand ("," operand)* ")"`, the IN keyword already consumed.
    fn parse_in_list(&mut self, field: Identifier, negated: bool) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LParen, "'(' after IN")?;

        if let Some(rparen) = self.peek().filter(|t| t.kind == TokenKind::RParen) {
            return Err(ParseError {
                message: "IN list must not be empty".to_string(),
                expected: Some("a value".to_string()),
                span: rparen.span,
            });
        }

        let mut values = Vec::new();
        loop {
            values.push(self.parse_operand()?);
            if self.eat(&TokenKind::Comma).is_none() {
                break;
            }
        }

        let rparen = self.expect(TokenKind::RParen, "',' or ')'")?;
        let span = field.span.to(rparen.span);
        Ok(Expr::In {
            field,
            values,
            negated,
            span,
        })
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        let token = self.peek().ok_or_else(|| self.unexpected("a value"))?;

        let literal = match &token.kind {
            TokenKind::String(s) => Literal::String(s.to_string()),
            TokenKind::Number(text) => Literal::Number(parse_number(text, token.span)?),
            TokenKind::RelativeDate(text) => {
                let date = RelativeDate::parse(text).ok_or_else(|| ParseError {
                    message: format!("malformed relative date '{text}'"),
                    expected: Some("a relative date such as -1d, +2w, -4h or -30m".to_string()),
                    span: token.span,
                })?;
                Literal::RelativeDate(date)
            }
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            TokenKind::Empty => Literal::Empty,
            TokenKind::Identifier(word) => {
                if self
                    .peek_next()
                    .is_some_and(|next| next.kind == TokenKind::LParen)
                {
                    return self.parse_function_call(word, token.span);
                }
                Literal::Identifier(word.to_string())
            }
            _ => return Err(self.unexpected("a value")),
        };

        self.advance();
        Ok(Operand {
            literal,
            span: token.span,
        })
    }

    /// `name "(" ")"`, positioned at the name.
    fn parse_function_call(&mut self, name: &str, name_span: Span) -> Result<Operand, ParseError> {
        let literal = function_of(name).ok_or_else(|| ParseError {
            message: format!("unknown function '{name}'"),
            expected: Some("currentUser(), now(), startOfDay() or endOfDay()".to_string()),
            span: name_span,
        })?;
        self.advance();
        self.advance();
        let rparen = self.expect(TokenKind::RParen, "')' (functions take no arguments)")?;
        Ok(Operand {
            literal,
            span: name_span.to(rparen.span),
        })
    }

    /// `field (ASC|DESC)? ("," field (ASC|DESC)?)*`
    fn parse_order_list(&mut self) -> Result<Vec<OrderSpec>, ParseError> {
        let mut items = Vec::new();
        loop {
            let field = self.parse_field("a field name")?;
            let mut span = field.span;
            let mut direction = Direction::Asc;
            if let Some(token) = self.eat(&TokenKind::Asc) {
                span = span.to(token.span);
            } else if let Some(token) = self.eat(&TokenKind::Desc) {
                direction = Direction::Desc;
                span = span.to(token.span);
            }
            items.push(OrderSpec {
                field,
                direction,
                span,
            });

            if self.eat(&TokenKind::Comma).is_none() {
                break;
            }
        }
        Ok(items)
    }
}

fn parse_number(text: &str, span: Span) -> Result<Number, ParseError> {
    if text.contains('.') {
        return text
            .parse::<f64>()
            .map(Number::Decimal)
            .map_err(|_| ParseError::new(format!("malformed number '{text}'"), span));
    }
    text.parse::<i64>()
        .map(Number::Integer)
        .map_err(|_| ParseError::new(format!("number '{text}' is out of range"), span))
}
