//! Lexer for the query language.
//!
//! The lexer yields `Result<Token, LexError>` items and always finishes a
//! successful scan with a single [`TokenKind::Eof`] token, so the parser can
//! point "unexpected end of query" diagnostics at a real span.

use std::borrow::Cow;

use tracing::trace;

use crate::error::{LexError, LexErrorKind};
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// Current byte offset into the input.
    position: usize,
    finished: bool,
}

/// Scans the whole input, stopping at the first error.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let tokens = Lexer::new(input).collect::<Result<Vec<_>, _>>()?;
    trace!(count = tokens.len(), "tokenized query");
    Ok(tokens)
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            position: 0,
            finished: false,
        }
    }

    /// Returns the current character without advancing.
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// Returns the character after the current one without advancing.
    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// Advances one character and returns it.
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.input[start..self.position],
            span: Span::new(start, self.position),
        }
    }

    /// Reads a number or a relative date. A leading sign, if any, has
    /// already been consumed.
    fn read_number(&mut self, start: usize) -> Token<'a> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }

        // `2024-01-10`, `2024/01/10`: an unsigned date is a bare word.
        let unsigned = self.input[start..].starts_with(|c: char| c.is_ascii_digit());
        if unsigned
            && matches!(self.peek(), Some('-' | '/'))
            && self.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '/') {
                self.bump();
            }
            let text = &self.input[start..self.position];
            return self.token(TokenKind::Identifier(text), start);
        }

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }

        // `-1d`, `2w`: digits running straight into letters form a relative date.
        if self.peek().is_some_and(char::is_alphabetic) {
            while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '.') {
                self.bump();
            }
            let text = &self.input[start..self.position];
            return self.token(TokenKind::RelativeDate(text), start);
        }

        let text = &self.input[start..self.position];
        self.token(TokenKind::Number(text), start)
    }

    /// Reads a quoted string. The opening quote has already been consumed.
    /// A backslash escapes the next character, whatever it is.
    fn read_string(&mut self, start: usize, quote: char) -> Result<Token<'a>, LexError> {
        let input = self.input;
        let content_start = self.position;
        // Only allocated once an escape is seen.
        let mut unescaped: Option<String> = None;

        loop {
            let here = self.position;
            match self.bump() {
                None => return Err(LexError::new(LexErrorKind::UnterminatedString, start)),
                Some(c) if c == quote => {
                    let content = match unescaped {
                        Some(s) => Cow::Owned(s),
                        None => Cow::Borrowed(&input[content_start..here]),
                    };
                    return Ok(self.token(TokenKind::String(content), start));
                }
                Some('\\') => {
                    let buf =
                        unescaped.get_or_insert_with(|| input[content_start..here].to_string());
                    match self.bump() {
                        Some(escaped) => buf.push(escaped),
                        None => {
                            return Err(LexError::new(LexErrorKind::UnterminatedString, start))
                        }
                    }
                }
                Some(c) => {
                    if let Some(buf) = unescaped.as_mut() {
                        buf.push(c);
                    }
                }
            }
        }
    }

    /// Reads an identifier or keyword.
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        let literal = &self.input[start..self.position];

        if literal.eq_ignore_ascii_case("order") && self.consume_by() {
            return self.token(TokenKind::OrderBy, start);
        }

        self.token(match_keyword(literal), start)
    }

    /// After `ORDER`, consumes whitespace plus a standalone `BY`. Leaves the
    /// position untouched when they are not there.
    fn consume_by(&mut self) -> bool {
        let saved = self.position;
        self.skip_whitespace();
        if self.position > saved {
            let rest = &self.input[self.position..];
            let is_by = rest.get(..2).is_some_and(|w| w.eq_ignore_ascii_case("by"))
                && !rest[2..].chars().next().is_some_and(is_ident_continue);
            if is_by {
                self.position += 2;
                return true;
            }
        }
        self.position = saved;
        false
    }
}

fn match_keyword(s: &str) -> TokenKind<'_> {
    match s.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "is" => TokenKind::Is,
        "asc" => TokenKind::Asc,
        "desc" => TokenKind::Desc,
        "empty" | "null" => TokenKind::Empty,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Identifier(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        self.skip_whitespace();
        let start = self.position;

        let Some(c) = self.bump() else {
            self.finished = true;
            return Some(Ok(self.token(TokenKind::Eof, start)));
        };

        let result = match c {
            '=' => Ok(self.token(TokenKind::Eq, start)),
            '(' => Ok(self.token(TokenKind::LParen, start)),
            ')' => Ok(self.token(TokenKind::RParen, start)),
            ',' => Ok(self.token(TokenKind::Comma, start)),
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(self.token(TokenKind::Lte, start))
                } else {
                    Ok(self.token(TokenKind::Lt, start))
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(self.token(TokenKind::Gte, start))
                } else {
                    Ok(self.token(TokenKind::Gt, start))
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(self.token(TokenKind::NotEq, start))
                } else {
                    Ok(self.token(TokenKind::Not, start))
                }
            }
            '&' if self.peek() == Some('&') => {
                self.bump();
                Ok(self.token(TokenKind::And, start))
            }
            '|' if self.peek() == Some('|') => {
                self.bump();
                Ok(self.token(TokenKind::Or, start))
            }
            '"' | '\'' => self.read_string(start, c),
            '-' | '+' if self.peek().is_some_and(|n| n.is_ascii_digit()) => {
                Ok(self.read_number(start))
            }
            c if c.is_ascii_digit() => Ok(self.read_number(start)),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier(start)),
            c => Err(LexError::new(LexErrorKind::UnexpectedCharacter(c), start)),
        };

        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_comparison() {
        let tokens = tokenize(r#"status = "Open""#).unwrap();

        assert_eq!(tokens[0].kind, TokenKind::Identifier("status"));
        assert_eq!(tokens[0].span, Span::new(0, 6));
        assert_eq!(tokens[1].kind, TokenKind::Eq);
        assert_eq!(tokens[2].kind, TokenKind::String(Cow::Borrowed("Open")));
        assert_eq!(tokens[2].text, "\"Open\"");
        assert_eq!(tokens[2].span, Span::new(9, 15));
        assert_eq!(tokens[3].kind, TokenKind::Eof);
        assert_eq!(tokens[3].span, Span::new(15, 15));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_all_operators_and_punctuation() {
        let input = "!= = > < >= <= ( ) , && || !";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::NotEq,
                TokenKind::Eq,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Gte,
                TokenKind::Lte,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Comma,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_without_spaces() {
        assert_eq!(
            kinds("votes>=3"),
            vec![
                TokenKind::Identifier("votes"),
                TokenKind::Gte,
                TokenKind::Number("3"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let input = "AND or nOt In is Asc DESC empty NULL true FALSE My-Identifier";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::In,
                TokenKind::Is,
                TokenKind::Asc,
                TokenKind::Desc,
                TokenKind::Empty,
                TokenKind::Empty,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Identifier("My-Identifier"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_order_by_is_one_token() {
        let tokens = tokenize("order   By created").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::OrderBy);
        assert_eq!(tokens[0].text, "order   By");
        assert_eq!(tokens[1].kind, TokenKind::Identifier("created"));
    }

    #[test]
    fn test_order_without_by_is_identifier() {
        assert_eq!(
            kinds("order = 1"),
            vec![
                TokenKind::Identifier("order"),
                TokenKind::Eq,
                TokenKind::Number("1"),
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("order byline")[0], TokenKind::Identifier("order"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("12345 3.25 -4 +7"),
            vec![
                TokenKind::Number("12345"),
                TokenKind::Number("3.25"),
                TokenKind::Number("-4"),
                TokenKind::Number("+7"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_relative_dates() {
        assert_eq!(
            kinds("-1d +7d 2w -1.5d"),
            vec![
                TokenKind::RelativeDate("-1d"),
                TokenKind::RelativeDate("+7d"),
                TokenKind::RelativeDate("2w"),
                TokenKind::RelativeDate("-1.5d"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unquoted_dates_are_words() {
        assert_eq!(
            kinds("created > 2024-01-10 AND due < 2024/02/01"),
            vec![
                TokenKind::Identifier("created"),
                TokenKind::Gt,
                TokenKind::Identifier("2024-01-10"),
                TokenKind::And,
                TokenKind::Identifier("due"),
                TokenKind::Lt,
                TokenKind::Identifier("2024/02/01"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#""say \"hi\"" 'it\'s' "back\\slash""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String(Cow::Owned("say \"hi\"".to_string())));
        assert_eq!(tokens[1].kind, TokenKind::String(Cow::Owned("it's".to_string())));
        assert_eq!(tokens[2].kind, TokenKind::String(Cow::Owned("back\\slash".to_string())));
    }

    #[test]
    fn test_single_quotes_may_contain_double_quotes() {
        let tokens = tokenize(r#"'a "b" c'"#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String(Cow::Borrowed("a \"b\" c")));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize(r#"summary = "never closed"#).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
        assert_eq!(err.position, 10);
    }

    #[test]
    fn test_unterminated_after_trailing_backslash() {
        let err = tokenize(r#"summary = "abc\"#).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("status = Open; priority = High").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnexpectedCharacter(';'));
        assert_eq!(err.position, 13);
    }

    #[test]
    fn test_lone_sign_is_rejected() {
        let err = tokenize("created > - 1d").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnexpectedCharacter('-'));
        assert_eq!(err.position, 10);
    }

    #[test]
    fn test_single_ampersand_is_rejected() {
        let err = tokenize("a = 1 & b = 2").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnexpectedCharacter('&'));
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let items: Vec<_> = Lexer::new("a # b").collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn test_empty_input_yields_eof() {
        let tokens = tokenize("   ").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
        assert_eq!(tokens[0].span, Span::new(3, 3));
    }

    #[test]
    fn test_complex_query() {
        let input = r#"type = Bug AND priority in (Highest, High) ORDER BY created DESC"#;
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Identifier("type"),
                TokenKind::Eq,
                TokenKind::Identifier("Bug"),
                TokenKind::And,
                TokenKind::Identifier("priority"),
                TokenKind::In,
                TokenKind::LParen,
                TokenKind::Identifier("Highest"),
                TokenKind::Comma,
                TokenKind::Identifier("High"),
                TokenKind::RParen,
                TokenKind::OrderBy,
                TokenKind::Identifier("created"),
                TokenKind::Desc,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_function_call_tokens() {
        assert_eq!(
            kinds("assignee = currentUser()"),
            vec![
                TokenKind::Identifier("assignee"),
                TokenKind::Eq,
                TokenKind::Identifier("currentUser"),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }
}
