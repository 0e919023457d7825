//! Syntax tree produced by the parser.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::Span;

/// Root of a parsed query: an optional filter plus the ORDER BY items.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    /// `None` when the query has no filter part and matches everything.
    pub expr: Option<Expr>,
    pub order_by: Vec<OrderSpec>,
}

/// A field name as written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

/// Boolean expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Not {
        inner: Box<Expr>,
        span: Span,
    },
    /// Leaf comparison, e.g. `status = Open`.
    Compare {
        field: Identifier,
        op: Comparator,
        value: Operand,
        span: Span,
    },
    /// `field IN (...)` or `field NOT IN (...)`.
    In {
        field: Identifier,
        values: Vec<Operand>,
        negated: bool,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::And { span, .. }
            | Expr::Or { span, .. }
            | Expr::Not { span, .. }
            | Expr::Compare { span, .. }
            | Expr::In { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
}

impl Comparator {
    pub const ALL: [Comparator; 6] = [
        Comparator::Eq,
        Comparator::NotEq,
        Comparator::Gt,
        Comparator::Gte,
        Comparator::Lt,
        Comparator::Lte,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::NotEq => "!=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Comparator::Eq | Comparator::NotEq)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY item. Items keep source order: the first is the primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub field: Identifier,
    pub direction: Direction,
    pub span: Span,
}

/// A literal together with where it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub literal: Literal,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Quoted string.
    String(String),
    Number(Number),
    Bool(bool),
    /// `EMPTY`: the field has no value.
    Empty,
    /// `currentUser()`, resolved from the evaluation context.
    CurrentUser,
    /// `-1d`, `+2w`, resolved against the evaluation context's "now".
    RelativeDate(RelativeDate),
    /// `now()`, `startOfDay()`, `endOfDay()`.
    Function(DateFunction),
    /// Unquoted word such as `Bug`.
    Identifier(String),
}

impl Literal {
    /// Name of the literal kind for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Number(_) => "number",
            Literal::Bool(_) => "boolean",
            Literal::Empty => "EMPTY",
            Literal::CurrentUser => "currentUser()",
            Literal::RelativeDate(_) => "relative date",
            Literal::Function(_) => "date function",
            Literal::Identifier(_) => "bare word",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Integer(i64),
    Decimal(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(n) => write!(f, "{n}"),
            Number::Decimal(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl DateUnit {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "m" => Some(DateUnit::Minute),
            "h" => Some(DateUnit::Hour),
            "d" => Some(DateUnit::Day),
            "w" => Some(DateUnit::Week),
            _ => None,
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            DateUnit::Minute => 1,
            DateUnit::Hour => 60,
            DateUnit::Day => 24 * 60,
            DateUnit::Week => 7 * 24 * 60,
        }
    }
}

/// Offset from "now", e.g. `-7d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeDate {
    pub sign: Sign,
    pub magnitude: u32,
    pub unit: DateUnit,
}

impl RelativeDate {
    /// Largest magnitude the parser accepts.
    pub const MAX_MAGNITUDE: u32 = 1_000_000;

    /// Parses `[+-]digits unit`. Unsigned input counts as `+`.
    pub fn parse(text: &str) -> Option<Self> {
        let (sign, rest) = match text.as_bytes().first()? {
            b'-' => (Sign::Minus, &text[1..]),
            b'+' => (Sign::Plus, &text[1..]),
            _ => (Sign::Plus, text),
        };
        let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
        let (digits, suffix) = rest.split_at(digits_end);
        if digits.is_empty() {
            return None;
        }
        let magnitude = digits.parse::<u32>().ok()?;
        if magnitude > Self::MAX_MAGNITUDE {
            return None;
        }
        let unit = DateUnit::from_suffix(suffix)?;
        Some(Self {
            sign,
            magnitude,
            unit,
        })
    }

    /// Signed offset in minutes.
    pub fn offset_minutes(&self) -> i64 {
        let minutes = i64::from(self.magnitude) * self.unit.minutes();
        match self.sign {
            Sign::Plus => minutes,
            Sign::Minus => -minutes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFunction {
    Now,
    StartOfDay,
    EndOfDay,
}
