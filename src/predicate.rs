//! Backend-neutral output of the compiler.
//!
//! A [`CompiledQuery`] carries no source text and no spans. Field names are
//! always canonical, so two queries that differ only in aliases, casing or
//! whitespace compile to equal values. Everything here serializes with serde
//! for storage or transport to an execution backend.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::{Comparator, Direction};

/// A concrete, fully resolved value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Integer(i64),
    Decimal(f64),
    Bool(bool),
    Instant(DateTime<Utc>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Decimal(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Instant(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Matches every record. Produced for queries with no filter.
    True,
    And {
        left: Box<Predicate>,
        right: Box<Predicate>,
    },
    Or {
        left: Box<Predicate>,
        right: Box<Predicate>,
    },
    Not {
        inner: Box<Predicate>,
    },
    Compare {
        field: String,
        op: Comparator,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    NotIn {
        field: String,
        values: Vec<Value>,
    },
    IsNull {
        field: String,
    },
    IsNotNull {
        field: String,
    },
}

impl Predicate {
    pub fn and(left: Predicate, right: Predicate) -> Self {
        Predicate::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Predicate, right: Predicate) -> Self {
        Predicate::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(inner: Predicate) -> Self {
        Predicate::Not {
            inner: Box::new(inner),
        }
    }

    /// Canonical names of every field the predicate touches, in order of first
    /// appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'p>(&'p self, out: &mut Vec<&'p str>) {
        match self {
            Predicate::True => {}
            Predicate::And { left, right } | Predicate::Or { left, right } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Predicate::Not { inner } => inner.collect_fields(out),
            Predicate::Compare { field, .. }
            | Predicate::In { field, .. }
            | Predicate::NotIn { field, .. }
            | Predicate::IsNull { field }
            | Predicate::IsNotNull { field } => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(values: &[Value]) -> String {
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            Predicate::True => f.write_str("TRUE"),
            Predicate::And { left, right } => write!(f, "({left} AND {right})"),
            Predicate::Or { left, right } => write!(f, "({left} OR {right})"),
            Predicate::Not { inner } => write!(f, "NOT {inner}"),
            Predicate::Compare { field, op, value } => write!(f, "{field} {op} {value}"),
            Predicate::In { field, values } => write!(f, "{field} IN ({})", list(values)),
            Predicate::NotIn { field, values } => write!(f, "{field} NOT IN ({})", list(values)),
            Predicate::IsNull { field } => write!(f, "{field} IS NULL"),
            Predicate::IsNotNull { field } => write!(f, "{field} IS NOT NULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Result of a successful compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    pub order_by: Vec<OrderBy>,
}
