//! Binds a parsed query to the field schema.
//!
//! Every field reference is looked up in the [`FieldRegistry`], operators are
//! checked against what the field allows, and each literal is checked against
//! the field's value type and coerced to a [`BoundValue`]. The first problem
//! found, scanning left to right, is returned.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use crate::ast::{
    Comparator, DateFunction, Direction, Expr, Literal, Number, Operand, OrderSpec, Query,
    RelativeDate,
};
use crate::error::SemanticError;
use crate::schema::{FieldRegistry, FieldSchema, ValueType};

/// A literal checked against its field's type. Contextual values are still
/// deferred; see [`crate::resolver`].
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// String, enum or user name.
    Text(String),
    Number(Number),
    Bool(bool),
    /// Absolute date written in the query.
    Instant(DateTime<Utc>),
    CurrentUser,
    RelativeDate(RelativeDate),
    Function(DateFunction),
}

/// One entry of an IN list. `EMPTY` is kept apart from real values and is
/// never resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ListValue<V> {
    Value(V),
    Empty,
}

impl<V> ListValue<V> {
    pub fn map<W>(self, f: impl FnOnce(V) -> W) -> ListValue<W> {
        match self {
            ListValue::Value(value) => ListValue::Value(f(value)),
            ListValue::Empty => ListValue::Empty,
        }
    }
}

/// Expression tree whose fields are schema entries. Generic over the value
/// type so the resolver can reuse the shape.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr<'r, V> {
    And(Box<Self>, Box<Self>),
    Or(Box<Self>, Box<Self>),
    Not(Box<Self>),
    Compare {
        field: &'r FieldSchema,
        op: Comparator,
        value: V,
    },
    /// `f = EMPTY` / `f IS EMPTY`, or the negated forms.
    IsEmpty {
        field: &'r FieldSchema,
        negated: bool,
    },
    In {
        field: &'r FieldSchema,
        values: Vec<ListValue<V>>,
        negated: bool,
    },
}

impl<'r, V> BoundExpr<'r, V> {
    /// Rebuilds the tree with every value passed through `f`, left to right.
    pub fn map_values<W, F>(self, f: &mut F) -> BoundExpr<'r, W>
    where
        F: FnMut(V) -> W,
    {
        match self {
            BoundExpr::And(left, right) => {
                let left = left.map_values(f);
                BoundExpr::And(Box::new(left), Box::new(right.map_values(f)))
            }
            BoundExpr::Or(left, right) => {
                let left = left.map_values(f);
                BoundExpr::Or(Box::new(left), Box::new(right.map_values(f)))
            }
            BoundExpr::Not(inner) => BoundExpr::Not(Box::new(inner.map_values(f))),
            BoundExpr::Compare { field, op, value } => BoundExpr::Compare {
                field,
                op,
                value: f(value),
            },
            BoundExpr::IsEmpty { field, negated } => BoundExpr::IsEmpty { field, negated },
            BoundExpr::In {
                field,
                values,
                negated,
            } => BoundExpr::In {
                field,
                values: values.into_iter().map(|value| value.map(&mut *f)).collect(),
                negated,
            },
        }
    }

    /// Number of comparison leaves.
    pub fn leaf_count(&self) -> usize {
        match self {
            BoundExpr::And(left, right) | BoundExpr::Or(left, right) => {
                left.leaf_count() + right.leaf_count()
            }
            BoundExpr::Not(inner) => inner.leaf_count(),
            BoundExpr::Compare { .. } | BoundExpr::IsEmpty { .. } | BoundExpr::In { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundOrder<'r> {
    pub field: &'r FieldSchema,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery<'r, V = BoundValue> {
    pub expr: Option<BoundExpr<'r, V>>,
    pub order_by: Vec<BoundOrder<'r>>,
}

pub fn bind<'r>(
    query: &Query,
    registry: &'r FieldRegistry,
) -> Result<BoundQuery<'r>, SemanticError> {
    let binder = Binder { registry };

    let expr = query
        .expr
        .as_ref()
        .map(|expr| binder.bind_expr(expr))
        .transpose()?;
    let order_by = query
        .order_by
        .iter()
        .map(|spec| binder.bind_order(spec))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        comparisons = expr.as_ref().map_or(0, BoundExpr::leaf_count),
        order_by = order_by.len(),
        "bound query"
    );
    Ok(BoundQuery { expr, order_by })
}

struct Binder<'r> {
    registry: &'r FieldRegistry,
}

impl<'r> Binder<'r> {
    fn bind_expr(&self, expr: &Expr) -> Result<BoundExpr<'r, BoundValue>, SemanticError> {
        match expr {
            Expr::And { left, right, .. } => Ok(BoundExpr::And(
                Box::new(self.bind_expr(left)?),
                Box::new(self.bind_expr(right)?),
            )),
            Expr::Or { left, right, .. } => Ok(BoundExpr::Or(
                Box::new(self.bind_expr(left)?),
                Box::new(self.bind_expr(right)?),
            )),
            Expr::Not { inner, .. } => Ok(BoundExpr::Not(Box::new(self.bind_expr(inner)?))),
            Expr::Compare {
                field, op, value, ..
            } => {
                let schema = self.registry.resolve_field_name(field)?;
                check_operator(schema, *op, value)?;
                if value.literal == Literal::Empty {
                    return Ok(BoundExpr::IsEmpty {
                        field: schema,
                        negated: *op == Comparator::NotEq,
                    });
                }
                Ok(BoundExpr::Compare {
                    field: schema,
                    op: *op,
                    value: bind_value(schema, value)?,
                })
            }
            Expr::In {
                field,
                values,
                negated,
                span,
            } => {
                let schema = self.registry.resolve_field_name(field)?;
                // Membership is a disjunction of equalities.
                let (op, keyword) = if *negated {
                    (Comparator::NotEq, "NOT IN")
                } else {
                    (Comparator::Eq, "IN")
                };
                if !schema.allows(op) {
                    return Err(SemanticError::UnsupportedOperator {
                        field: schema.canonical_name.clone(),
                        operator: keyword.to_string(),
                        span: *span,
                    });
                }
                let values = values
                    .iter()
                    .map(|value| match value.literal {
                        Literal::Empty => Ok(ListValue::Empty),
                        _ => bind_value(schema, value).map(ListValue::Value),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(BoundExpr::In {
                    field: schema,
                    values,
                    negated: *negated,
                })
            }
        }
    }

    fn bind_order(&self, spec: &OrderSpec) -> Result<BoundOrder<'r>, SemanticError> {
        let field = self.registry.resolve_field_name(&spec.field)?;
        if !field.orderable {
            return Err(SemanticError::UnorderableField {
                field: field.canonical_name.clone(),
                span: spec.field.span,
            });
        }
        Ok(BoundOrder {
            field,
            direction: spec.direction,
        })
    }
}

fn check_operator(
    schema: &FieldSchema,
    op: Comparator,
    value: &Operand,
) -> Result<(), SemanticError> {
    if !schema.allows(op) {
        return Err(SemanticError::UnsupportedOperator {
            field: schema.canonical_name.clone(),
            operator: op.to_string(),
            span: value.span,
        });
    }
    // EMPTY only means "has no value"; ordering against it is meaningless.
    if value.literal == Literal::Empty && !op.is_equality() {
        return Err(SemanticError::UnsupportedOperator {
            field: schema.canonical_name.clone(),
            operator: format!("{op} EMPTY"),
            span: value.span,
        });
    }
    Ok(())
}

fn bind_value(schema: &FieldSchema, operand: &Operand) -> Result<BoundValue, SemanticError> {
    use ValueType as T;

    match (schema.value_type, &operand.literal) {
        (T::String | T::Enum | T::UserRef, Literal::String(s) | Literal::Identifier(s)) => {
            Ok(BoundValue::Text(s.clone()))
        }
        (T::UserRef, Literal::CurrentUser) => Ok(BoundValue::CurrentUser),
        (T::Number, Literal::Number(n)) => Ok(BoundValue::Number(*n)),
        (T::Bool, Literal::Bool(b)) => Ok(BoundValue::Bool(*b)),
        (T::Date, Literal::RelativeDate(date)) => Ok(BoundValue::RelativeDate(*date)),
        (T::Date, Literal::Function(function)) => Ok(BoundValue::Function(*function)),
        (T::Date, Literal::String(text) | Literal::Identifier(text)) => {
            parse_date_text(text).ok_or_else(|| SemanticError::InvalidDate {
                field: schema.canonical_name.clone(),
                text: text.clone(),
                span: operand.span,
            })
        }
        (expected, literal) => Err(SemanticError::TypeMismatch {
            field: schema.canonical_name.clone(),
            expected,
            got: literal.kind_name(),
            span: operand.span,
        }),
    }
}

/// Date text accepted for date fields: a relative date (`"-1d"`), RFC 3339,
/// or `yyyy-MM-dd` / `yyyy/MM/dd` with an optional ` HH:mm`, read as UTC.
fn parse_date_text(text: &str) -> Option<BoundValue> {
    let text = text.trim();

    if let Some(date) = RelativeDate::parse(text) {
        return Some(BoundValue::RelativeDate(date));
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(BoundValue::Instant(instant.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(BoundValue::Instant(Utc.from_utc_datetime(&naive)));
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            let midnight = date.and_hms_opt(0, 0, 0)?;
            return Some(BoundValue::Instant(Utc.from_utc_datetime(&midnight)));
        }
    }
    None
}
