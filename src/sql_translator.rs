//! Reference translator from a [`CompiledQuery`] to PostgreSQL using
//! sea-query. Hosts with another storage backend translate the predicate
//! themselves; this one backs the REPL and the benchmarks.

use std::fmt;

use sea_query::{Asterisk, Expr, Iden, Order, PostgresQueryBuilder, SelectStatement, SimpleExpr};
use tracing::debug;

use crate::ast::{Comparator, Direction};
use crate::config::QueryConfig;
use crate::predicate::{CompiledQuery, Predicate, Value};

#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    /// Minimum number of equalities on one field, joined by OR, before they
    /// are folded into a single IN.
    pub max_or_conditions_for_in: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_or_conditions_for_in: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// A rewrite applied while translating.
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    OrToIn { field: String, value_count: usize },
}

#[derive(Debug)]
pub struct TranslateResult {
    pub sql: String,
    pub optimizations: Vec<Optimization>,
}

pub struct SqlTranslator {
    config: QueryConfig,
    optimization: OptimizationConfig,
}

impl Default for SqlTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlTranslator {
    pub fn new() -> Self {
        Self::from_config(QueryConfig::default())
    }

    pub fn from_config(config: QueryConfig) -> Self {
        Self {
            config,
            optimization: OptimizationConfig::default(),
        }
    }

    pub fn with_optimization(mut self, optimization: OptimizationConfig) -> Self {
        self.optimization = optimization;
        self
    }

    pub fn translate(&self, query: &CompiledQuery) -> TranslateResult {
        let mut optimizations = Vec::new();

        let mut select = SelectStatement::new();
        select
            .column(Asterisk)
            .from(TableName(self.config.table.clone()));

        if query.predicate != Predicate::True {
            select.and_where(self.translate_predicate(&query.predicate, &mut optimizations));
        }

        for order in &query.order_by {
            let direction = match order.direction {
                Direction::Asc => Order::Asc,
                Direction::Desc => Order::Desc,
            };
            select.order_by(self.column(&order.field), direction);
        }

        let sql = select.to_string(PostgresQueryBuilder);
        debug!(optimizations = optimizations.len(), "translated to sql");
        TranslateResult { sql, optimizations }
    }

    fn column(&self, field: &str) -> ColumnName {
        ColumnName(self.config.column_for(field))
    }

    fn translate_predicate(
        &self,
        predicate: &Predicate,
        optimizations: &mut Vec<Optimization>,
    ) -> SimpleExpr {
        match predicate {
            Predicate::True => Expr::val(true).into(),
            Predicate::And { .. } => {
                let operands = chain(predicate, Connective::And);
                self.translate_chain(&operands, SimpleExpr::and, optimizations)
            }
            Predicate::Or { .. } => {
                let operands = chain(predicate, Connective::Or);
                if let Some(folded) = self.try_optimize_or_to_in(&operands, optimizations) {
                    return folded;
                }
                self.translate_chain(&operands, SimpleExpr::or, optimizations)
            }
            Predicate::Not { inner } => self.translate_predicate(inner, optimizations).not(),
            Predicate::Compare { field, op, value } => {
                let col = Expr::col(self.column(field));
                let val = to_sql_value(value);
                match op {
                    Comparator::Eq => col.eq(val),
                    Comparator::NotEq => col.ne(val),
                    Comparator::Gt => col.gt(val),
                    Comparator::Gte => col.gte(val),
                    Comparator::Lt => col.lt(val),
                    Comparator::Lte => col.lte(val),
                }
            }
            Predicate::In { field, values } => {
                Expr::col(self.column(field)).is_in(values.iter().map(to_sql_value))
            }
            Predicate::NotIn { field, values } => {
                Expr::col(self.column(field)).is_not_in(values.iter().map(to_sql_value))
            }
            Predicate::IsNull { field } => Expr::col(self.column(field)).is_null(),
            Predicate::IsNotNull { field } => Expr::col(self.column(field)).is_not_null(),
        }
    }

    /// Joins neighbouring operands pairwise until one expression is left, so
    /// the rendered tree is only logarithmically deep. Operand order is kept.
    fn translate_chain(
        &self,
        operands: &[&Predicate],
        join: fn(SimpleExpr, SimpleExpr) -> SimpleExpr,
        optimizations: &mut Vec<Optimization>,
    ) -> SimpleExpr {
        let mut exprs: Vec<SimpleExpr> = operands
            .iter()
            .map(|operand| self.translate_predicate(operand, optimizations))
            .collect();
        while exprs.len() > 1 {
            let mut joined = Vec::with_capacity(exprs.len().div_ceil(2));
            let mut rest = exprs.into_iter();
            while let Some(left) = rest.next() {
                joined.push(match rest.next() {
                    Some(right) => join(left, right),
                    None => left,
                });
            }
            exprs = joined;
        }
        exprs.pop().unwrap_or_else(|| Expr::val(true).into())
    }

    /// Folds `f = a OR f = b OR ...` into `f IN (a, b, ...)` once the chain
    /// is long enough. Every operand must be an equality on the same field.
    fn try_optimize_or_to_in(
        &self,
        operands: &[&Predicate],
        optimizations: &mut Vec<Optimization>,
    ) -> Option<SimpleExpr> {
        let (field, values) = equality_values(operands)?;
        if values.len() < self.optimization.max_or_conditions_for_in {
            return None;
        }

        optimizations.push(Optimization::OrToIn {
            field: field.to_string(),
            value_count: values.len(),
        });
        Some(Expr::col(self.column(field)).is_in(values.into_iter().map(to_sql_value)))
    }
}

#[derive(Clone, Copy)]
enum Connective {
    And,
    Or,
}

/// The operands of a run of one connective, in source order. Walks with an
/// explicit stack so a long chain never deepens the call stack.
fn chain(predicate: &Predicate, connective: Connective) -> Vec<&Predicate> {
    let mut operands = Vec::new();
    let mut pending = vec![predicate];
    while let Some(next) = pending.pop() {
        match (next, connective) {
            (Predicate::And { left, right }, Connective::And)
            | (Predicate::Or { left, right }, Connective::Or) => {
                pending.push(right.as_ref());
                pending.push(left.as_ref());
            }
            _ => operands.push(next),
        }
    }
    operands
}

/// `None` as soon as an operand is anything other than an equality on the
/// first field seen.
fn equality_values<'p>(operands: &[&'p Predicate]) -> Option<(&'p str, Vec<&'p Value>)> {
    let mut field: Option<&'p str> = None;
    let mut values = Vec::with_capacity(operands.len());
    for &operand in operands {
        match operand {
            Predicate::Compare {
                field: name,
                op: Comparator::Eq,
                value,
            } if field.map_or(true, |seen| seen == name.as_str()) => {
                field = Some(name.as_str());
                values.push(value);
            }
            _ => return None,
        }
    }
    Some((field?, values))
}

fn to_sql_value(value: &Value) -> sea_query::Value {
    match value {
        Value::String(s) => s.clone().into(),
        Value::Integer(n) => (*n).into(),
        Value::Decimal(n) => (*n).into(),
        Value::Bool(b) => (*b).into(),
        Value::Instant(t) => (*t).into(),
    }
}
