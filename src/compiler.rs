//! Lowers a resolved query into a [`CompiledQuery`].

use tracing::debug;

use crate::binder::{BoundExpr, ListValue};
use crate::predicate::{CompiledQuery, OrderBy, Predicate, Value};
use crate::resolver::ResolvedQuery;

pub fn compile(query: ResolvedQuery<'_>) -> CompiledQuery {
    let predicate = query.expr.map_or(Predicate::True, lower);
    let order_by: Vec<OrderBy> = query
        .order_by
        .into_iter()
        .map(|order| OrderBy {
            field: order.field.canonical_name.clone(),
            direction: order.direction,
        })
        .collect();

    debug!(fields = ?predicate.fields(), order_by = order_by.len(), "compiled predicate");
    CompiledQuery {
        predicate,
        order_by,
    }
}

fn lower(expr: BoundExpr<'_, Value>) -> Predicate {
    match expr {
        BoundExpr::And(left, right) => Predicate::and(lower(*left), lower(*right)),
        BoundExpr::Or(left, right) => Predicate::or(lower(*left), lower(*right)),
        BoundExpr::Not(inner) => Predicate::not(lower(*inner)),
        BoundExpr::Compare { field, op, value } => Predicate::Compare {
            field: field.canonical_name.clone(),
            op,
            value,
        },
        BoundExpr::IsEmpty { field, negated } => {
            null_check(field.canonical_name.clone(), negated)
        }
        BoundExpr::In {
            field,
            values,
            negated,
        } => lower_membership(field.canonical_name.clone(), values, negated),
    }
}

fn null_check(field: String, negated: bool) -> Predicate {
    if negated {
        Predicate::IsNotNull { field }
    } else {
        Predicate::IsNull { field }
    }
}

/// `f IN (EMPTY, a)` means "f is null or f is a"; the negated form means
/// "f is not null and f is not a".
fn lower_membership(field: String, values: Vec<ListValue<Value>>, negated: bool) -> Predicate {
    let mut has_empty = false;
    let values: Vec<Value> = values
        .into_iter()
        .filter_map(|value| match value {
            ListValue::Value(value) => Some(value),
            ListValue::Empty => {
                has_empty = true;
                None
            }
        })
        .collect();

    // IN lists are never empty, so no values means only EMPTY was listed.
    if values.is_empty() {
        return null_check(field, negated);
    }
    if !has_empty {
        return membership(field, values, negated);
    }

    let check = null_check(field.clone(), negated);
    if negated {
        Predicate::and(check, membership(field, values, negated))
    } else {
        Predicate::or(check, membership(field, values, negated))
    }
}

fn membership(field: String, values: Vec<Value>, negated: bool) -> Predicate {
    if negated {
        Predicate::NotIn { field, values }
    } else {
        Predicate::In { field, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Comparator, Direction};
    use crate::binder::bind;
    use crate::context::EvaluationContext;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::resolver::resolve;
    use crate::schema::FieldRegistry;
    use chrono::{TimeZone, Utc};

    fn compile_str(input: &str) -> CompiledQuery {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let ctx = EvaluationContext::new("u-42", now);
        let tokens = tokenize(input).unwrap();
        let bound = bind(&parse(&tokens).unwrap(), FieldRegistry::standard()).unwrap();
        compile(resolve(bound, &ctx))
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    fn field(name: &str) -> String {
        name.to_string()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let compiled = compile_str("");
        assert_eq!(compiled.predicate, Predicate::True);
        assert!(compiled.order_by.is_empty());
    }

    #[test]
    fn test_connectives_map_one_to_one() {
        let compiled = compile_str("status = Open AND (type = Bug OR NOT flagged = true)");
        assert_eq!(
            compiled.predicate,
            Predicate::and(
                Predicate::Compare {
                    field: field("status"),
                    op: Comparator::Eq,
                    value: text("Open"),
                },
                Predicate::or(
                    Predicate::Compare {
                        field: field("type"),
                        op: Comparator::Eq,
                        value: text("Bug"),
                    },
                    Predicate::not(Predicate::Compare {
                        field: field("flagged"),
                        op: Comparator::Eq,
                        value: Value::Bool(true),
                    }),
                ),
            )
        );
    }

    #[test]
    fn test_empty_becomes_null_check() {
        assert_eq!(
            compile_str("assignee = EMPTY").predicate,
            Predicate::IsNull {
                field: field("assignee")
            }
        );
        assert_eq!(
            compile_str("assignee IS NOT EMPTY").predicate,
            Predicate::IsNotNull {
                field: field("assignee")
            }
        );
        assert_eq!(
            compile_str("due != null").predicate,
            Predicate::IsNotNull {
                field: field("dueDate")
            }
        );
    }

    #[test]
    fn test_in_and_not_in() {
        assert_eq!(
            compile_str("priority in (High, Low)").predicate,
            Predicate::In {
                field: field("priority"),
                values: vec![text("High"), text("Low")],
            }
        );
        assert_eq!(
            compile_str("votes not in (1, 2)").predicate,
            Predicate::NotIn {
                field: field("votes"),
                values: vec![Value::Integer(1), Value::Integer(2)],
            }
        );
    }

    #[test]
    fn test_empty_inside_in_list() {
        assert_eq!(
            compile_str("assignee in (EMPTY, alice)").predicate,
            Predicate::or(
                Predicate::IsNull {
                    field: field("assignee")
                },
                Predicate::In {
                    field: field("assignee"),
                    values: vec![text("alice")],
                },
            )
        );
        assert_eq!(
            compile_str("assignee not in (alice, EMPTY)").predicate,
            Predicate::and(
                Predicate::IsNotNull {
                    field: field("assignee")
                },
                Predicate::NotIn {
                    field: field("assignee"),
                    values: vec![text("alice")],
                },
            )
        );
        assert_eq!(
            compile_str("assignee in (EMPTY)").predicate,
            Predicate::IsNull {
                field: field("assignee")
            }
        );
    }

    #[test]
    fn test_order_by_uses_canonical_names() {
        let compiled = compile_str("ORDER BY created DESC, KEY");
        assert_eq!(
            compiled.order_by,
            vec![
                OrderBy {
                    field: field("createdDate"),
                    direction: Direction::Desc,
                },
                OrderBy {
                    field: field("key"),
                    direction: Direction::Asc,
                },
            ]
        );
    }

    #[test]
    fn test_aliases_and_case_compile_identically() {
        assert_eq!(
            compile_str("Created >= -1d and ISSUETYPE = Bug order by Updated"),
            compile_str("createdDate >= -1d AND type = Bug ORDER BY updatedDate ASC")
        );
    }
}
