//! Substitutes contextual values using an [`EvaluationContext`].
//!
//! This is the only stage that looks at the context. It cannot fail: every
//! literal that reaches it has already been type checked by the binder.
//! `EMPTY` is not a value and passes through untouched, as
//! [`BoundExpr::IsEmpty`](crate::binder::BoundExpr::IsEmpty) or
//! [`ListValue::Empty`](crate::binder::ListValue::Empty).

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::ast::{DateFunction, Number, RelativeDate, Sign};
use crate::binder::{BoundQuery, BoundValue};
use crate::context::EvaluationContext;
use crate::predicate::Value;

/// A bound query whose values are all concrete.
pub type ResolvedQuery<'r> = BoundQuery<'r, Value>;

pub fn resolve<'r>(query: BoundQuery<'r>, ctx: &EvaluationContext) -> ResolvedQuery<'r> {
    BoundQuery {
        expr: query
            .expr
            .map(|expr| expr.map_values(&mut |value| resolve_value(value, ctx))),
        order_by: query.order_by,
    }
}

pub fn resolve_value(value: BoundValue, ctx: &EvaluationContext) -> Value {
    match value {
        BoundValue::Text(text) => Value::String(text),
        BoundValue::Number(Number::Integer(n)) => Value::Integer(n),
        BoundValue::Number(Number::Decimal(n)) => Value::Decimal(n),
        BoundValue::Bool(b) => Value::Bool(b),
        BoundValue::Instant(instant) => Value::Instant(instant),
        BoundValue::CurrentUser => Value::String(ctx.current_user_id.clone()),
        BoundValue::RelativeDate(date) => Value::Instant(shift(ctx.now, date)),
        BoundValue::Function(function) => Value::Instant(evaluate(function, ctx.now)),
    }
}

/// `now` moved by the offset, clamped to the representable range.
fn shift(now: DateTime<Utc>, date: RelativeDate) -> DateTime<Utc> {
    now.checked_add_signed(Duration::minutes(date.offset_minutes()))
        .unwrap_or(match date.sign {
            Sign::Plus => DateTime::<Utc>::MAX_UTC,
            Sign::Minus => DateTime::<Utc>::MIN_UTC,
        })
}

/// Day boundaries are taken in UTC.
fn evaluate(function: DateFunction, now: DateTime<Utc>) -> DateTime<Utc> {
    let day = now.date_naive();
    match function {
        DateFunction::Now => now,
        DateFunction::StartOfDay => day.and_time(NaiveTime::MIN).and_utc(),
        DateFunction::EndOfDay => {
            let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
            day.and_time(end).and_utc()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DateUnit;
    use crate::binder::{bind, BoundExpr, ListValue};
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::schema::FieldRegistry;
    use chrono::TimeZone;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new("u-42", Utc.with_ymd_and_hms(2024, 1, 10, 15, 45, 30).unwrap())
    }

    fn resolve_str(input: &str) -> ResolvedQuery<'static> {
        let tokens = tokenize(input).unwrap();
        let query = parse(&tokens).unwrap();
        let bound = bind(&query, FieldRegistry::standard()).unwrap();
        resolve(bound, &ctx())
    }

    fn resolve_single(input: &str) -> Value {
        match resolve_str(input).expr {
            Some(BoundExpr::Compare { value, .. }) => value,
            other => panic!("Expected comparison, got {other:?}"),
        }
    }

    fn instant(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Value {
        Value::Instant(Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap())
    }

    #[test]
    fn test_current_user() {
        assert_eq!(
            resolve_single("assignee = currentUser()"),
            Value::String("u-42".to_string())
        );
    }

    #[test]
    fn test_relative_dates() {
        assert_eq!(resolve_single("created >= -1d"), instant(2024, 1, 9, 15, 45, 30));
        assert_eq!(resolve_single("due < 2w"), instant(2024, 1, 24, 15, 45, 30));
        assert_eq!(resolve_single("updated > -90m"), instant(2024, 1, 10, 14, 15, 30));
        assert_eq!(resolve_single("updated > +3h"), instant(2024, 1, 10, 18, 45, 30));
    }

    #[test]
    fn test_date_functions() {
        assert_eq!(resolve_single("due = now()"), instant(2024, 1, 10, 15, 45, 30));
        assert_eq!(resolve_single("due >= startOfDay()"), instant(2024, 1, 10, 0, 0, 0));

        let end = Utc
            .with_ymd_and_hms(2024, 1, 10, 23, 59, 59)
            .unwrap()
            .checked_add_signed(Duration::milliseconds(999))
            .unwrap();
        assert_eq!(resolve_single("due <= endOfDay()"), Value::Instant(end));
    }

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(resolve_single("votes = 3"), Value::Integer(3));
        assert_eq!(resolve_single("votes = 2.5"), Value::Decimal(2.5));
        assert_eq!(resolve_single("flagged = false"), Value::Bool(false));
        assert_eq!(resolve_single("due = 2024-02-29"), instant(2024, 2, 29, 0, 0, 0));
    }

    #[test]
    fn test_empty_is_left_alone() {
        assert!(matches!(
            resolve_str("assignee IS EMPTY").expr,
            Some(BoundExpr::IsEmpty { negated: false, .. })
        ));

        match resolve_str("assignee in (currentUser(), EMPTY)").expr {
            Some(BoundExpr::In { values, .. }) => assert_eq!(
                values,
                vec![
                    ListValue::Value(Value::String("u-42".to_string())),
                    ListValue::Empty,
                ]
            ),
            other => panic!("Expected IN, got {other:?}"),
        }
    }

    #[test]
    fn test_shift_saturates() {
        let far = RelativeDate {
            sign: Sign::Plus,
            magnitude: RelativeDate::MAX_MAGNITUDE,
            unit: DateUnit::Week,
        };
        let near_end = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        assert_eq!(shift(near_end, far), DateTime::<Utc>::MAX_UTC);

        let past = RelativeDate { sign: Sign::Minus, ..far };
        let near_start = DateTime::<Utc>::MIN_UTC + Duration::days(1);
        assert_eq!(shift(near_start, past), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_order_by_is_untouched() {
        let tokens = tokenize("ORDER BY key DESC").unwrap();
        let bound = bind(&parse(&tokens).unwrap(), FieldRegistry::standard()).unwrap();
        let resolved = resolve(bound, &ctx());
        assert!(resolved.expr.is_none());
        assert_eq!(resolved.order_by.len(), 1);
    }
}
