//! Filter-condition normalization
//!
//! The `filter_where` family drops empty operands before a condition is
//! merged into a query: null, empty string, whitespace-only string, and
//! empty list all count as empty. The rule applies recursively through
//! boolean combinators, and a `between` collapses entirely when either
//! bound is absent. Filtering is idempotent: already-filtered input is a
//! fixed point.

use super::{Condition, HashValue};
use crate::value::DbValue;

/// Whether a value counts as an empty operand for filtering purposes.
pub fn is_empty_operand(value: &DbValue) -> bool {
    match value {
        DbValue::Null => true,
        DbValue::String(s) => s.trim().is_empty(),
        DbValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn is_empty_hash_value(value: &HashValue) -> bool {
    match value {
        HashValue::Value(v) => is_empty_operand(v),
        HashValue::List(items) => items.is_empty(),
    }
}

/// Strip empty operands from a condition tree.
///
/// Returns `Condition::None` when every operand was empty; callers must
/// skip applying the result in that case rather than compiling an empty
/// predicate.
pub fn filter_condition(condition: Condition) -> Condition {
    match condition {
        Condition::None => Condition::None,
        Condition::Hash(pairs) => {
            let kept: Vec<_> = pairs
                .into_iter()
                .filter(|(_, v)| !is_empty_hash_value(v))
                .collect();
            if kept.is_empty() {
                Condition::None
            } else {
                Condition::Hash(kept)
            }
        }
        Condition::And(children) => rebuild_list(children, Condition::And),
        Condition::Or(children) => rebuild_list(children, Condition::Or),
        Condition::Not(inner) => match filter_condition(*inner) {
            Condition::None => Condition::None,
            kept => Condition::Not(Box::new(kept)),
        },
        Condition::Compare { column, op, value } => {
            if is_empty_operand(&value) {
                Condition::None
            } else {
                Condition::Compare { column, op, value }
            }
        }
        Condition::In {
            columns,
            values,
            negated,
        } => {
            if values.is_empty() {
                Condition::None
            } else {
                Condition::In {
                    columns,
                    values,
                    negated,
                }
            }
        }
        Condition::Between {
            column,
            low,
            high,
            negated,
        } => {
            // an absent bound collapses the whole between
            if is_empty_operand(&low) || is_empty_operand(&high) {
                Condition::None
            } else {
                Condition::Between {
                    column,
                    low,
                    high,
                    negated,
                }
            }
        }
        Condition::Like {
            column,
            pattern,
            negated,
        } => {
            if pattern.trim().is_empty() {
                Condition::None
            } else {
                Condition::Like {
                    column,
                    pattern,
                    negated,
                }
            }
        }
        raw @ Condition::Raw { .. } => raw,
    }
}

fn rebuild_list(children: Vec<Condition>, make: fn(Vec<Condition>) -> Condition) -> Condition {
    let mut kept: Vec<Condition> = children
        .into_iter()
        .map(filter_condition)
        .filter(|c| !c.is_none())
        .collect();
    match kept.len() {
        0 => Condition::None,
        1 => kept.remove(0),
        _ => make(kept),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_drops_null_entries() {
        let c = Condition::hash([
            ("a", HashValue::Value(DbValue::Null)),
            ("b", HashValue::Value(DbValue::Int32(5))),
        ]);
        let filtered = filter_condition(c);
        assert_eq!(
            filtered,
            Condition::Hash(vec![("b".to_string(), HashValue::Value(DbValue::Int32(5)))])
        );
    }

    #[test]
    fn test_all_empty_operands_collapse_to_none() {
        let c = Condition::hash([
            ("a", HashValue::Value(DbValue::String("".into()))),
            ("b", HashValue::List(vec![])),
        ]);
        assert_eq!(filter_condition(c), Condition::None);
    }

    #[test]
    fn test_whitespace_only_string_is_empty() {
        let c = Condition::eq("name", "   ");
        assert_eq!(filter_condition(c), Condition::None);
    }

    #[test]
    fn test_between_collapses_when_bound_missing() {
        let c = Condition::between("age", DbValue::Int32(1), DbValue::Null);
        assert_eq!(filter_condition(c), Condition::None);
        let c = Condition::between("age", DbValue::Null, DbValue::Int32(9));
        assert_eq!(filter_condition(c), Condition::None);
        let kept = Condition::between("age", DbValue::Int32(1), DbValue::Int32(9));
        assert_eq!(filter_condition(kept.clone()), kept);
    }

    #[test]
    fn test_recursion_through_combinators() {
        let c = Condition::And(vec![
            Condition::eq("a", DbValue::Null),
            Condition::Or(vec![
                Condition::eq("b", ""),
                Condition::eq("c", 3),
            ]),
            Condition::Not(Box::new(Condition::eq("d", DbValue::Null))),
        ]);
        // only `c = 3` survives, and the single-child combinators unwrap
        assert_eq!(filter_condition(c), Condition::eq("c", 3));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let cases = vec![
            Condition::hash([
                ("a", HashValue::Value(DbValue::Null)),
                ("b", HashValue::Value(DbValue::Int32(5))),
                ("c", HashValue::List(vec![DbValue::Int32(1)])),
            ]),
            Condition::And(vec![
                Condition::eq("x", ""),
                Condition::between("y", DbValue::Int32(0), DbValue::Null),
                Condition::like("z", "abc%"),
            ]),
            Condition::None,
            Condition::raw("status <> 'deleted'"),
        ];
        for case in cases {
            let once = filter_condition(case);
            let twice = filter_condition(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_in_with_no_values_collapses() {
        let c = Condition::in_column("id", Vec::<i32>::new());
        assert_eq!(filter_condition(c), Condition::None);
    }

    #[test]
    fn test_raw_fragments_pass_through() {
        let c = Condition::raw_with_params("created_at > :cutoff", [("cutoff", "2024-01-01")]);
        assert_eq!(filter_condition(c.clone()), c);
    }
}
