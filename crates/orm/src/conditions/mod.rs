//! Condition model - dialect-independent WHERE/HAVING/JOIN predicates
//!
//! Conditions form an algebraic tree: hash conditions (column/value maps),
//! boolean combinators, operator nodes, and raw fragments. The tree carries
//! no SQL text beyond `Raw`; compilation to a concrete dialect happens in
//! the query builder.

pub mod filter;

pub use filter::filter_condition;

use crate::value::DbValue;

/// Comparison operators for scalar conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }

    /// Split a leading operator token off a raw comparison value.
    ///
    /// `">=10"` parses to `(Gte, "10")`; a value with no leading operator
    /// returns `None`. Two-character tokens are matched first.
    pub fn parse_prefix(value: &str) -> Option<(CompareOp, &str)> {
        for (token, op) in [
            ("<>", CompareOp::Ne),
            (">=", CompareOp::Gte),
            ("<=", CompareOp::Lte),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
            ("=", CompareOp::Eq),
        ] {
            if let Some(rest) = value.strip_prefix(token) {
                return Some((op, rest));
            }
        }
        None
    }
}

/// Right-hand side of a hash-condition entry
#[derive(Debug, Clone, PartialEq)]
pub enum HashValue {
    /// A scalar; `DbValue::Null` compiles to `IS NULL`
    Value(DbValue),
    /// A list; compiles to `IN (...)`
    List(Vec<DbValue>),
}

impl From<DbValue> for HashValue {
    fn from(value: DbValue) -> Self {
        HashValue::Value(value)
    }
}

impl From<Vec<DbValue>> for HashValue {
    fn from(values: Vec<DbValue>) -> Self {
        HashValue::List(values)
    }
}

macro_rules! hash_value_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for HashValue {
            fn from(value: $ty) -> Self {
                HashValue::Value(value.into())
            }
        })*
    };
}

hash_value_from!(bool, i32, i64, f64, String, &str);

/// A WHERE/HAVING/JOIN predicate tree
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Condition {
    /// No condition
    #[default]
    None,
    /// Column/value pairs combined with AND, order-preserving
    Hash(Vec<(String, HashValue)>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Compare {
        column: String,
        op: CompareOp,
        value: DbValue,
    },
    /// Single- or multi-column IN over value tuples
    In {
        columns: Vec<String>,
        values: Vec<Vec<DbValue>>,
        negated: bool,
    },
    Between {
        column: String,
        low: DbValue,
        high: DbValue,
        negated: bool,
    },
    Like {
        column: String,
        pattern: String,
        negated: bool,
    },
    /// Raw SQL fragment with named `:param` bindings
    Raw {
        sql: String,
        params: Vec<(String, DbValue)>,
    },
}

impl Condition {
    /// Build a hash condition from column/value pairs.
    pub fn hash<I, K, V>(pairs: I) -> Condition
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HashValue>,
    {
        Condition::Hash(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn eq(column: impl Into<String>, value: impl Into<DbValue>) -> Condition {
        Condition::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn compare(
        column: impl Into<String>,
        op: CompareOp,
        value: impl Into<DbValue>,
    ) -> Condition {
        Condition::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn in_column<I, V>(column: impl Into<String>, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<DbValue>,
    {
        Condition::In {
            columns: vec![column.into()],
            values: values.into_iter().map(|v| vec![v.into()]).collect(),
            negated: false,
        }
    }

    pub fn in_tuples(columns: Vec<String>, values: Vec<Vec<DbValue>>) -> Condition {
        Condition::In {
            columns,
            values,
            negated: false,
        }
    }

    pub fn between(
        column: impl Into<String>,
        low: impl Into<DbValue>,
        high: impl Into<DbValue>,
    ) -> Condition {
        Condition::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Condition {
        Condition::Like {
            column: column.into(),
            pattern: pattern.into(),
            negated: false,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Condition {
        Condition::Raw {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn raw_with_params<I, K, V>(sql: impl Into<String>, params: I) -> Condition
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DbValue>,
    {
        Condition::Raw {
            sql: sql.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn negate(self) -> Condition {
        match self {
            Condition::None => Condition::None,
            Condition::In {
                columns,
                values,
                negated,
            } => Condition::In {
                columns,
                values,
                negated: !negated,
            },
            Condition::Between {
                column,
                low,
                high,
                negated,
            } => Condition::Between {
                column,
                low,
                high,
                negated: !negated,
            },
            Condition::Like {
                column,
                pattern,
                negated,
            } => Condition::Like {
                column,
                pattern,
                negated: !negated,
            },
            other => Condition::Not(Box::new(other)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Condition::None)
    }

    /// Combine with another condition using AND, flattening into an
    /// existing top-level AND list instead of nesting.
    pub fn and_with(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::None, other) => other,
            (this, Condition::None) => this,
            (Condition::And(mut list), Condition::And(other_list)) => {
                list.extend(other_list);
                Condition::And(list)
            }
            (Condition::And(mut list), other) => {
                list.push(other);
                Condition::And(list)
            }
            (this, other) => Condition::And(vec![this, other]),
        }
    }

    /// Combine with another condition using OR, flattening into an
    /// existing top-level OR list instead of nesting.
    pub fn or_with(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::None, other) => other,
            (this, Condition::None) => this,
            (Condition::Or(mut list), Condition::Or(other_list)) => {
                list.extend(other_list);
                Condition::Or(list)
            }
            (Condition::Or(mut list), other) => {
                list.push(other);
                Condition::Or(list)
            }
            (this, other) => Condition::Or(vec![this, other]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_with_flattens() {
        let c = Condition::eq("a", 1)
            .and_with(Condition::eq("b", 2))
            .and_with(Condition::eq("c", 3));
        match c {
            Condition::And(list) => assert_eq!(list.len(), 3),
            other => panic!("expected flat And, got {:?}", other),
        }
    }

    #[test]
    fn test_and_with_none_is_identity() {
        let c = Condition::None.and_with(Condition::eq("a", 1));
        assert_eq!(c, Condition::eq("a", 1));
        let c = Condition::eq("a", 1).and_with(Condition::None);
        assert_eq!(c, Condition::eq("a", 1));
    }

    #[test]
    fn test_or_with_flattens() {
        let c = Condition::eq("a", 1)
            .or_with(Condition::eq("b", 2))
            .or_with(Condition::eq("c", 3));
        match c {
            Condition::Or(list) => assert_eq!(list.len(), 3),
            other => panic!("expected flat Or, got {:?}", other),
        }
    }

    #[test]
    fn test_compare_prefix_parsing() {
        assert_eq!(CompareOp::parse_prefix(">=10"), Some((CompareOp::Gte, "10")));
        assert_eq!(CompareOp::parse_prefix("<>x"), Some((CompareOp::Ne, "x")));
        assert_eq!(CompareOp::parse_prefix(">5"), Some((CompareOp::Gt, "5")));
        assert_eq!(CompareOp::parse_prefix("plain"), None);
    }

    #[test]
    fn test_negate_folds_into_operators() {
        match Condition::in_column("id", vec![1, 2]).negate() {
            Condition::In { negated, .. } => assert!(negated),
            other => panic!("unexpected {:?}", other),
        }
        match Condition::eq("a", 1).negate() {
            Condition::Not(_) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
