//! Fluent SELECT builder
//!
//! A `Query` is a mutable, reusable description of a SELECT statement.
//! All mutators take and return `self`; nothing touches the database until
//! a terminal operation runs. Compiling the same query twice against the
//! same connection state yields identical SQL and parameters.

use std::sync::Arc;
use std::time::Duration;

use crate::conditions::{filter_condition, CompareOp, Condition};
use crate::row::Row;
use crate::value::DbValue;

use super::types::{
    IndexBy, JoinClause, JoinType, OrderDirection, QueryCacheDirective, TableRef, UnionClause,
};

/// An unexecuted SELECT statement.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) select: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) from: Vec<TableRef>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) where_condition: Condition,
    pub(crate) having_condition: Condition,
    pub(crate) group_by: Vec<String>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) unions: Vec<UnionClause>,
    pub(crate) params: Vec<(String, DbValue)>,
    pub(crate) index_by: Option<IndexBy>,
    /// `None` inherits the connection's cache scope; `Some(None)` disables
    /// caching for this query; `Some(Some(..))` enables it explicitly.
    pub(crate) cache_directive: Option<Option<QueryCacheDirective>>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the select list, replacing any previous one.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append columns to the select list.
    pub fn add_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Set the source table.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from = vec![TableRef::named(table)];
        self
    }

    /// Set the source table with an alias.
    pub fn from_as(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.from = vec![TableRef::aliased(table, alias)];
        self
    }

    /// Set a derived table as the source.
    pub fn from_subquery(mut self, query: Query, alias: impl Into<String>) -> Self {
        self.from = vec![TableRef::SubQuery {
            query: Box::new(query),
            alias: alias.into(),
        }];
        self
    }

    /// Append an additional source table.
    pub fn add_from(mut self, table: impl Into<String>) -> Self {
        self.from.push(TableRef::named(table));
        self
    }

    pub fn join(mut self, join_type: JoinType, table: impl Into<String>, on: Condition) -> Self {
        self.joins.push(JoinClause {
            join_type,
            table: TableRef::named(table),
            on,
        });
        self
    }

    pub fn inner_join(self, table: impl Into<String>, on: Condition) -> Self {
        self.join(JoinType::Inner, table, on)
    }

    pub fn left_join(self, table: impl Into<String>, on: Condition) -> Self {
        self.join(JoinType::Left, table, on)
    }

    pub fn right_join(self, table: impl Into<String>, on: Condition) -> Self {
        self.join(JoinType::Right, table, on)
    }

    /// Set the WHERE condition, replacing any previous one.
    pub fn where_(mut self, condition: Condition) -> Self {
        self.where_condition = condition;
        self
    }

    /// AND a condition into the existing WHERE, flattening into a
    /// top-level AND list where possible.
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.where_condition = std::mem::take(&mut self.where_condition).and_with(condition);
        self
    }

    /// OR a condition into the existing WHERE.
    pub fn or_where(mut self, condition: Condition) -> Self {
        self.where_condition = std::mem::take(&mut self.where_condition).or_with(condition);
        self
    }

    /// Set the WHERE condition after stripping empty operands.
    ///
    /// When everything filters away the existing WHERE is left untouched.
    pub fn filter_where(self, condition: Condition) -> Self {
        let filtered = filter_condition(condition);
        if filtered.is_none() {
            self
        } else {
            self.where_(filtered)
        }
    }

    pub fn and_filter_where(self, condition: Condition) -> Self {
        let filtered = filter_condition(condition);
        if filtered.is_none() {
            self
        } else {
            self.and_where(filtered)
        }
    }

    pub fn or_filter_where(self, condition: Condition) -> Self {
        let filtered = filter_condition(condition);
        if filtered.is_none() {
            self
        } else {
            self.or_where(filtered)
        }
    }

    /// AND a comparison parsed from a raw user value.
    ///
    /// A leading `<>`, `>=`, `>`, `<=`, `<` or `=` token on the value picks
    /// the operator; otherwise `default_op` applies. Empty values are
    /// dropped entirely, like the rest of the filter family.
    pub fn and_filter_compare(
        self,
        column: impl Into<String>,
        value: &str,
        default_op: CompareOp,
    ) -> Self {
        let (op, rest) = match CompareOp::parse_prefix(value) {
            Some((op, rest)) => (op, rest),
            None => (default_op, value),
        };
        self.and_filter_where(Condition::compare(column, op, rest))
    }

    /// Set the HAVING condition, replacing any previous one.
    pub fn having(mut self, condition: Condition) -> Self {
        self.having_condition = condition;
        self
    }

    pub fn and_having(mut self, condition: Condition) -> Self {
        self.having_condition = std::mem::take(&mut self.having_condition).and_with(condition);
        self
    }

    pub fn or_having(mut self, condition: Condition) -> Self {
        self.having_condition = std::mem::take(&mut self.having_condition).or_with(condition);
        self
    }

    pub fn filter_having(self, condition: Condition) -> Self {
        let filtered = filter_condition(condition);
        if filtered.is_none() {
            self
        } else {
            self.having(filtered)
        }
    }

    pub fn and_filter_having(self, condition: Condition) -> Self {
        let filtered = filter_condition(condition);
        if filtered.is_none() {
            self
        } else {
            self.and_having(filtered)
        }
    }

    pub fn or_filter_having(self, condition: Condition) -> Self {
        let filtered = filter_condition(condition);
        if filtered.is_none() {
            self
        } else {
            self.or_having(filtered)
        }
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    /// Set the ordering, replacing any previous one.
    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, OrderDirection)>,
        S: Into<String>,
    {
        self.order_by = columns
            .into_iter()
            .map(|(c, d)| (c.into(), d))
            .collect();
        self
    }

    pub fn add_order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: impl Into<Option<u64>>) -> Self {
        self.limit = limit.into();
        self
    }

    pub fn offset(mut self, offset: impl Into<Option<u64>>) -> Self {
        self.offset = offset.into();
        self
    }

    /// Append a UNION branch.
    pub fn union(mut self, query: Query, all: bool) -> Self {
        self.unions.push(UnionClause {
            query: Box::new(query),
            all,
        });
        self
    }

    /// Bind a named parameter referenced by raw fragments as `:name`.
    pub fn add_param(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Re-key `all()` results by a column value.
    pub fn index_by(mut self, column: impl Into<String>) -> Self {
        self.index_by = Some(IndexBy::Column(column.into()));
        self
    }

    /// Re-key `all()` results by a derived key.
    pub fn index_by_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Row) -> String + Send + Sync + 'static,
    {
        self.index_by = Some(IndexBy::Closure(Arc::new(f)));
        self
    }

    /// Enable result caching for this query, overriding the connection's
    /// cache scope.
    pub fn cache(mut self, duration: Option<Duration>, dependency: Option<String>) -> Self {
        self.cache_directive = Some(Some(QueryCacheDirective {
            duration,
            dependency,
        }));
        self
    }

    /// Disable result caching for this query even inside a cache scope.
    pub fn no_cache(mut self) -> Self {
        self.cache_directive = Some(None);
        self
    }

    pub fn get_where(&self) -> &Condition {
        &self.where_condition
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<u64> {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::HashValue;

    #[test]
    fn test_and_where_flattens_into_existing_and() {
        let q = Query::new()
            .where_(Condition::eq("a", 1))
            .and_where(Condition::eq("b", 2))
            .and_where(Condition::eq("c", 3));
        match q.where_condition {
            Condition::And(list) => assert_eq!(list.len(), 3),
            other => panic!("expected flat And, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_where_skips_fully_empty_condition() {
        let q = Query::new()
            .where_(Condition::eq("kept", 1))
            .and_filter_where(Condition::hash([
                ("a", HashValue::Value(DbValue::Null)),
                ("b", HashValue::Value(DbValue::String("  ".into()))),
            ]));
        // the empty filtered condition must not have been applied at all
        assert_eq!(q.where_condition, Condition::eq("kept", 1));
    }

    #[test]
    fn test_and_filter_compare_parses_operator() {
        let q = Query::new().and_filter_compare("age", ">=30", CompareOp::Eq);
        assert_eq!(
            q.where_condition,
            Condition::compare("age", CompareOp::Gte, "30")
        );
    }

    #[test]
    fn test_and_filter_compare_defaults_without_operator() {
        let q = Query::new().and_filter_compare("name", "ada", CompareOp::Eq);
        assert_eq!(
            q.where_condition,
            Condition::compare("name", CompareOp::Eq, "ada")
        );
    }

    #[test]
    fn test_and_filter_compare_drops_empty_value() {
        let q = Query::new().and_filter_compare("age", "", CompareOp::Eq);
        assert!(q.where_condition.is_none());
        let q = Query::new().and_filter_compare("age", ">=", CompareOp::Eq);
        assert!(q.where_condition.is_none());
    }

    #[test]
    fn test_query_is_reusable() {
        let q = Query::new().from("t").where_(Condition::eq("a", 1));
        let clone = q.clone();
        assert_eq!(format!("{:?}", q.where_condition), format!("{:?}", clone.where_condition));
    }
}
