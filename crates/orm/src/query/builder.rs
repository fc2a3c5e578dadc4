//! Query compilation
//!
//! Turns a `Query` plus its condition trees into one parameterized SQL
//! string and a positional parameter list. The builder is pure: the same
//! query compiles to the same SQL and parameters every time.

use crate::backends::SqlDialect;
use crate::conditions::{Condition, HashValue};
use crate::error::{OrmError, OrmResult};
use crate::value::DbValue;

use super::select::Query;
use super::types::TableRef;

/// Right-hand side of an UPDATE SET entry.
#[derive(Debug, Clone)]
pub enum SetExpr {
    /// A bound value
    Value(DbValue),
    /// A raw SQL expression, spliced verbatim (e.g. `"views" + 1`)
    Expr(String),
}

/// Compiles queries and conditions for one SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    dialect: SqlDialect,
}

impl QueryBuilder {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Compile a SELECT query.
    pub fn build(&self, query: &Query) -> OrmResult<(String, Vec<DbValue>)> {
        let mut params = Vec::new();
        let sql = self.build_with_params(query, &mut params)?;
        Ok((sql, params))
    }

    /// Compile a query wrapped in the dialect's boolean-existence form.
    pub fn build_exists(&self, query: &Query) -> OrmResult<(String, Vec<DbValue>)> {
        let (inner, params) = self.build(query)?;
        Ok((self.dialect.exists_sql(&inner), params))
    }

    /// Compile an aggregate over a query.
    ///
    /// A plain query has its select list replaced by the aggregate
    /// expression (order/limit/offset reset). When DISTINCT, GROUP BY,
    /// HAVING, or UNION are present, replacing the select list would change
    /// the result, so the whole query is wrapped as a derived table aliased
    /// `c` and the aggregate applies to that.
    pub fn build_aggregate(&self, query: &Query, expr: &str) -> OrmResult<(String, Vec<DbValue>)> {
        let wrap = query.distinct
            || !query.group_by.is_empty()
            || !query.having_condition.is_none()
            || !query.unions.is_empty();
        if !wrap {
            let mut inner = query.clone();
            inner.select = vec![expr.to_string()];
            inner.order_by.clear();
            inner.limit = None;
            inner.offset = None;
            inner.index_by = None;
            return self.build(&inner);
        }
        let (inner_sql, params) = self.build(query)?;
        let alias = self.dialect.quote_identifier("c");
        Ok((
            format!("SELECT {} FROM ({}) {}", expr, inner_sql, alias),
            params,
        ))
    }

    /// Compile an INSERT for explicit column/value pairs.
    pub fn insert(&self, table: &str, columns: &[(String, DbValue)]) -> (String, Vec<DbValue>) {
        let table = self.dialect.quote_identifier(table);
        if columns.is_empty() {
            return (format!("INSERT INTO {} DEFAULT VALUES", table), Vec::new());
        }
        let mut params = Vec::new();
        let names: Vec<String> = columns
            .iter()
            .map(|(name, _)| self.dialect.quote_identifier(name))
            .collect();
        let placeholders: Vec<String> = columns
            .iter()
            .map(|(_, value)| self.push_param(&mut params, value.clone()))
            .collect();
        (
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                names.join(", "),
                placeholders.join(", ")
            ),
            params,
        )
    }

    /// Compile an UPDATE.
    pub fn update(
        &self,
        table: &str,
        sets: &[(String, SetExpr)],
        condition: &Condition,
    ) -> OrmResult<(String, Vec<DbValue>)> {
        if sets.is_empty() {
            return Err(OrmError::Query("UPDATE with no columns to set".to_string()));
        }
        let mut params = Vec::new();
        let assignments: Vec<String> = sets
            .iter()
            .map(|(name, expr)| {
                let column = self.dialect.quote_identifier(name);
                match expr {
                    SetExpr::Value(value) => {
                        format!("{} = {}", column, self.push_param(&mut params, value.clone()))
                    }
                    SetExpr::Expr(raw) => format!("{} = {}", column, raw),
                }
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote_identifier(table),
            assignments.join(", ")
        );
        let where_sql = self.compile_condition(condition, &[], &mut params)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        Ok((sql, params))
    }

    /// Compile a DELETE.
    pub fn delete(&self, table: &str, condition: &Condition) -> OrmResult<(String, Vec<DbValue>)> {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.dialect.quote_identifier(table));
        let where_sql = self.compile_condition(condition, &[], &mut params)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        Ok((sql, params))
    }

    fn build_with_params(&self, query: &Query, params: &mut Vec<DbValue>) -> OrmResult<String> {
        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        if query.select.is_empty() {
            sql.push('*');
        } else {
            let items: Vec<String> = query
                .select
                .iter()
                .map(|item| self.quote_select_item(item))
                .collect();
            sql.push_str(&items.join(", "));
        }

        if !query.from.is_empty() {
            sql.push_str(" FROM ");
            let tables: OrmResult<Vec<String>> = query
                .from
                .iter()
                .map(|t| self.quote_table_ref(t, params))
                .collect();
            sql.push_str(&tables?.join(", "));
        }

        for join in &query.joins {
            sql.push(' ');
            sql.push_str(&join.join_type.to_string());
            sql.push(' ');
            sql.push_str(&self.quote_table_ref(&join.table, params)?);
            let on_sql = self.compile_condition(&join.on, &query.params, params)?;
            if !on_sql.is_empty() {
                sql.push_str(" ON ");
                sql.push_str(&on_sql);
            }
        }

        let where_sql = self.compile_condition(&query.where_condition, &query.params, params)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if !query.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            let columns: Vec<String> = query
                .group_by
                .iter()
                .map(|c| self.dialect.quote_identifier(c))
                .collect();
            sql.push_str(&columns.join(", "));
        }

        let having_sql = self.compile_condition(&query.having_condition, &query.params, params)?;
        if !having_sql.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&having_sql);
        }

        if !query.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let clauses: Vec<String> = query
                .order_by
                .iter()
                .map(|(column, direction)| {
                    format!("{} {}", self.dialect.quote_identifier(column), direction)
                })
                .collect();
            sql.push_str(&clauses.join(", "));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        if !query.unions.is_empty() {
            sql = format!("( {} )", sql);
            for union in &query.unions {
                let inner = self.build_with_params(&union.query, params)?;
                sql.push_str(if union.all { " UNION ALL " } else { " UNION " });
                sql.push_str(&format!("( {} )", inner));
            }
        }

        Ok(sql)
    }

    /// Compile a condition tree. An empty result means "no condition";
    /// callers must skip the clause entirely.
    pub(crate) fn compile_condition(
        &self,
        condition: &Condition,
        query_params: &[(String, DbValue)],
        params: &mut Vec<DbValue>,
    ) -> OrmResult<String> {
        match condition {
            Condition::None => Ok(String::new()),
            Condition::Hash(pairs) => {
                let parts: OrmResult<Vec<String>> = pairs
                    .iter()
                    .map(|(column, value)| self.compile_hash_entry(column, value, params))
                    .collect();
                Ok(parts?.join(" AND "))
            }
            Condition::And(children) => self.compile_list(children, " AND ", query_params, params),
            Condition::Or(children) => self.compile_list(children, " OR ", query_params, params),
            Condition::Not(inner) => {
                let inner_sql = self.compile_condition(inner, query_params, params)?;
                if inner_sql.is_empty() {
                    Ok(String::new())
                } else {
                    Ok(format!("NOT ({})", inner_sql))
                }
            }
            Condition::Compare { column, op, value } => Ok(format!(
                "{} {} {}",
                self.dialect.quote_identifier(column),
                op.as_sql(),
                self.push_param(params, value.clone())
            )),
            Condition::In {
                columns,
                values,
                negated,
            } => self.compile_in(columns, values, *negated, params),
            Condition::Between {
                column,
                low,
                high,
                negated,
            } => Ok(format!(
                "{} {}BETWEEN {} AND {}",
                self.dialect.quote_identifier(column),
                if *negated { "NOT " } else { "" },
                self.push_param(params, low.clone()),
                self.push_param(params, high.clone())
            )),
            Condition::Like {
                column,
                pattern,
                negated,
            } => Ok(format!(
                "{} {}LIKE {}",
                self.dialect.quote_identifier(column),
                if *negated { "NOT " } else { "" },
                self.push_param(params, DbValue::String(pattern.clone()))
            )),
            Condition::Raw {
                sql,
                params: raw_params,
            } => self.compile_raw(sql, raw_params, query_params, params),
        }
    }

    fn compile_hash_entry(
        &self,
        column: &str,
        value: &HashValue,
        params: &mut Vec<DbValue>,
    ) -> OrmResult<String> {
        let quoted = self.dialect.quote_identifier(column);
        match value {
            HashValue::Value(DbValue::Null) => Ok(format!("{} IS NULL", quoted)),
            HashValue::Value(v) => Ok(format!(
                "{} = {}",
                quoted,
                self.push_param(params, v.clone())
            )),
            HashValue::List(items) => {
                if items.is_empty() {
                    return Ok("0=1".to_string());
                }
                let placeholders: Vec<String> = items
                    .iter()
                    .map(|v| self.push_param(params, v.clone()))
                    .collect();
                Ok(format!("{} IN ({})", quoted, placeholders.join(", ")))
            }
        }
    }

    fn compile_list(
        &self,
        children: &[Condition],
        separator: &str,
        query_params: &[(String, DbValue)],
        params: &mut Vec<DbValue>,
    ) -> OrmResult<String> {
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            let sql = self.compile_condition(child, query_params, params)?;
            if !sql.is_empty() {
                parts.push(sql);
            }
        }
        match parts.len() {
            0 => Ok(String::new()),
            1 => Ok(parts.remove(0)),
            _ => Ok(parts
                .iter()
                .map(|p| format!("({})", p))
                .collect::<Vec<_>>()
                .join(separator)),
        }
    }

    fn compile_in(
        &self,
        columns: &[String],
        values: &[Vec<DbValue>],
        negated: bool,
        params: &mut Vec<DbValue>,
    ) -> OrmResult<String> {
        if values.is_empty() {
            // IN over nothing matches nothing; NOT IN over nothing matches all
            return Ok(if negated { "1=1" } else { "0=1" }.to_string());
        }
        if columns.len() == 1 {
            let quoted = self.dialect.quote_identifier(&columns[0]);
            let placeholders: Vec<String> = values
                .iter()
                .map(|tuple| {
                    let value = tuple.first().cloned().unwrap_or(DbValue::Null);
                    self.push_param(params, value)
                })
                .collect();
            return Ok(format!(
                "{} {}IN ({})",
                quoted,
                if negated { "NOT " } else { "" },
                placeholders.join(", ")
            ));
        }
        // composite tuples compile to the portable OR-of-ANDs form
        let mut groups = Vec::with_capacity(values.len());
        for tuple in values {
            if tuple.len() != columns.len() {
                return Err(OrmError::Query(format!(
                    "IN tuple arity {} does not match column count {}",
                    tuple.len(),
                    columns.len()
                )));
            }
            let pairs: Vec<String> = columns
                .iter()
                .zip(tuple.iter())
                .map(|(column, value)| {
                    let quoted = self.dialect.quote_identifier(column);
                    if value.is_null() {
                        format!("{} IS NULL", quoted)
                    } else {
                        format!("{} = {}", quoted, self.push_param(params, value.clone()))
                    }
                })
                .collect();
            groups.push(format!("({})", pairs.join(" AND ")));
        }
        let joined = groups.join(" OR ");
        Ok(if negated {
            format!("NOT ({})", joined)
        } else {
            joined
        })
    }

    fn compile_raw(
        &self,
        sql: &str,
        raw_params: &[(String, DbValue)],
        query_params: &[(String, DbValue)],
        params: &mut Vec<DbValue>,
    ) -> OrmResult<String> {
        let mut out = String::with_capacity(sql.len());
        let mut chars = sql.chars().peekable();
        while let Some(c) = chars.next() {
            if c != ':' {
                out.push(c);
                continue;
            }
            // `::` is a cast, not a parameter
            if chars.peek() == Some(&':') {
                out.push_str("::");
                chars.next();
                continue;
            }
            let mut name = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push(':');
                continue;
            }
            let value = raw_params
                .iter()
                .chain(query_params.iter())
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| OrmError::Query(format!("missing value for parameter :{}", name)))?;
            out.push_str(&self.push_param(params, value));
        }
        Ok(out)
    }

    fn push_param(&self, params: &mut Vec<DbValue>, value: DbValue) -> String {
        let placeholder = self.dialect.placeholder(params.len());
        params.push(value);
        placeholder
    }

    fn quote_select_item(&self, item: &str) -> String {
        if item.contains('(') || item.contains('*') || item.contains(self.dialect.identifier_quote())
        {
            return item.to_string();
        }
        if let Some((expr, alias)) = split_alias(item) {
            return format!(
                "{} AS {}",
                self.dialect.quote_identifier(expr),
                self.dialect.quote_identifier(alias)
            );
        }
        self.dialect.quote_identifier(item)
    }

    fn quote_table_ref(&self, table: &TableRef, params: &mut Vec<DbValue>) -> OrmResult<String> {
        match table {
            TableRef::Named { table, alias } => {
                let quoted = self.dialect.quote_identifier(table);
                Ok(match alias {
                    Some(alias) => format!("{} AS {}", quoted, self.dialect.quote_identifier(alias)),
                    None => quoted,
                })
            }
            TableRef::SubQuery { query, alias } => {
                let inner = self.build_with_params(query, params)?;
                Ok(format!(
                    "({}) AS {}",
                    inner,
                    self.dialect.quote_identifier(alias)
                ))
            }
        }
    }
}

fn split_alias(item: &str) -> Option<(&str, &str)> {
    for sep in [" AS ", " as "] {
        if let Some(pos) = item.find(sep) {
            return Some((&item[..pos], &item[pos + sep.len()..]));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::CompareOp;
    use crate::query::types::OrderDirection;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(SqlDialect::PostgreSQL)
    }

    #[test]
    fn test_null_hash_value_compiles_to_is_null() {
        let q = Query::new()
            .from("t")
            .where_(Condition::hash([("status", DbValue::Null)]));
        let (sql, params) = builder().build(&q).unwrap();
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE \"status\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_hash_list_compiles_to_in() {
        let q = Query::new().from("t").where_(Condition::hash([(
            "id",
            crate::conditions::HashValue::List(vec![DbValue::Int32(1), DbValue::Int32(2)]),
        )]));
        let (sql, params) = builder().build(&q).unwrap();
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE \"id\" IN ($1, $2)");
        assert_eq!(params, vec![DbValue::Int32(1), DbValue::Int32(2)]);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let q = Query::new()
            .from("t")
            .where_(Condition::in_column("id", Vec::<i32>::new()));
        let (sql, _) = builder().build(&q).unwrap();
        assert!(sql.ends_with("WHERE 0=1"));
    }

    #[test]
    fn test_and_or_wrapping() {
        let q = Query::new().from("t").where_(
            Condition::eq("a", 1).and_with(Condition::eq("b", 2).or_with(Condition::eq("c", 3))),
        );
        let (sql, params) = builder().build(&q).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"t\" WHERE (\"a\" = $1) AND ((\"b\" = $2) OR (\"c\" = $3))"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_compare_operators() {
        let q = Query::new()
            .from("t")
            .where_(Condition::compare("age", CompareOp::Gte, 18));
        let (sql, _) = builder().build(&q).unwrap();
        assert!(sql.contains("\"age\" >= $1"));
    }

    #[test]
    fn test_between_and_like() {
        let q = Query::new().from("t").where_(
            Condition::between("age", 18, 65).and_with(Condition::like("name", "a%")),
        );
        let (sql, params) = builder().build(&q).unwrap();
        assert!(sql.contains("\"age\" BETWEEN $1 AND $2"));
        assert!(sql.contains("\"name\" LIKE $3"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_composite_in_tuples() {
        let q = Query::new().from("t").where_(Condition::in_tuples(
            vec!["a".to_string(), "b".to_string()],
            vec![
                vec![DbValue::Int32(1), DbValue::Int32(2)],
                vec![DbValue::Int32(3), DbValue::Int32(4)],
            ],
        ));
        let (sql, params) = builder().build(&q).unwrap();
        assert!(sql.contains("(\"a\" = $1 AND \"b\" = $2) OR (\"a\" = $3 AND \"b\" = $4)"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_raw_named_params_and_casts() {
        let q = Query::new().from("t").where_(Condition::raw_with_params(
            "created_at > :cutoff::timestamptz",
            [("cutoff", "2024-01-01")],
        ));
        let (sql, params) = builder().build(&q).unwrap();
        assert!(sql.contains("created_at > $1::timestamptz"));
        assert_eq!(params, vec![DbValue::String("2024-01-01".to_string())]);
    }

    #[test]
    fn test_raw_missing_param_errors() {
        let q = Query::new().from("t").where_(Condition::raw("a = :missing"));
        assert!(builder().build(&q).is_err());
    }

    #[test]
    fn test_query_level_params_reach_raw_fragments() {
        let q = Query::new()
            .from("t")
            .where_(Condition::raw("a = :bound"))
            .add_param("bound", 7);
        let (sql, params) = builder().build(&q).unwrap();
        assert!(sql.contains("a = $1"));
        assert_eq!(params, vec![DbValue::Int32(7)]);
    }

    #[test]
    fn test_full_select_assembly() {
        let q = Query::new()
            .select(["id", "name AS label"])
            .distinct(true)
            .from_as("users", "u")
            .left_join("profiles", Condition::raw("profiles.user_id = u.id"))
            .where_(Condition::eq("active", true))
            .group_by(["id"])
            .having(Condition::raw("COUNT(*) > 1"))
            .order_by([("name".to_string(), OrderDirection::Desc)])
            .limit(10)
            .offset(5);
        let (sql, _) = builder().build(&q).unwrap();
        assert!(sql.starts_with("SELECT DISTINCT \"id\", \"name\" AS \"label\" FROM \"users\" AS \"u\""));
        assert!(sql.contains("LEFT JOIN \"profiles\" ON profiles.user_id = u.id"));
        assert!(sql.contains("WHERE \"active\" = $1"));
        assert!(sql.contains("GROUP BY \"id\""));
        assert!(sql.contains("HAVING COUNT(*) > 1"));
        assert!(sql.contains("ORDER BY \"name\" DESC"));
        assert!(sql.ends_with("LIMIT 10 OFFSET 5"));
    }

    #[test]
    fn test_union_wraps_branches() {
        let q = Query::new()
            .from("a")
            .union(Query::new().from("b"), false)
            .union(Query::new().from("c"), true);
        let (sql, _) = builder().build(&q).unwrap();
        assert_eq!(
            sql,
            "( SELECT * FROM \"a\" ) UNION ( SELECT * FROM \"b\" ) UNION ALL ( SELECT * FROM \"c\" )"
        );
    }

    #[test]
    fn test_aggregate_plain_replaces_select() {
        let q = Query::new()
            .select(["id"])
            .from("t")
            .where_(Condition::eq("a", 1))
            .order_by([("id".to_string(), OrderDirection::Asc)])
            .limit(5);
        let (sql, params) = builder().build_aggregate(&q, "COUNT(*)").unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM \"t\" WHERE \"a\" = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_aggregate_grouped_wraps_subquery() {
        let q = Query::new()
            .select(["kind"])
            .from("t")
            .group_by(["kind"]);
        let (sql, _) = builder().build_aggregate(&q, "COUNT(*)").unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM (SELECT \"kind\" FROM \"t\" GROUP BY \"kind\") \"c\""
        );
    }

    #[test]
    fn test_aggregate_distinct_wraps_subquery() {
        let q = Query::new().select(["kind"]).distinct(true).from("t");
        let (sql, _) = builder().build_aggregate(&q, "COUNT(*)").unwrap();
        assert!(sql.starts_with("SELECT COUNT(*) FROM (SELECT DISTINCT"));
    }

    #[test]
    fn test_exists_wrapper() {
        let q = Query::new().from("t").where_(Condition::eq("a", 1));
        let (sql, _) = builder().build_exists(&q).unwrap();
        assert_eq!(sql, "SELECT EXISTS(SELECT * FROM \"t\" WHERE \"a\" = $1)");
    }

    #[test]
    fn test_insert_update_delete() {
        let b = builder();
        let (sql, params) = b.insert(
            "users",
            &[
                ("name".to_string(), DbValue::String("ada".into())),
                ("age".to_string(), DbValue::Int32(36)),
            ],
        );
        assert_eq!(sql, "INSERT INTO \"users\" (\"name\", \"age\") VALUES ($1, $2)");
        assert_eq!(params.len(), 2);

        let (sql, params) = b
            .update(
                "users",
                &[
                    ("age".to_string(), SetExpr::Value(DbValue::Int32(37))),
                    ("visits".to_string(), SetExpr::Expr("\"visits\" + 1".into())),
                ],
                &Condition::eq("id", 1),
            )
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE \"users\" SET \"age\" = $1, \"visits\" = \"visits\" + 1 WHERE \"id\" = $2"
        );
        assert_eq!(params.len(), 2);

        let (sql, _) = b.delete("users", &Condition::eq("id", 1)).unwrap();
        assert_eq!(sql, "DELETE FROM \"users\" WHERE \"id\" = $1");
    }

    #[test]
    fn test_subquery_from() {
        let inner = Query::new().from("orders").where_(Condition::eq("paid", true));
        let q = Query::new().from_subquery(inner, "paid_orders");
        let (sql, params) = builder().build(&q).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT * FROM \"orders\" WHERE \"paid\" = $1) AS \"paid_orders\""
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_compilation_is_pure() {
        let q = Query::new().from("t").where_(Condition::eq("a", 1)).limit(3);
        let first = builder().build(&q).unwrap();
        let second = builder().build(&q).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mysql_placeholders() {
        let b = QueryBuilder::new(SqlDialect::MySQL);
        let q = Query::new().from("t").where_(Condition::eq("a", 1));
        let (sql, _) = b.build(&q).unwrap();
        assert_eq!(sql, "SELECT * FROM `t` WHERE `a` = ?");
    }
}
