//! Commands - parameterized statements bound to a connection
//!
//! A command carries the compiled SQL and its parameters, routes execution
//! (writes to the master, plain reads to a slave when possible), and
//! consults the query-result cache for reads.

use tracing::debug;

use crate::connection::Connection;
use crate::error::OrmResult;
use crate::query::QueryCacheDirective;
use crate::row::{rows_from_json, rows_to_json, Row};
use crate::value::DbValue;

/// One executable statement.
pub struct Command {
    conn: Connection,
    sql: String,
    params: Vec<DbValue>,
    pub(crate) cache_override: Option<Option<QueryCacheDirective>>,
}

impl Command {
    pub(crate) fn new(conn: Connection, sql: String, params: Vec<DbValue>) -> Self {
        Self {
            conn,
            sql,
            params,
            cache_override: None,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[DbValue] {
        &self.params
    }

    /// Cache this command's result, overriding the connection's scope.
    pub fn cache(mut self, directive: QueryCacheDirective) -> Self {
        self.cache_override = Some(Some(directive));
        self
    }

    /// Never cache this command's result.
    pub fn no_cache(mut self) -> Self {
        self.cache_override = Some(None);
        self
    }

    /// Execute a write statement and return the affected row count.
    /// Always runs on the master.
    pub async fn execute(&self) -> OrmResult<u64> {
        debug!(sql = %self.sql, "executing statement");
        self.conn.execute_sql(&self.sql, &self.params).await
    }

    /// Run the query and return all rows.
    pub async fn query_all(&self) -> OrmResult<Vec<Row>> {
        let directive = self.conn.resolve_cache_directive(&self.cache_override).await;

        let cache_key = directive.as_ref().map(|_| {
            let cache = self.conn.cache_backend();
            let params_json = serde_json::to_string(
                &self.params.iter().map(DbValue::to_json).collect::<Vec<_>>(),
            )
            .unwrap_or_default();
            cache.build_key(&[
                "query",
                &self.conn.config().server.dsn,
                &self.sql,
                &params_json,
            ])
        });

        if let Some(key) = &cache_key {
            if let Some(cached) = self.conn.cache_backend().get(key) {
                debug!(sql = %self.sql, "query served from cache");
                return rows_from_json(&cached);
            }
        }

        debug!(sql = %self.sql, "querying");
        let rows = self.conn.fetch_sql(&self.sql, &self.params, true).await?;

        if let (Some(key), Some(directive)) = (cache_key, directive) {
            let cache = self.conn.cache_backend();
            let encoded = rows_to_json(&rows);
            match &directive.dependency {
                Some(tag) => cache.set_with_tag(&key, encoded, directive.duration, tag),
                None => cache.set(&key, encoded, directive.duration),
            }
        }
        Ok(rows)
    }

    /// Run the query and return the first row, if any.
    ///
    /// No LIMIT is injected: callers querying by unique key get exactly the
    /// semantics they asked for. Pair with an explicit `limit(1)` on the
    /// query when the predicate can match many rows.
    pub async fn query_one(&self) -> OrmResult<Option<Row>> {
        let rows = self.query_all().await?;
        Ok(rows.into_iter().next())
    }

    /// Run the query and return the first column of the first row, if any.
    pub async fn query_scalar(&self) -> OrmResult<Option<DbValue>> {
        Ok(self
            .query_one()
            .await?
            .and_then(|row| row.get_at(0).cloned()))
    }

    /// Run the query and return the first column of every row.
    pub async fn query_column(&self) -> OrmResult<Vec<DbValue>> {
        let rows = self.query_all().await?;
        Ok(rows
            .into_iter()
            .map(|row| row.get_at(0).cloned().unwrap_or(DbValue::Null))
            .collect())
    }
}
