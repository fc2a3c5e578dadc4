//! Query terminal operations
//!
//! Everything that actually touches a connection: row retrieval, scalars,
//! aggregates, and existence checks. Compilation is delegated to the
//! connection's query builder; routing and caching to the command layer.

use indexmap::IndexMap;

use crate::command::Command;
use crate::connection::Connection;
use crate::error::OrmResult;
use crate::row::Row;
use crate::value::DbValue;

use super::batch::BatchQuery;
use super::select::Query;

/// Results of `Query::all`.
///
/// With `index_by` set the result is a map keyed by the extracted or
/// derived key (insertion-ordered); the shape changes, not just the order.
#[derive(Debug, Clone)]
pub enum QueryResults {
    Rows(Vec<Row>),
    Indexed(IndexMap<String, Row>),
}

impl QueryResults {
    pub fn len(&self) -> usize {
        match self {
            QueryResults::Rows(rows) => rows.len(),
            QueryResults::Indexed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The rows in result order, discarding any index keys.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryResults::Rows(rows) => rows,
            QueryResults::Indexed(map) => map.into_values().collect(),
        }
    }
}

impl Query {
    /// Compile this query into a command on the given connection.
    pub fn create_command(&self, conn: &Connection) -> OrmResult<Command> {
        let (sql, params) = conn.query_builder().build(self)?;
        let mut command = conn.create_command(sql, params);
        command.cache_override = self.cache_directive.clone();
        Ok(command)
    }

    /// Execute and return every row, re-keyed when `index_by` is set.
    pub async fn all(&self, conn: &Connection) -> OrmResult<QueryResults> {
        let rows = self.create_command(conn)?.query_all().await?;
        Ok(match &self.index_by {
            None => QueryResults::Rows(rows),
            Some(index_by) => {
                let mut map = IndexMap::with_capacity(rows.len());
                for row in rows {
                    map.insert(index_by.key_for(&row), row);
                }
                QueryResults::Indexed(map)
            }
        })
    }

    /// Execute and return the first row, or `None`.
    ///
    /// Deliberately adds no implicit `LIMIT 1`: when the query is by a
    /// unique key the limit is pointless, and callers relying on the
    /// documented contract must not see their SQL change underneath them.
    /// For predicates that can match many rows this is a performance trap;
    /// add `limit(1)` explicitly.
    pub async fn one(&self, conn: &Connection) -> OrmResult<Option<Row>> {
        self.create_command(conn)?.query_one().await
    }

    /// Execute and return the first column of the first row, or `None`.
    pub async fn scalar(&self, conn: &Connection) -> OrmResult<Option<DbValue>> {
        self.create_command(conn)?.query_scalar().await
    }

    /// Execute and return the first column of every row.
    pub async fn column(&self, conn: &Connection) -> OrmResult<Vec<DbValue>> {
        self.create_command(conn)?.query_column().await
    }

    /// COUNT over this query.
    pub async fn count(&self, conn: &Connection) -> OrmResult<i64> {
        let value = self.aggregate(conn, "COUNT(*)").await?;
        Ok(value.and_then(|v| v.as_i64()).unwrap_or(0))
    }

    /// SUM of a column over this query.
    pub async fn sum(&self, conn: &Connection, column: &str) -> OrmResult<Option<DbValue>> {
        self.aggregate(conn, &format!("SUM({})", conn.dialect().quote_identifier(column)))
            .await
    }

    /// AVG of a column over this query.
    pub async fn average(&self, conn: &Connection, column: &str) -> OrmResult<Option<DbValue>> {
        self.aggregate(conn, &format!("AVG({})", conn.dialect().quote_identifier(column)))
            .await
    }

    /// MIN of a column over this query.
    pub async fn min(&self, conn: &Connection, column: &str) -> OrmResult<Option<DbValue>> {
        self.aggregate(conn, &format!("MIN({})", conn.dialect().quote_identifier(column)))
            .await
    }

    /// MAX of a column over this query.
    pub async fn max(&self, conn: &Connection, column: &str) -> OrmResult<Option<DbValue>> {
        self.aggregate(conn, &format!("MAX({})", conn.dialect().quote_identifier(column)))
            .await
    }

    async fn aggregate(&self, conn: &Connection, expr: &str) -> OrmResult<Option<DbValue>> {
        let (sql, params) = conn.query_builder().build_aggregate(self, expr)?;
        let mut command = conn.create_command(sql, params);
        command.cache_override = self.cache_directive.clone();
        command.query_scalar().await
    }

    /// Whether this query matches at least one row.
    pub async fn exists(&self, conn: &Connection) -> OrmResult<bool> {
        let (sql, params) = conn.query_builder().build_exists(self)?;
        let value = conn.create_command(sql, params).query_scalar().await?;
        Ok(matches!(
            value,
            Some(DbValue::Bool(true)) | Some(DbValue::Int32(1)) | Some(DbValue::Int64(1))
        ))
    }

    /// Iterate the result set in chunks of `batch_size` rows.
    pub fn batch(&self, conn: &Connection, batch_size: u64) -> BatchQuery {
        BatchQuery::new(self.clone(), conn.clone(), batch_size)
    }
}
