//! PostgreSQL backend implementation
//!
//! The one shipped implementation of the driver capability set, built on
//! sqlx. Transaction primitives are issued as plain statements so the link
//! keeps full control of nesting (the transaction layer decides when a
//! savepoint is used instead of a native BEGIN).

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection as SqlxConnection, Row as SqlxRow, TypeInfo};

use super::core::{DatabaseDriver, DatabaseLink, ServerConfig, SqlDialect};
use crate::error::{OrmError, OrmResult};
use crate::row::{ColumnInfo, Row};
use crate::transaction::IsolationLevel;
use crate::value::DbValue;

/// PostgreSQL driver
#[derive(Debug, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

/// Validate the DSN shape before handing it to sqlx, so a malformed URL
/// surfaces as a configuration error rather than a connectivity one.
fn validate_dsn(dsn: &str) -> OrmResult<()> {
    let parsed = url::Url::parse(dsn)
        .map_err(|e| OrmError::Configuration(format!("invalid DSN '{}': {}", dsn, e)))?;
    if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
        return Err(OrmError::Configuration(format!(
            "unsupported DSN scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(OrmError::Configuration(format!(
            "DSN '{}' is missing a host",
            dsn
        )));
    }
    Ok(())
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    async fn connect(&self, config: &ServerConfig) -> OrmResult<Box<dyn DatabaseLink>> {
        validate_dsn(&config.dsn)?;
        let mut options = PgConnectOptions::from_str(&config.dsn)
            .map_err(|e| OrmError::Configuration(format!("invalid DSN '{}': {}", config.dsn, e)))?;

        if let Some(username) = &config.username {
            options = options.username(username);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(app_name) = config.options.get("application_name") {
            options = options.application_name(app_name);
        }

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| OrmError::Connection(format!("failed to connect to '{}': {}", config.dsn, e)))?;

        tracing::debug!(dsn = %config.dsn, "opened PostgreSQL link");
        Ok(Box::new(PostgresLink { conn: Some(conn) }))
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }
}

/// One physical PostgreSQL link
pub struct PostgresLink {
    conn: Option<PgConnection>,
}

impl PostgresLink {
    fn conn(&mut self) -> OrmResult<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| OrmError::Connection("link has been closed".to_string()))
    }
}

#[async_trait]
impl DatabaseLink for PostgresLink {
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<u64> {
        let conn = self.conn()?;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let result = query
            .execute(&mut *conn)
            .await
            .map_err(|e| OrmError::Database(format!("execution failed: {}", e)))?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>> {
        let conn = self.conn()?;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let pg_rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| OrmError::Database(format!("fetch failed: {}", e)))?;

        let Some(first) = pg_rows.first() else {
            return Ok(Vec::new());
        };
        let info = Arc::new(ColumnInfo::new(
            first.columns().iter().map(|c| c.name().to_string()).collect(),
        ));
        pg_rows
            .iter()
            .map(|row| decode_row(row, Arc::clone(&info)))
            .collect()
    }

    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> OrmResult<()> {
        self.execute("BEGIN", &[]).await?;
        if let Some(level) = isolation {
            let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
            if let Err(e) = self.execute(&sql, &[]).await {
                // leave no dangling transaction behind a failed SET
                let _ = self.execute("ROLLBACK", &[]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    async fn last_insert_id(&mut self, sequence: Option<&str>) -> OrmResult<DbValue> {
        let sql = match sequence {
            Some(seq) => format!("SELECT CURRVAL('{}')", seq.replace('\'', "''")),
            None => "SELECT LASTVAL()".to_string(),
        };
        let rows = self.fetch_all(&sql, &[]).await?;
        rows.first()
            .and_then(|r| r.get_at(0).cloned())
            .ok_or_else(|| OrmError::Database("no insert id available".to_string()))
    }

    async fn server_version(&mut self) -> OrmResult<String> {
        let rows = self.fetch_all("SHOW server_version", &[]).await?;
        rows.first()
            .and_then(|r| r.get_at(0))
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| OrmError::Database("server version not reported".to_string()))
    }

    async fn ping(&mut self) -> OrmResult<()> {
        self.conn()?
            .ping()
            .await
            .map_err(|e| OrmError::Connection(format!("ping failed: {}", e)))
    }

    async fn close(&mut self) -> OrmResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| OrmError::Connection(format!("close failed: {}", e)))?;
        }
        Ok(())
    }
}

/// Bind a DbValue to a sqlx query
fn bind_value<'a>(
    query: sqlx::query::Query<'a, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &DbValue,
) -> sqlx::query::Query<'a, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        DbValue::Null => query.bind(Option::<String>::None),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int32(i) => query.bind(*i),
        DbValue::Int64(i) => query.bind(*i),
        DbValue::Float32(f) => query.bind(*f),
        DbValue::Float64(f) => query.bind(*f),
        DbValue::String(s) => query.bind(s.clone()),
        DbValue::Bytes(b) => query.bind(b.clone()),
        DbValue::Uuid(u) => query.bind(*u),
        DbValue::DateTime(dt) => query.bind(*dt),
        DbValue::Date(d) => query.bind(*d),
        DbValue::Time(t) => query.bind(*t),
        DbValue::Json(j) => query.bind(j.clone()),
        // arrays are expanded by the query builder before binding
        DbValue::Array(arr) => query.bind(JsonValue::Array(arr.iter().map(DbValue::to_json).collect())),
    }
}

/// Decode one PgRow into a materialized Row
fn decode_row(row: &PgRow, info: Arc<ColumnInfo>) -> OrmResult<Row> {
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        values.push(decode_value(row, i, column.type_info().name())?);
    }
    Ok(Row::with_columns(info, values))
}

fn decode_value(row: &PgRow, index: usize, type_name: &str) -> OrmResult<DbValue> {
    let decode_err =
        |e: sqlx::Error| OrmError::Database(format!("failed to decode column {}: {}", index, e));

    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map_err(decode_err)?
            .map(|v| DbValue::Int32(i32::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Int32),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Int64),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Float32),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Float64),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Bytes),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Uuid),
        "TIMESTAMPTZ" | "TIMESTAMP" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::DateTime),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Date),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Time),
        "JSON" | "JSONB" => row
            .try_get::<Option<JsonValue>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::Json),
        _ => row
            .try_get::<Option<String>, _>(index)
            .map_err(decode_err)?
            .map(DbValue::String),
    };
    Ok(value.unwrap_or(DbValue::Null))
}
