//! Core database backend traits
//!
//! This module defines the capability set a backend must provide: opening a
//! physical link, executing parameterized statements, native transaction
//! primitives, and savepoint management. The query layer is written purely
//! against these traits so dialects plug in without touching the core.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::transaction::IsolationLevel;
use crate::value::DbValue;

/// Connection settings for a single physical server.
///
/// Master/slave pools are lists of these; the pool selection algorithm
/// treats the DSN as the node identity for dead-server tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Data source name, e.g. `postgres://host:5432/app`
    pub dsn: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Driver-specific connection attributes
    pub options: HashMap<String, String>,
}

impl ServerConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            username: None,
            password: None,
            options: HashMap::new(),
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Fill unset fields from a shared pool template.
    pub fn merge_defaults(mut self, template: &ServerConfig) -> Self {
        if self.username.is_none() {
            self.username = template.username.clone();
        }
        if self.password.is_none() {
            self.password = template.password.clone();
        }
        for (k, v) in &template.options {
            self.options.entry(k.clone()).or_insert_with(|| v.clone());
        }
        self
    }

    /// Whether the DSN names an in-memory store.
    ///
    /// In-memory stores are the one case where a forked connection keeps
    /// reaching the same data: the driver resolves the same DSN to the same
    /// backing store.
    pub fn is_memory(&self) -> bool {
        self.dsn.contains(":memory:")
    }
}

/// SQL dialect rules consulted during compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder for the given zero-based index.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect.
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => '"',
            SqlDialect::MySQL => '`',
        }
    }

    /// Quote a simple identifier.
    ///
    /// Names that already carry quotes, a `*`, or parentheses (expressions)
    /// pass through untouched. Dotted names are quoted per segment.
    pub fn quote_identifier(&self, name: &str) -> String {
        let q = self.identifier_quote();
        if name.contains(q) || name.contains('(') || name.contains('*') || name.contains(' ') {
            return name.to_string();
        }
        name.split('.')
            .map(|part| format!("{q}{part}{q}"))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Wrap a compiled SELECT in the dialect's boolean-existence form.
    pub fn exists_sql(&self, inner: &str) -> String {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::MySQL => {
                format!("SELECT EXISTS({})", inner)
            }
            SqlDialect::SQLite => format!("SELECT EXISTS({})", inner),
        }
    }
}

/// A backend able to open physical links.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Open a physical link to the given server.
    async fn connect(&self, config: &ServerConfig) -> OrmResult<Box<dyn DatabaseLink>>;

    /// The SQL dialect this driver speaks.
    fn dialect(&self) -> SqlDialect;
}

/// One physical database link.
///
/// All methods take `&mut self`: a link is exclusively owned by one
/// `Connection` and never shared between logical operations.
#[async_trait]
pub trait DatabaseLink: Send + Sync {
    /// Execute a statement and return the affected row count.
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<u64>;

    /// Execute a query and return the result rows.
    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>>;

    /// Start a native transaction, optionally at the given isolation level.
    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> OrmResult<()>;

    /// Commit the native transaction.
    async fn commit(&mut self) -> OrmResult<()>;

    /// Roll back the native transaction.
    async fn rollback(&mut self) -> OrmResult<()>;

    /// Whether this link supports savepoints.
    fn supports_savepoints(&self) -> bool {
        true
    }

    /// Create a named savepoint.
    async fn create_savepoint(&mut self, name: &str) -> OrmResult<()> {
        self.execute(&format!("SAVEPOINT {}", name), &[]).await?;
        Ok(())
    }

    /// Release a named savepoint.
    async fn release_savepoint(&mut self, name: &str) -> OrmResult<()> {
        self.execute(&format!("RELEASE SAVEPOINT {}", name), &[])
            .await?;
        Ok(())
    }

    /// Roll back to a named savepoint.
    async fn rollback_to_savepoint(&mut self, name: &str) -> OrmResult<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", name), &[])
            .await?;
        Ok(())
    }

    /// The id generated by the last INSERT, optionally for a named sequence.
    async fn last_insert_id(&mut self, sequence: Option<&str>) -> OrmResult<DbValue>;

    /// The server version string, used for capability checks.
    async fn server_version(&mut self) -> OrmResult<String> {
        Err(OrmError::Database(
            "server version not reported by this backend".to_string(),
        ))
    }

    /// Cheap liveness probe.
    async fn ping(&mut self) -> OrmResult<()>;

    /// Close the link.
    async fn close(&mut self) -> OrmResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_styles() {
        assert_eq!(SqlDialect::PostgreSQL.placeholder(0), "$1");
        assert_eq!(SqlDialect::PostgreSQL.placeholder(2), "$3");
        assert_eq!(SqlDialect::MySQL.placeholder(5), "?");
        assert_eq!(SqlDialect::SQLite.placeholder(0), "?");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(SqlDialect::PostgreSQL.quote_identifier("name"), "\"name\"");
        assert_eq!(SqlDialect::MySQL.quote_identifier("name"), "`name`");
        assert_eq!(
            SqlDialect::PostgreSQL.quote_identifier("public.users"),
            "\"public\".\"users\""
        );
        // expressions and stars pass through
        assert_eq!(SqlDialect::PostgreSQL.quote_identifier("COUNT(*)"), "COUNT(*)");
        assert_eq!(SqlDialect::PostgreSQL.quote_identifier("*"), "*");
    }

    #[test]
    fn test_merge_defaults() {
        let template = ServerConfig::new("ignored").with_credentials("app", "secret");
        let node = ServerConfig::new("postgres://replica-1/app").merge_defaults(&template);
        assert_eq!(node.username.as_deref(), Some("app"));
        assert_eq!(node.password.as_deref(), Some("secret"));
        let explicit = ServerConfig::new("postgres://replica-2/app")
            .with_credentials("ro", "pw")
            .merge_defaults(&template);
        assert_eq!(explicit.username.as_deref(), Some("ro"));
    }
}
