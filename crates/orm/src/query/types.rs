//! Query types - supporting types for the fluent query model

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::conditions::Condition;
use crate::row::Row;

use super::select::Query;

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
            JoinType::Full => write!(f, "FULL JOIN"),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// A source table: a named table (optionally aliased) or a derived table.
#[derive(Debug, Clone)]
pub enum TableRef {
    Named {
        table: String,
        alias: Option<String>,
    },
    SubQuery {
        query: Box<Query>,
        alias: String,
    },
}

impl TableRef {
    pub fn named(table: impl Into<String>) -> Self {
        TableRef::Named {
            table: table.into(),
            alias: None,
        }
    }

    pub fn aliased(table: impl Into<String>, alias: impl Into<String>) -> Self {
        TableRef::Named {
            table: table.into(),
            alias: Some(alias.into()),
        }
    }
}

/// One join clause
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Condition,
}

/// One UNION branch
#[derive(Debug, Clone)]
pub struct UnionClause {
    pub query: Box<Query>,
    pub all: bool,
}

/// Result re-keying specification.
///
/// A column name extracts the key from each row; a closure derives it.
#[derive(Clone)]
pub enum IndexBy {
    Column(String),
    Closure(Arc<dyn Fn(&Row) -> String + Send + Sync>),
}

impl fmt::Debug for IndexBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexBy::Column(name) => f.debug_tuple("Column").field(name).finish(),
            IndexBy::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

impl IndexBy {
    /// Derive the result key for one row.
    pub fn key_for(&self, row: &Row) -> String {
        match self {
            IndexBy::Column(name) => row
                .get(name)
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_json().to_string(),
                })
                .unwrap_or_default(),
            IndexBy::Closure(f) => f(row),
        }
    }
}

/// Query-result cache directive: how long, and under which invalidation tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryCacheDirective {
    pub duration: Option<Duration>,
    pub dependency: Option<String>,
}

impl QueryCacheDirective {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            dependency: None,
        }
    }
}
