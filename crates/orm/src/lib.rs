//! # riata-orm: relational query & active-record engine
//!
//! The database layer of the riata framework: connection management with
//! master/slave failover, savepoint-emulated nested transactions, a
//! dialect-independent query/condition model compiled to parameterized
//! SQL, and an active-record relation engine with batched eager loading,
//! key bucketing, and inverse back-references.
//!
//! Concrete database support plugs in through the driver traits in
//! [`backends`]; a PostgreSQL implementation over sqlx ships in the box.

pub mod backends;
pub mod cache;
pub mod command;
pub mod conditions;
pub mod connection;
pub mod error;
pub mod model;
pub mod query;
pub mod relations;
pub mod row;
pub mod schema;
pub mod transaction;
pub mod value;


// Re-export the main types for convenience
pub use backends::{DatabaseDriver, DatabaseLink, PostgresDriver, ServerConfig, SqlDialect};
pub use cache::{Cache, MemoryCache};
pub use command::Command;
pub use conditions::{filter_condition, CompareOp, Condition, HashValue};
pub use connection::pool::PoolError;
pub use connection::{Connection, ConnectionConfig};
pub use error::{OrmError, OrmResult};
pub use model::crud::{find_all, find_by_pk};
pub use model::{ModelDef, ModelRegistry, Record, RelatedValue};
pub use query::{
    BatchQuery, IndexBy, JoinType, OrderDirection, Query, QueryBuilder, QueryCacheDirective,
    QueryResults, SetExpr,
};
pub use relations::{find_with, RelationDef, Via};
pub use row::{ColumnInfo, Row};
pub use schema::{ColumnSchema, ColumnType, Schema, SchemaSource, TableSchema};
pub use transaction::{IsolationLevel, Transaction};
pub use value::DbValue;
