//! Query layer - the fluent SELECT model and its compilation
//!
//! - `types`: join/order/cache directive types
//! - `select`: the fluent `Query` builder
//! - `builder`: compilation of queries and conditions to parameterized SQL
//! - `execution`: terminal operations against a connection
//! - `batch`: chunked iteration over large result sets

pub mod batch;
pub mod builder;
pub mod execution;
pub mod select;
pub mod types;

pub use batch::BatchQuery;
pub use builder::{QueryBuilder, SetExpr};
pub use execution::QueryResults;
pub use select::Query;
pub use types::{IndexBy, JoinClause, JoinType, OrderDirection, QueryCacheDirective, TableRef, UnionClause};
