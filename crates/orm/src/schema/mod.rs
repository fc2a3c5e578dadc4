//! Schema metadata
//!
//! Table and column descriptions drive value coercion between database
//! types and `DbValue`, and supply identifier quoting to the query layer.
//! Metadata is registered programmatically or loaded through a
//! `SchemaSource` collaborator; loaded metadata is memoized per schema and
//! optionally cached through the cache collaborator (with a per-table
//! exclude list).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::SqlDialect;
use crate::cache::Cache;
use crate::error::{OrmError, OrmResult};
use crate::value::DbValue;

/// Abstract column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Char,
    String,
    Text,
    Binary,
    Uuid,
    Date,
    Time,
    DateTime,
    Json,
}

/// One column's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub default_value: Option<DbValue>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<DbValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Coerce a raw value to this column's language-side representation.
    ///
    /// Nulls pass through untouched; unparseable values are returned
    /// unchanged rather than guessed at.
    pub fn coerce(&self, value: DbValue) -> DbValue {
        if value.is_null() {
            return value;
        }
        match self.column_type {
            ColumnType::Boolean => match value {
                DbValue::Bool(_) => value,
                DbValue::Int32(i) => DbValue::Bool(i != 0),
                DbValue::Int64(i) => DbValue::Bool(i != 0),
                DbValue::String(ref s) => match s.as_str() {
                    "true" | "t" | "1" => DbValue::Bool(true),
                    "false" | "f" | "0" => DbValue::Bool(false),
                    _ => value,
                },
                _ => value,
            },
            ColumnType::SmallInt | ColumnType::Integer => match value {
                DbValue::Int32(_) => value,
                DbValue::Int64(i) => i32::try_from(i).map(DbValue::Int32).unwrap_or(DbValue::Int64(i)),
                DbValue::Bool(b) => DbValue::Int32(i32::from(b)),
                DbValue::String(ref s) => s.parse().map(DbValue::Int32).unwrap_or(value),
                _ => value,
            },
            ColumnType::BigInt => match value {
                DbValue::Int64(_) => value,
                DbValue::Int32(i) => DbValue::Int64(i64::from(i)),
                DbValue::Bool(b) => DbValue::Int64(i64::from(b)),
                DbValue::String(ref s) => s.parse().map(DbValue::Int64).unwrap_or(value),
                _ => value,
            },
            ColumnType::Float | ColumnType::Double | ColumnType::Decimal => match value {
                DbValue::Float32(_) | DbValue::Float64(_) => value,
                DbValue::Int32(i) => DbValue::Float64(f64::from(i)),
                DbValue::Int64(i) => DbValue::Float64(i as f64),
                DbValue::String(ref s) => s.parse().map(DbValue::Float64).unwrap_or(value),
                _ => value,
            },
            ColumnType::Char | ColumnType::String | ColumnType::Text => match value {
                DbValue::String(_) => value,
                DbValue::Int32(i) => DbValue::String(i.to_string()),
                DbValue::Int64(i) => DbValue::String(i.to_string()),
                DbValue::Float64(f) => DbValue::String(f.to_string()),
                DbValue::Bool(b) => DbValue::String(b.to_string()),
                DbValue::Uuid(u) => DbValue::String(u.to_string()),
                _ => value,
            },
            ColumnType::Uuid => match value {
                DbValue::Uuid(_) => value,
                DbValue::String(ref s) => uuid::Uuid::parse_str(s).map(DbValue::Uuid).unwrap_or(value),
                _ => value,
            },
            ColumnType::Date => match value {
                DbValue::Date(_) => value,
                DbValue::String(ref s) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(DbValue::Date)
                    .unwrap_or(value),
                _ => value,
            },
            ColumnType::Time => match value {
                DbValue::Time(_) => value,
                DbValue::String(ref s) => chrono::NaiveTime::parse_from_str(s, "%H:%M:%S")
                    .map(DbValue::Time)
                    .unwrap_or(value),
                _ => value,
            },
            ColumnType::DateTime => match value {
                DbValue::DateTime(_) => value,
                DbValue::String(ref s) => chrono::DateTime::parse_from_rfc3339(s)
                    .map(|dt| DbValue::DateTime(dt.with_timezone(&chrono::Utc)))
                    .unwrap_or(value),
                _ => value,
            },
            ColumnType::Binary | ColumnType::Json => value,
        }
    }
}

/// One table's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Vec<String>,
    /// Sequence backing the auto-increment key, where the dialect has one
    pub sequence_name: Option<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            sequence_name: None,
        }
    }

    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        if column.primary_key {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
        self
    }

    pub fn with_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence_name = Some(sequence.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Coerce a full attribute map against this table's column types.
    pub fn coerce_row(&self, attributes: &mut HashMap<String, DbValue>) {
        for column in &self.columns {
            if let Some(value) = attributes.remove(&column.name) {
                attributes.insert(column.name.clone(), column.coerce(value));
            }
        }
    }
}

/// Supplies table metadata on demand (an introspector, a migration
/// registry, or a hand-written catalog).
pub trait SchemaSource: Send + Sync {
    fn load_table_schema(&self, table: &str) -> OrmResult<Option<TableSchema>>;
}

const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(3600);
const SCHEMA_CACHE_TAG: &str = "schema";

/// Per-connection schema registry with quoting rules.
pub struct Schema {
    dialect: SqlDialect,
    cache: Arc<dyn Cache>,
    cache_exclude: Vec<String>,
    tables: RwLock<HashMap<String, Arc<TableSchema>>>,
    source: StdMutex<Option<Arc<dyn SchemaSource>>>,
}

impl Schema {
    pub fn new(dialect: SqlDialect, cache: Arc<dyn Cache>, cache_exclude: Vec<String>) -> Self {
        Self {
            dialect,
            cache,
            cache_exclude,
            tables: RwLock::new(HashMap::new()),
            source: StdMutex::new(None),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn set_source(&self, source: Arc<dyn SchemaSource>) {
        *self.source.lock().unwrap() = Some(source);
    }

    /// Register table metadata directly.
    pub fn register_table(&self, table: TableSchema) -> Arc<TableSchema> {
        let table = Arc::new(table);
        self.tables
            .write()
            .unwrap()
            .insert(table.name.clone(), Arc::clone(&table));
        table
    }

    /// Look up table metadata: memo, then cache (unless excluded), then
    /// the schema source.
    pub fn table_schema(&self, name: &str) -> OrmResult<Option<Arc<TableSchema>>> {
        if let Some(table) = self.tables.read().unwrap().get(name) {
            return Ok(Some(Arc::clone(table)));
        }

        let cacheable = !self.cache_exclude.iter().any(|t| t == name);
        let cache_key = self.cache.build_key(&["table-schema", name]);
        if cacheable {
            if let Some(cached) = self.cache.get(&cache_key) {
                let table: TableSchema = serde_json::from_value(cached)?;
                return Ok(Some(self.memoize(table)));
            }
        }

        let source = self.source.lock().unwrap().clone();
        let Some(source) = source else {
            return Ok(None);
        };
        let Some(table) = source.load_table_schema(name)? else {
            return Ok(None);
        };
        if cacheable {
            self.cache.set_with_tag(
                &cache_key,
                serde_json::to_value(&table)?,
                Some(SCHEMA_CACHE_TTL),
                SCHEMA_CACHE_TAG,
            );
        }
        Ok(Some(self.memoize(table)))
    }

    /// Table metadata, failing when unknown.
    pub fn require_table_schema(&self, name: &str) -> OrmResult<Arc<TableSchema>> {
        self.table_schema(name)?
            .ok_or_else(|| OrmError::Schema(format!("no metadata for table '{}'", name)))
    }

    /// Drop the memoized entry for a table so the next lookup reloads it.
    pub fn refresh_table(&self, name: &str) {
        self.tables.write().unwrap().remove(name);
        self.cache
            .remove(&self.cache.build_key(&["table-schema", name]));
    }

    /// Drop every cached table entry, memoized and shared alike.
    pub fn refresh(&self) {
        self.tables.write().unwrap().clear();
        self.cache.invalidate_tag(SCHEMA_CACHE_TAG);
    }

    fn memoize(&self, table: TableSchema) -> Arc<TableSchema> {
        let table = Arc::new(table);
        self.tables
            .write()
            .unwrap()
            .insert(table.name.clone(), Arc::clone(&table));
        table
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    pub fn quote_table_name(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    pub fn quote_column_name(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn test_boolean_coercion() {
        let col = ColumnSchema::new("active", ColumnType::Boolean);
        assert_eq!(col.coerce(DbValue::Int32(1)), DbValue::Bool(true));
        assert_eq!(col.coerce(DbValue::Int64(0)), DbValue::Bool(false));
        assert_eq!(col.coerce(DbValue::String("t".into())), DbValue::Bool(true));
        assert_eq!(col.coerce(DbValue::Null), DbValue::Null);
    }

    #[test]
    fn test_integer_coercion() {
        let col = ColumnSchema::new("age", ColumnType::Integer);
        assert_eq!(col.coerce(DbValue::String("42".into())), DbValue::Int32(42));
        assert_eq!(col.coerce(DbValue::Int64(7)), DbValue::Int32(7));
        // out-of-range stays wide instead of wrapping
        assert_eq!(
            col.coerce(DbValue::Int64(i64::MAX)),
            DbValue::Int64(i64::MAX)
        );
        // unparseable values come back unchanged
        assert_eq!(
            col.coerce(DbValue::String("x".into())),
            DbValue::String("x".into())
        );
    }

    #[test]
    fn test_string_and_uuid_coercion() {
        let s = ColumnSchema::new("label", ColumnType::String);
        assert_eq!(s.coerce(DbValue::Int32(5)), DbValue::String("5".into()));
        let u = ColumnSchema::new("id", ColumnType::Uuid);
        let uuid = uuid::Uuid::new_v4();
        assert_eq!(
            u.coerce(DbValue::String(uuid.to_string())),
            DbValue::Uuid(uuid)
        );
    }

    #[test]
    fn test_date_coercion() {
        let col = ColumnSchema::new("born", ColumnType::Date);
        let coerced = col.coerce(DbValue::String("2020-02-29".into()));
        assert!(matches!(coerced, DbValue::Date(_)));
    }

    #[test]
    fn test_table_schema_collects_primary_key() {
        let table = TableSchema::new("users")
            .with_column(ColumnSchema::new("id", ColumnType::BigInt).primary().auto_increment())
            .with_column(ColumnSchema::new("name", ColumnType::String).not_null());
        assert_eq!(table.primary_key, vec!["id".to_string()]);
        assert!(table.column("name").is_some());
    }

    struct CountingSource {
        loads: AtomicUsize,
    }

    impl SchemaSource for CountingSource {
        fn load_table_schema(&self, table: &str) -> OrmResult<Option<TableSchema>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(
                TableSchema::new(table)
                    .with_column(ColumnSchema::new("id", ColumnType::BigInt).primary()),
            ))
        }
    }

    #[test]
    fn test_schema_cache_and_exclude_list() {
        let cache = Arc::new(MemoryCache::new());
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });

        let schema = Schema::new(
            SqlDialect::PostgreSQL,
            cache.clone(),
            vec!["volatile".to_string()],
        );
        schema.set_source(source.clone());

        // cached table: loaded once, then memoized
        schema.table_schema("users").unwrap().unwrap();
        schema.table_schema("users").unwrap().unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        // a second schema over the same cache hits the cache, not the source
        let schema2 = Schema::new(SqlDialect::PostgreSQL, cache.clone(), vec![]);
        schema2.set_source(source.clone());
        schema2.table_schema("users").unwrap().unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        // excluded table: never cached, so a fresh schema reloads it
        schema.table_schema("volatile").unwrap().unwrap();
        let schema3 = Schema::new(
            SqlDialect::PostgreSQL,
            cache.clone(),
            vec!["volatile".to_string()],
        );
        schema3.set_source(source.clone());
        schema3.table_schema("volatile").unwrap().unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 3);
    }
}
