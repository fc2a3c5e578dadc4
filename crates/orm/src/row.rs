//! Materialized result rows
//!
//! Rows provide both index-based and name-based access to column values.
//! Column metadata is shared via `Arc` so every row of a result set reuses
//! the same name table.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{OrmError, OrmResult};
use crate::value::DbValue;

/// Column metadata shared across all rows in a result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, name_to_index }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get the name of a column by index.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Check if a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a query.
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values in order
    values: Vec<DbValue>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    ///
    /// For multiple rows from the same result set, prefer `with_columns`
    /// to share the column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<DbValue>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<DbValue>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Get a column value by name, failing when the column is absent.
    pub fn try_get(&self, name: &str) -> OrmResult<&DbValue> {
        self.get(name)
            .ok_or_else(|| OrmError::ColumnNotFound(name.to_string()))
    }

    /// Get a column value by index.
    pub fn get_at(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index)
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the raw values in column order.
    pub fn values(&self) -> &[DbValue] {
        &self.values
    }

    /// Convert the row to a JSON object keyed by column name.
    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        for (i, name) in self.columns.names().iter().enumerate() {
            map.insert(name.clone(), self.values[i].to_json());
        }
        JsonValue::Object(map)
    }

    /// Convert the row to a map keyed by column name.
    pub fn to_map(&self) -> HashMap<String, DbValue> {
        self.columns
            .names()
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Encode a result set as a JSON document suitable for the query cache.
///
/// Values use the typed `DbValue` serde encoding (not the lossy JSON
/// bridge) so a cached result decodes to exactly the values the driver
/// produced. The column list is kept separate from the row data so an
/// empty result set still round-trips its shape.
pub(crate) fn rows_to_json(rows: &[Row]) -> JsonValue {
    let columns: Vec<JsonValue> = rows
        .first()
        .map(|r| {
            r.column_info()
                .names()
                .iter()
                .map(|n| JsonValue::String(n.clone()))
                .collect()
        })
        .unwrap_or_default();
    let data: Vec<JsonValue> = rows
        .iter()
        .map(|r| serde_json::to_value(r.values()).unwrap_or(JsonValue::Null))
        .collect();
    serde_json::json!({ "columns": columns, "rows": data })
}

/// Decode a result set previously encoded with `rows_to_json`.
pub(crate) fn rows_from_json(json: &JsonValue) -> OrmResult<Vec<Row>> {
    let columns: Vec<String> = json
        .get("columns")
        .and_then(JsonValue::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .ok_or_else(|| OrmError::Serialization("cached result set missing columns".to_string()))?;
    let info = Arc::new(ColumnInfo::new(columns));
    let data = json
        .get("rows")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| OrmError::Serialization("cached result set missing rows".to_string()))?;

    let mut rows = Vec::with_capacity(data.len());
    for entry in data {
        let values: Vec<DbValue> = serde_json::from_value(entry.clone())?;
        rows.push(Row::with_columns(Arc::clone(&info), values));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![DbValue::Int64(1), DbValue::String("ada".to_string())],
        )
    }

    #[test]
    fn test_access_by_name_and_index() {
        let row = sample_row();
        assert_eq!(row.get("id"), Some(&DbValue::Int64(1)));
        assert_eq!(row.get_at(1), Some(&DbValue::String("ada".to_string())));
        assert!(row.get("missing").is_none());
        assert!(matches!(
            row.try_get("missing"),
            Err(OrmError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_cache_round_trip() {
        let rows = vec![sample_row(), sample_row()];
        let encoded = rows_to_json(&rows);
        let decoded = rows_from_json(&encoded).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].get("name"), Some(&DbValue::String("ada".to_string())));
    }

    #[test]
    fn test_cache_round_trip_empty() {
        let decoded = rows_from_json(&rows_to_json(&[])).unwrap();
        assert!(decoded.is_empty());
    }
}
