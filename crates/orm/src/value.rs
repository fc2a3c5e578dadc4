//! Database value enumeration for parameter binding and row decoding
//!
//! `DbValue` is the dynamic value type flowing between the query layer and
//! the driver boundary: bound parameters, decoded row values, and record
//! attributes all use it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
    Array(Vec<DbValue>),
}

impl DbValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DbValue::Null => JsonValue::Null,
            DbValue::Bool(b) => JsonValue::Bool(*b),
            DbValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DbValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DbValue::Float32(f) => serde_json::Number::from_f64(f64::from(*f))
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DbValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DbValue::String(s) => JsonValue::String(s.clone()),
            DbValue::Bytes(b) => JsonValue::Array(
                b.iter()
                    .map(|&x| JsonValue::Number(serde_json::Number::from(x)))
                    .collect(),
            ),
            DbValue::Uuid(u) => JsonValue::String(u.to_string()),
            DbValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DbValue::Date(d) => JsonValue::String(d.to_string()),
            DbValue::Time(t) => JsonValue::String(t.to_string()),
            DbValue::Json(j) => j.clone(),
            DbValue::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
        }
    }

    /// Create a DbValue from a JSON value
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DbValue::Null,
            JsonValue::Bool(b) => DbValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX) {
                        DbValue::Int32(i as i32)
                    } else {
                        DbValue::Int64(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    DbValue::Float64(f)
                } else {
                    DbValue::Null
                }
            }
            JsonValue::String(s) => DbValue::String(s),
            JsonValue::Array(arr) => {
                DbValue::Array(arr.into_iter().map(DbValue::from_json).collect())
            }
            JsonValue::Object(_) => DbValue::Json(json),
        }
    }

    /// Interpret the value as an integer where possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Int32(i) => Some(i64::from(*i)),
            DbValue::Int64(i) => Some(*i),
            DbValue::String(s) => s.parse().ok(),
            DbValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Interpret the value as a string where possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for DbValue {
    fn from(value: bool) -> Self {
        DbValue::Bool(value)
    }
}

impl From<i32> for DbValue {
    fn from(value: i32) -> Self {
        DbValue::Int32(value)
    }
}

impl From<i64> for DbValue {
    fn from(value: i64) -> Self {
        DbValue::Int64(value)
    }
}

impl From<f32> for DbValue {
    fn from(value: f32) -> Self {
        DbValue::Float32(value)
    }
}

impl From<f64> for DbValue {
    fn from(value: f64) -> Self {
        DbValue::Float64(value)
    }
}

impl From<String> for DbValue {
    fn from(value: String) -> Self {
        DbValue::String(value)
    }
}

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        DbValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(value: Vec<u8>) -> Self {
        DbValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for DbValue {
    fn from(value: uuid::Uuid) -> Self {
        DbValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DbValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DbValue::DateTime(value)
    }
}

impl From<chrono::NaiveDate> for DbValue {
    fn from(value: chrono::NaiveDate) -> Self {
        DbValue::Date(value)
    }
}

impl From<chrono::NaiveTime> for DbValue {
    fn from(value: chrono::NaiveTime) -> Self {
        DbValue::Time(value)
    }
}

impl From<JsonValue> for DbValue {
    fn from(value: JsonValue) -> Self {
        DbValue::Json(value)
    }
}

impl<T> From<Option<T>> for DbValue
where
    T: Into<DbValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DbValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_scalars() {
        assert_eq!(DbValue::from_json(DbValue::Int32(5).to_json()), DbValue::Int32(5));
        assert_eq!(
            DbValue::from_json(DbValue::String("x".into()).to_json()),
            DbValue::String("x".into())
        );
        assert_eq!(DbValue::from_json(DbValue::Null.to_json()), DbValue::Null);
        assert_eq!(DbValue::from_json(DbValue::Bool(true).to_json()), DbValue::Bool(true));
    }

    #[test]
    fn test_as_i64_coercion() {
        assert_eq!(DbValue::Int32(7).as_i64(), Some(7));
        assert_eq!(DbValue::String("42".into()).as_i64(), Some(42));
        assert_eq!(DbValue::String("nope".into()).as_i64(), None);
        assert_eq!(DbValue::Null.as_i64(), None);
    }

    #[test]
    fn test_option_into_null() {
        let v: DbValue = Option::<i32>::None.into();
        assert!(v.is_null());
        let v: DbValue = Some(3i32).into();
        assert_eq!(v, DbValue::Int32(3));
    }
}
