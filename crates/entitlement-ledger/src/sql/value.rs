//! Column values carried by statements and rows.

use serde::{Deserialize, Serialize};
use shared_types::Timestamp;
use std::cmp::Ordering;

/// A single bound parameter or column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(Timestamp),
    Json(serde_json::Value),
    TextArray(Vec<String>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// SQL ordering between two values of the same type. `NULL` and mixed
    /// types do not compare.
    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (SqlValue::Bool(a), SqlValue::Bool(b)) => Some(a.cmp(b)),
            (SqlValue::Int(a), SqlValue::Int(b)) => Some(a.cmp(b)),
            (SqlValue::Text(a), SqlValue::Text(b)) => Some(a.cmp(b)),
            (SqlValue::Timestamp(a), SqlValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// SQL equality: `NULL = anything` is never true.
    pub fn sql_eq(&self, other: &SqlValue) -> bool {
        !self.is_null() && !other.is_null() && self == other
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int8",
            SqlValue::Text(_) => "text",
            SqlValue::Timestamp(_) => "timestamptz",
            SqlValue::Json(_) => "jsonb",
            SqlValue::TextArray(_) => "text[]",
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<Timestamp> for SqlValue {
    fn from(v: Timestamp) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(v: Vec<String>) -> Self {
        SqlValue::TextArray(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_never_equal() {
        assert!(!SqlValue::Null.sql_eq(&SqlValue::Null));
        assert!(SqlValue::from("a").sql_eq(&SqlValue::from("a")));
    }

    #[test]
    fn test_mixed_types_do_not_compare() {
        assert_eq!(SqlValue::Int(1).compare(&SqlValue::from("1")), None);
        assert_eq!(
            SqlValue::Int(1).compare(&SqlValue::Int(2)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_option_conversion() {
        let none: Option<String> = None;
        assert!(SqlValue::from(none).is_null());
        assert_eq!(SqlValue::from(Some(3i32)), SqlValue::Int(3));
    }
}
