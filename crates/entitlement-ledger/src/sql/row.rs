//! Result rows and typed column accessors.

use super::value::SqlValue;
use crate::domain::errors::RowError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::Timestamp;
use std::collections::BTreeMap;

/// A row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<SqlValue>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// Value of `column`, `NULL` when absent.
    pub fn value_or_null(&self, column: &str) -> SqlValue {
        self.values.get(column).cloned().unwrap_or(SqlValue::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Keep only the listed columns, filling absent ones with `NULL`.
    pub fn project(&self, columns: &[&str]) -> Row {
        let mut out = Row::new();
        for column in columns {
            out.set(column, self.value_or_null(column));
        }
        out
    }

    fn require(&self, column: &str) -> Result<&SqlValue, RowError> {
        self.values.get(column).ok_or_else(|| RowError::MissingColumn {
            column: column.to_string(),
        })
    }

    fn mismatch(column: &str, expected: &'static str) -> RowError {
        RowError::TypeMismatch {
            column: column.to_string(),
            expected,
        }
    }

    pub fn text(&self, column: &str) -> Result<String, RowError> {
        self.opt_text(column)?
            .ok_or_else(|| Self::mismatch(column, "non-null text"))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, RowError> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            _ => Err(Self::mismatch(column, "text")),
        }
    }

    pub fn boolean(&self, column: &str) -> Result<bool, RowError> {
        match self.require(column)? {
            SqlValue::Bool(b) => Ok(*b),
            _ => Err(Self::mismatch(column, "bool")),
        }
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<i32>, RowError> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Int(v) => i32::try_from(*v)
                .map(Some)
                .map_err(|_| Self::mismatch(column, "int4")),
            _ => Err(Self::mismatch(column, "int4")),
        }
    }

    pub fn int(&self, column: &str) -> Result<i32, RowError> {
        self.opt_int(column)?
            .ok_or_else(|| Self::mismatch(column, "non-null int4"))
    }

    pub fn timestamp(&self, column: &str) -> Result<Timestamp, RowError> {
        self.opt_timestamp(column)?
            .ok_or_else(|| Self::mismatch(column, "non-null timestamptz"))
    }

    pub fn opt_timestamp(&self, column: &str) -> Result<Option<Timestamp>, RowError> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(t) => Ok(Some(*t)),
            _ => Err(Self::mismatch(column, "timestamptz")),
        }
    }

    pub fn text_array(&self, column: &str) -> Result<Vec<String>, RowError> {
        match self.require(column)? {
            SqlValue::Null => Ok(Vec::new()),
            SqlValue::TextArray(v) => Ok(v.clone()),
            _ => Err(Self::mismatch(column, "text[]")),
        }
    }

    pub fn json(&self, column: &str) -> Result<serde_json::Value, RowError> {
        match self.require(column)? {
            SqlValue::Null => Ok(serde_json::Value::Null),
            SqlValue::Json(v) => Ok(v.clone()),
            _ => Err(Self::mismatch(column, "jsonb")),
        }
    }

    /// Decode a jsonb column into a typed payload.
    pub fn json_as<T: DeserializeOwned>(&self, column: &str) -> Result<T, RowError> {
        serde_json::from_value(self.json(column)?).map_err(|e| RowError::Json {
            column: column.to_string(),
            message: e.to_string(),
        })
    }
}

/// Encode a typed payload for a jsonb column.
pub fn to_json_value<T: Serialize>(column: &str, value: &T) -> Result<SqlValue, RowError> {
    serde_json::to_value(value)
        .map(SqlValue::Json)
        .map_err(|e| RowError::Json {
            column: column.to_string(),
            message: e.to_string(),
        })
}
