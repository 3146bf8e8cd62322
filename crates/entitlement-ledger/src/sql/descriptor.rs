//! # Table Descriptors
//!
//! Each persisted entity declares its table once: name, column list, primary
//! key, the audit-scope column the database fills itself, and any partial
//! unique index. Statement builders and the in-memory engine both read the
//! descriptor, so column lists are never re-typed per query.

use super::row::Row;
use super::value::SqlValue;
use crate::domain::errors::RowError;

/// Column the database stamps from the session scope. Never written by inserts
/// built with `ColumnScope::ExcludeAuditScope`.
pub const AUDIT_SCOPE_COLUMN: &str = "resource_path";

/// `CREATE UNIQUE INDEX … (columns) WHERE where_true AND where_null IS NULL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialUniqueIndex {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    /// Boolean columns that must be `true` for the row to be indexed.
    pub where_true: &'static [&'static str],
    /// Columns that must be `NULL` for the row to be indexed.
    pub where_null: &'static [&'static str],
}

impl PartialUniqueIndex {
    pub fn covers(&self, row: &Row) -> bool {
        self.where_true
            .iter()
            .all(|c| matches!(row.get(c), Some(SqlValue::Bool(true))))
            && self
                .where_null
                .iter()
                .all(|c| row.get(c).map_or(true, SqlValue::is_null))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub primary_key: &'static [&'static str],
    pub audit_scope: Option<&'static str>,
    pub partial_unique: Option<PartialUniqueIndex>,
}

/// Which columns an insert writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnScope {
    All,
    ExcludeAuditScope,
}

impl TableDescriptor {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    pub fn insert_columns(&self, scope: ColumnScope) -> Vec<&'static str> {
        self.columns
            .iter()
            .copied()
            .filter(|c| match scope {
                ColumnScope::All => true,
                ColumnScope::ExcludeAuditScope => Some(*c) != self.audit_scope,
            })
            .collect()
    }

    /// Name of the primary key constraint.
    pub fn primary_key_constraint(&self) -> String {
        format!("{}_pk", self.name)
    }

    /// Columns an upsert overwrites: everything except the key, the audit
    /// scope and `created_at`.
    pub fn mutable_columns(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .copied()
            .filter(|c| {
                !self.primary_key.contains(c) && Some(*c) != self.audit_scope && *c != "created_at"
            })
            .collect()
    }
}

/// An entity persisted through a `TableDescriptor`.
pub trait Record: Sized {
    fn descriptor() -> &'static TableDescriptor;

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self, RowError>;
}
