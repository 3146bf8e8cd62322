//! # SQL Layer
//!
//! Declarative table descriptors, the statement AST the stores build, and the
//! evaluation rules the in-memory adapter applies to it.

pub mod descriptor;
pub mod eval;
pub mod revisable;
pub mod row;
pub mod schema;
pub mod statement;
pub mod tables;
pub mod value;

pub use descriptor::{ColumnScope, PartialUniqueIndex, Record, TableDescriptor, AUDIT_SCOPE_COLUMN};
pub use revisable::{revert_update, soft_delete_update};
pub use row::Row;
pub use statement::{
    Batch, Delete, Insert, OnConflict, Predicate, RowLock, Select, SortOrder, Statement, Update,
};
pub use value::SqlValue;
