//! Shared `UPDATE` shapes for the soft-delete/revert lifecycle.

use super::descriptor::TableDescriptor;
use super::statement::{Predicate, Update};
use super::value::SqlValue;
use shared_types::Timestamp;

/// `UPDATE t SET deleted_at = $at, updated_at = $at WHERE <filter> AND deleted_at IS NULL`.
///
/// Rows already deleted keep their original stamp, so re-applying is a no-op.
pub fn soft_delete_update(desc: &TableDescriptor, filter: Vec<Predicate>, at: Timestamp) -> Update {
    let mut update = Update::table(desc).set("deleted_at", at);
    if desc.has_column("updated_at") {
        update = update.set("updated_at", at);
    }
    update.filter = filter;
    update.filter(Predicate::IsNull("deleted_at"))
}

/// `UPDATE t SET deleted_at = NULL, updated_at = $now WHERE <filter>`.
///
/// Unconditional: the row's time window is not re-validated.
pub fn revert_update(desc: &TableDescriptor, filter: Vec<Predicate>, now: Timestamp) -> Update {
    let mut update = Update::table(desc).set("deleted_at", SqlValue::Null);
    if desc.has_column("updated_at") {
        update = update.set("updated_at", now);
    }
    update.filter = filter;
    update
}
