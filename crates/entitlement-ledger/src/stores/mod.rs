//! # Stores
//!
//! One store per ledger component. Stores build statements, run them on the
//! executor handle they are given and map failures into `LedgerError`. They
//! hold no cached state: every read goes back to the executor.

pub mod access_path;
pub mod batch;
pub mod student_course;
pub mod student_package;
pub mod student_package_log;
pub mod student_package_order;

pub use access_path::AccessPathRepo;
pub use batch::BatchWriteCoordinator;
pub use student_course::StudentCourseRepo;
pub use student_package::StudentPackageRepo;
pub use student_package_log::StudentPackageLogRepo;
pub use student_package_order::StudentPackageOrderRepo;

use crate::domain::errors::{ExecError, LedgerError, LedgerResult};
use crate::ports::outbound::{QueryExecutor, RequestContext};
use crate::sql::tables::decode_all;
use crate::sql::{Record, Statement};

/// Run a query and decode every row.
pub(crate) async fn fetch_all<R: Record>(
    ctx: &RequestContext,
    db: &dyn QueryExecutor,
    op: &'static str,
    stmt: impl Into<Statement>,
) -> LedgerResult<Vec<R>> {
    let rows = db
        .query(ctx, &stmt.into())
        .await
        .map_err(|e| LedgerError::read(op, e))?;
    decode_all(&rows).map_err(|e| LedgerError::decode(op, e))
}

/// Run a single-row query. No row is `Ok(None)`.
pub(crate) async fn fetch_optional<R: Record>(
    ctx: &RequestContext,
    db: &dyn QueryExecutor,
    op: &'static str,
    stmt: impl Into<Statement>,
) -> LedgerResult<Option<R>> {
    match db.query_row(ctx, &stmt.into()).await {
        Ok(row) => R::from_row(&row)
            .map(Some)
            .map_err(|e| LedgerError::decode(op, e)),
        Err(ExecError::NoRows) => Ok(None),
        Err(e) => Err(LedgerError::read(op, e)),
    }
}

/// Run a single-row query. No row is `NotFound`.
pub(crate) async fn fetch_one<R: Record>(
    ctx: &RequestContext,
    db: &dyn QueryExecutor,
    op: &'static str,
    entity: &'static str,
    key: &str,
    stmt: impl Into<Statement>,
) -> LedgerResult<R> {
    fetch_optional(ctx, db, op, stmt)
        .await?
        .ok_or_else(|| LedgerError::NotFound {
            op,
            entity,
            key: key.to_string(),
        })
}

/// Execute a write and return the affected row count.
pub(crate) async fn execute(
    ctx: &RequestContext,
    db: &dyn QueryExecutor,
    op: &'static str,
    stmt: impl Into<Statement>,
) -> LedgerResult<u64> {
    db.exec(ctx, &stmt.into())
        .await
        .map_err(|e| LedgerError::write(op, e))
}

/// Execute a write that must affect exactly `expected` rows.
pub(crate) async fn execute_expecting(
    ctx: &RequestContext,
    db: &dyn QueryExecutor,
    op: &'static str,
    expected: u64,
    stmt: impl Into<Statement>,
) -> LedgerResult<()> {
    let actual = execute(ctx, db, op, stmt).await?;
    if actual != expected {
        return Err(LedgerError::no_row_affected(op, expected, actual));
    }
    Ok(())
}
