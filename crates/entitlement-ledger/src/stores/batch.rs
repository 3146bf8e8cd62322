//! # Batch Write Coordinator
//!
//! Replaces every child of a parent in one pipelined round trip:
//!
//! 1. `DELETE FROM <child> WHERE <parent column> = $1`
//! 2. one `INSERT` per child, audit-scope column excluded
//!
//! Statements run in order and the batch stops at the first failure. The
//! caller's transaction makes the replacement all-or-nothing.

use super::fetch_all;
use crate::config::LedgerConfig;
use crate::domain::entities::{
    PackageCourse, PackageCourseFee, PackageCourseMaterial, ProductLocation,
};
use crate::domain::errors::{BatchFailure, LedgerError, LedgerResult};
use crate::ports::inbound::AssociationStore;
use crate::ports::outbound::{QueryExecutor, RequestContext, TimeSource};
use crate::sql::tables::PACKAGE_COURSE;
use crate::sql::{Batch, ColumnScope, Delete, Insert, Predicate, Record, Select, SortOrder};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct BatchWriteCoordinator {
    clock: Arc<dyn TimeSource>,
    config: LedgerConfig,
}

impl BatchWriteCoordinator {
    pub fn new(clock: Arc<dyn TimeSource>, config: LedgerConfig) -> Self {
        Self { clock, config }
    }

    /// Delete all rows of `R` whose `parent_column` is `parent_id`, then insert `children`.
    ///
    /// `stamp` sets per-row values (parent id, `created_at`) before the insert is queued.
    #[allow(clippy::too_many_arguments)]
    pub async fn replace_children<R, F>(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        op: &'static str,
        parent_column: &'static str,
        parent_id: &str,
        children: &[R],
        stamp: F,
    ) -> LedgerResult<()>
    where
        R: Record + Clone + Send + Sync,
        F: Fn(&mut R) + Send + Sync,
    {
        let total = children.len() + 1;
        if total > self.config.max_batch_statements {
            return Err(LedgerError::invalid_argument(
                op,
                format!(
                    "batch of {} statements exceeds limit {}",
                    total, self.config.max_batch_statements
                ),
            ));
        }

        let mut batch = Batch::new();
        batch.queue(Delete::table(R::descriptor()).filter(Predicate::eq(parent_column, parent_id)));
        for child in children {
            let mut row = child.clone();
            stamp(&mut row);
            batch.queue(Insert::from_record(&row, ColumnScope::ExcludeAuditScope));
        }

        let results = db.send_batch(ctx, &batch).await;
        if let Some((index, err)) = results.first_error() {
            warn!(
                op,
                table = R::descriptor().name,
                parent_id,
                index,
                total,
                error = %err,
                "child replacement aborted"
            );
            return Err(LedgerError::BatchFailed {
                op,
                index,
                total,
                cause: BatchFailure::Exec(err.clone()),
            });
        }
        if results.outcomes.len() < total {
            return Err(LedgerError::BatchFailed {
                op,
                index: results.outcomes.len(),
                total,
                cause: BatchFailure::NoRowAffected,
            });
        }

        info!(
            op,
            table = R::descriptor().name,
            parent_id,
            removed = results.rows_affected(0).unwrap_or(0),
            inserted = children.len(),
            "children replaced"
        );
        Ok(())
    }
}

#[async_trait]
impl AssociationStore for BatchWriteCoordinator {
    async fn upsert_package_courses(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package_id: &str,
        courses: &[PackageCourse],
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        self.replace_children(
            ctx,
            db,
            "PackageCourseRepo.Upsert",
            "package_id",
            package_id,
            courses,
            |c| {
                c.package_id = package_id.to_string();
                c.created_at = now;
            },
        )
        .await
    }

    async fn upsert_package_course_materials(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package_id: &str,
        materials: &[PackageCourseMaterial],
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        self.replace_children(
            ctx,
            db,
            "PackageCourseMaterialRepo.Upsert",
            "package_id",
            package_id,
            materials,
            |m| {
                m.package_id = package_id.to_string();
                m.created_at = now;
            },
        )
        .await
    }

    async fn upsert_package_course_fees(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package_id: &str,
        fees: &[PackageCourseFee],
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        self.replace_children(
            ctx,
            db,
            "PackageCourseFeeRepo.Upsert",
            "package_id",
            package_id,
            fees,
            |f| {
                f.package_id = package_id.to_string();
                f.created_at = now;
            },
        )
        .await
    }

    async fn upsert_product_locations(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        product_id: &str,
        locations: &[ProductLocation],
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        self.replace_children(
            ctx,
            db,
            "ProductLocationRepo.Replace",
            "product_id",
            product_id,
            locations,
            |l| {
                l.product_id = product_id.to_string();
                l.created_at = now;
            },
        )
        .await
    }

    async fn get_package_courses(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package_id: &str,
    ) -> LedgerResult<Vec<PackageCourse>> {
        fetch_all(
            ctx,
            db,
            "PackageCourseRepo.GetByPackageID",
            Select::table(&PACKAGE_COURSE)
                .filter(Predicate::eq("package_id", package_id))
                .order_by("course_id", SortOrder::Asc),
        )
        .await
    }
}
