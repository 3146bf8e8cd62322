//! # Entitlement Record Store
//!
//! Owns `student_packages`, the mutable head of each grant. Writers must lock
//! the head with `get_by_id` inside their transaction before updating it.

use super::{execute, execute_expecting, fetch_all, fetch_one};
use crate::config::LedgerConfig;
use crate::domain::calendar::lookback_window;
use crate::domain::entities::StudentPackage;
use crate::domain::errors::{ExecError, LedgerError, LedgerResult};
use crate::ports::inbound::StudentPackageStore;
use crate::ports::outbound::{QueryExecutor, RequestContext, TimeSource};
use crate::sql::row::to_json_value;
use crate::sql::tables::STUDENT_PACKAGES;
use crate::sql::{
    soft_delete_update, ColumnScope, Insert, OnConflict, Predicate, RowLock, Select, SortOrder,
    SqlValue, Update,
};
use async_trait::async_trait;
use shared_types::{StudentPackageId, Timestamp};
use std::sync::Arc;
use tracing::{debug, info};

/// Columns rewritten by `update` and by an upsert conflict.
const MUTABLE_FIELDS: &[&str] = &[
    "start_at",
    "end_at",
    "properties",
    "is_active",
    "location_ids",
    "updated_at",
    "deleted_at",
];

pub struct StudentPackageRepo {
    clock: Arc<dyn TimeSource>,
    config: LedgerConfig,
}

impl StudentPackageRepo {
    pub fn new(clock: Arc<dyn TimeSource>, config: LedgerConfig) -> Self {
        Self { clock, config }
    }

    fn check_window(op: &'static str, package: &StudentPackage) -> LedgerResult<()> {
        if package.has_valid_window() {
            Ok(())
        } else {
            Err(LedgerError::invalid_argument(
                op,
                format!(
                    "student package {} ends before it starts",
                    package.student_package_id
                ),
            ))
        }
    }

    fn properties_value(op: &'static str, package: &StudentPackage) -> LedgerResult<SqlValue> {
        to_json_value("properties", &package.properties).map_err(|e| LedgerError::decode(op, e))
    }
}

#[async_trait]
impl StudentPackageStore for StudentPackageRepo {
    async fn insert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package: &StudentPackage,
    ) -> LedgerResult<()> {
        const OP: &str = "StudentPackageRepo.Insert";
        Self::check_window(OP, package)?;

        let now = self.clock.now();
        let row = StudentPackage {
            package_id: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            ..package.clone()
        };
        execute_expecting(
            ctx,
            db,
            OP,
            1,
            Insert::from_record(&row, ColumnScope::ExcludeAuditScope),
        )
        .await?;

        debug!(student_package_id = %row.student_package_id, "student package inserted");
        Ok(())
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package: &StudentPackage,
    ) -> LedgerResult<()> {
        const OP: &str = "StudentPackageRepo.Update";
        Self::check_window(OP, package)?;

        let stmt = Update::table(&STUDENT_PACKAGES)
            .set("start_at", package.start_at)
            .set("end_at", package.end_at)
            .set("properties", Self::properties_value(OP, package)?)
            .set("is_active", true)
            .set("location_ids", package.location_ids.clone())
            .set("updated_at", self.clock.now())
            .set("deleted_at", package.deleted_at)
            .filter(Predicate::eq(
                "student_package_id",
                &package.student_package_id,
            ));
        execute_expecting(ctx, db, OP, 1, stmt).await
    }

    async fn upsert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package: &StudentPackage,
    ) -> LedgerResult<()> {
        const OP: &str = "StudentPackageRepo.Upsert";
        Self::check_window(OP, package)?;

        let now = self.clock.now();
        let row = StudentPackage {
            created_at: now,
            updated_at: now,
            ..package.clone()
        };
        let mut set = MUTABLE_FIELDS.to_vec();
        set.push("package_id");
        let stmt = Insert::from_record(&row, ColumnScope::ExcludeAuditScope).on_conflict(
            OnConflict::DoUpdate {
                target: STUDENT_PACKAGES.primary_key.to_vec(),
                set,
            },
        );

        execute_expecting(ctx, db, OP, 1, stmt).await
    }

    async fn get_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<StudentPackage> {
        fetch_one(
            ctx,
            db,
            "StudentPackageRepo.GetByID",
            "student_package",
            student_package_id,
            Select::table(&STUDENT_PACKAGES)
                .filter(Predicate::eq("student_package_id", student_package_id))
                .lock(RowLock::ForNoKeyUpdate),
        )
        .await
    }

    async fn get_student_package_for_upsert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        candidate: &StudentPackage,
    ) -> LedgerResult<Option<StudentPackageId>> {
        const OP: &str = "StudentPackageRepo.GetStudentPackageForUpsert";

        let package_filter = match &candidate.package_id {
            Some(id) => Predicate::eq("package_id", id),
            None => Predicate::IsNull("package_id"),
        };
        let stmt = Select::table(&STUDENT_PACKAGES)
            .only(&["student_package_id"])
            .filter(Predicate::eq("student_id", &candidate.student_id))
            .filter(package_filter)
            .filter(Predicate::ArrayOverlaps(
                "location_ids",
                candidate.location_ids.clone(),
            ))
            .active()
            .order_by("created_at", SortOrder::Asc)
            .limit(1);

        match db.query_row(ctx, &stmt.into()).await {
            Ok(row) => row
                .text("student_package_id")
                .map(Some)
                .map_err(|e| LedgerError::decode(OP, e)),
            Err(ExecError::NoRows) => Ok(None),
            Err(e) => Err(LedgerError::read(OP, e)),
        }
    }

    async fn soft_delete_by_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        ids: &[StudentPackageId],
        deleted_at: Timestamp,
    ) -> LedgerResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let stmt = soft_delete_update(
            &STUDENT_PACKAGES,
            vec![Predicate::any_of("student_package_id", ids)],
            deleted_at,
        );
        let rows = execute(ctx, db, "StudentPackageRepo.SoftDeleteByIDs", stmt).await?;
        info!(requested = ids.len(), rows, "student packages soft deleted");
        Ok(rows)
    }

    async fn get_student_packages_for_cronjob_by_day(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        days: Option<i64>,
    ) -> LedgerResult<Vec<StudentPackage>> {
        let window = lookback_window(
            self.clock.now(),
            days.unwrap_or(self.config.cronjob_lookback_days),
            self.config.timezone_offset_minutes,
        );
        let stmt = Select::table(&STUDENT_PACKAGES)
            .filter(Predicate::Ge("end_at", window.start.into()))
            .filter(Predicate::Le("end_at", window.end.into()))
            .active()
            .order_by("end_at", SortOrder::Asc)
            .order_by("student_package_id", SortOrder::Asc);

        let packages: Vec<StudentPackage> =
            fetch_all(ctx, db, "StudentPackageRepo.GetStudentPackagesForCronjobByDay", stmt)
                .await?;
        debug!(
            from = %window.start,
            to = %window.end,
            count = packages.len(),
            "expiration scan"
        );
        Ok(packages)
    }

    async fn cancel_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        let stmt = Update::table(&STUDENT_PACKAGES)
            .set("is_active", false)
            .set("end_at", now)
            .set("updated_at", now)
            .filter(Predicate::eq("student_package_id", student_package_id))
            .filter(Predicate::IsNull("deleted_at"));

        execute_expecting(ctx, db, "StudentPackageRepo.CancelByID", 1, stmt).await
    }

    async fn deactivate_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<()> {
        let stmt = Update::table(&STUDENT_PACKAGES)
            .set("is_active", false)
            .set("updated_at", self.clock.now())
            .filter(Predicate::eq("student_package_id", student_package_id))
            .filter(Predicate::IsNull("deleted_at"));

        execute_expecting(ctx, db, "StudentPackageRepo.DeactivateByID", 1, stmt).await
    }

    async fn update_time_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        start_at: Timestamp,
        end_at: Timestamp,
    ) -> LedgerResult<()> {
        const OP: &str = "StudentPackageRepo.UpdateTimeByID";
        if end_at < start_at {
            return Err(LedgerError::invalid_argument(OP, "end_at is before start_at"));
        }
        let stmt = Update::table(&STUDENT_PACKAGES)
            .set("start_at", start_at)
            .set("end_at", end_at)
            .set("updated_at", self.clock.now())
            .filter(Predicate::eq("student_package_id", student_package_id));

        execute_expecting(ctx, db, OP, 1, stmt).await
    }

    async fn get_by_student_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_ids: &[String],
    ) -> LedgerResult<Vec<StudentPackage>> {
        if student_ids.is_empty() {
            return Ok(Vec::new());
        }
        fetch_all(
            ctx,
            db,
            "StudentPackageRepo.GetByStudentIDs",
            Select::table(&STUDENT_PACKAGES)
                .filter(Predicate::any_of("student_id", student_ids))
                .active()
                .order_by("student_id", SortOrder::Asc)
                .order_by("start_at", SortOrder::Asc),
        )
        .await
    }
}
