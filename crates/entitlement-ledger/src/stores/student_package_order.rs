//! # Temporal Order Ledger
//!
//! Owns `student_package_order`. Each row is one segment of a package's life.
//!
//! ## Current flag
//!
//! `reset_current_position` followed by `set_current_student_package_by_id`
//! moves the flag. The pair is not atomic on its own: it must run inside the
//! caller's transaction, and the partial unique index rejects a second
//! current segment if it is ever attempted.

use super::{execute, execute_expecting, fetch_all, fetch_one, fetch_optional};
use crate::domain::entities::StudentPackageOrder;
use crate::domain::errors::LedgerResult;
use crate::ports::inbound::StudentPackageOrderStore;
use crate::ports::outbound::{QueryExecutor, RequestContext, TimeSource};
use crate::sql::tables::STUDENT_PACKAGE_ORDER;
use crate::sql::{
    revert_update, soft_delete_update, ColumnScope, Insert, OnConflict, Predicate, Record,
    RowLock, Select, SortOrder, Update,
};
use async_trait::async_trait;
use shared_types::Timestamp;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Columns an upsert conflict overwrites.
const UPSERT_FIELDS: &[&str] = &[
    "start_at",
    "end_at",
    "student_package_object",
    "is_current_student_package",
    "from_student_package_order_id",
    "updated_at",
];

pub struct StudentPackageOrderRepo {
    clock: Arc<dyn TimeSource>,
}

impl StudentPackageOrderRepo {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self { clock }
    }

    fn by_id(student_package_order_id: &str) -> Predicate {
        Predicate::eq("student_package_order_id", student_package_order_id)
    }
}

#[async_trait]
impl StudentPackageOrderStore for StudentPackageOrderRepo {
    async fn create(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        order: &StudentPackageOrder,
    ) -> LedgerResult<StudentPackageOrder> {
        let now = self.clock.now();
        let segment = StudentPackageOrder {
            student_package_order_id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            ..order.clone()
        };
        execute_expecting(
            ctx,
            db,
            "StudentPackageOrderRepo.Create",
            1,
            Insert::from_record(&segment, ColumnScope::ExcludeAuditScope),
        )
        .await?;

        info!(
            student_package_id = %segment.student_package_id,
            student_package_order_id = %segment.student_package_order_id,
            start_at = %segment.start_at,
            end_at = %segment.end_at,
            current = segment.is_current_student_package,
            "ledger segment created"
        );
        Ok(segment)
    }

    async fn upsert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        order: &StudentPackageOrder,
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        let segment = StudentPackageOrder {
            created_at: now,
            updated_at: now,
            ..order.clone()
        };
        let stmt = Insert::from_record(&segment, ColumnScope::ExcludeAuditScope).on_conflict(
            OnConflict::DoUpdate {
                target: STUDENT_PACKAGE_ORDER.primary_key.to_vec(),
                set: UPSERT_FIELDS.to_vec(),
            },
        );
        execute_expecting(ctx, db, "StudentPackageOrderRepo.Upsert", 1, stmt).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        order: &StudentPackageOrder,
    ) -> LedgerResult<()> {
        let segment = StudentPackageOrder {
            updated_at: self.clock.now(),
            ..order.clone()
        };
        let row = segment.to_row();
        let mut stmt = Update::table(&STUDENT_PACKAGE_ORDER)
            .filter(Self::by_id(&segment.student_package_order_id));
        for column in STUDENT_PACKAGE_ORDER.mutable_columns() {
            stmt = stmt.set(column, row.value_or_null(column));
        }
        execute_expecting(ctx, db, "StudentPackageOrderRepo.Update", 1, stmt).await
    }

    async fn reset_current_position(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<u64> {
        let stmt = Update::table(&STUDENT_PACKAGE_ORDER)
            .set("is_current_student_package", false)
            .set("updated_at", self.clock.now())
            .filter(Predicate::eq("student_package_id", student_package_id))
            .filter(Predicate::IsNull("deleted_at"));
        let rows = execute(ctx, db, "StudentPackageOrderRepo.ResetCurrentPosition", stmt).await?;
        debug!(student_package_id, rows, "current position reset");
        Ok(rows)
    }

    async fn set_current_student_package_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
        is_current: bool,
    ) -> LedgerResult<()> {
        let stmt = Update::table(&STUDENT_PACKAGE_ORDER)
            .set("is_current_student_package", is_current)
            .set("updated_at", self.clock.now())
            .filter(Self::by_id(student_package_order_id));
        execute_expecting(
            ctx,
            db,
            "StudentPackageOrderRepo.SetCurrentStudentPackageByID",
            1,
            stmt,
        )
        .await
    }

    async fn get_student_package_orders_by_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<Vec<StudentPackageOrder>> {
        fetch_all(
            ctx,
            db,
            "StudentPackageOrderRepo.GetStudentPackageOrdersByStudentPackageID",
            Select::table(&STUDENT_PACKAGE_ORDER)
                .filter(Predicate::eq("student_package_id", student_package_id))
                .active()
                .order_by("start_at", SortOrder::Asc),
        )
        .await
    }

    async fn get_student_package_order_by_time_and_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        at: Timestamp,
    ) -> LedgerResult<Option<StudentPackageOrder>> {
        fetch_optional(
            ctx,
            db,
            "StudentPackageOrderRepo.GetStudentPackageOrderByTimeAndStudentPackageID",
            Select::table(&STUDENT_PACKAGE_ORDER)
                .filter(Predicate::eq("student_package_id", student_package_id))
                .filter(Predicate::Le("start_at", at.into()))
                .filter(Predicate::Ge("end_at", at.into()))
                .active()
                .order_by("start_at", SortOrder::Asc)
                .limit(1)
                .lock(RowLock::ForNoKeyUpdate),
        )
        .await
    }

    async fn soft_delete_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<()> {
        let stmt = soft_delete_update(
            &STUDENT_PACKAGE_ORDER,
            vec![Self::by_id(student_package_order_id)],
            self.clock.now(),
        );
        execute_expecting(ctx, db, "StudentPackageOrderRepo.SoftDeleteByID", 1, stmt).await?;
        info!(student_package_order_id, "ledger segment cancelled");
        Ok(())
    }

    async fn revert_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<()> {
        // Comes back non-current; the caller recomputes the current segment.
        let stmt = revert_update(
            &STUDENT_PACKAGE_ORDER,
            vec![Self::by_id(student_package_order_id)],
            self.clock.now(),
        )
        .set("is_current_student_package", false);
        execute_expecting(ctx, db, "StudentPackageOrderRepo.RevertByID", 1, stmt).await?;
        info!(student_package_order_id, "ledger segment reinstated");
        Ok(())
    }

    async fn update_execute_error(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
        executed_error: &str,
    ) -> LedgerResult<()> {
        let stmt = Update::table(&STUDENT_PACKAGE_ORDER)
            .set("executed_error", executed_error)
            .set("updated_at", self.clock.now())
            .filter(Self::by_id(student_package_order_id));
        execute_expecting(ctx, db, "StudentPackageOrderRepo.UpdateExecuteError", 1, stmt).await
    }

    async fn update_execute_status(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
        is_executed_by_cronjob: bool,
    ) -> LedgerResult<()> {
        let stmt = Update::table(&STUDENT_PACKAGE_ORDER)
            .set("is_executed_by_cronjob", is_executed_by_cronjob)
            .set("updated_at", self.clock.now())
            .filter(Self::by_id(student_package_order_id));
        execute_expecting(ctx, db, "StudentPackageOrderRepo.UpdateExecuteStatus", 1, stmt).await
    }

    async fn get_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<StudentPackageOrder> {
        fetch_one(
            ctx,
            db,
            "StudentPackageOrderRepo.GetByID",
            "student_package_order",
            student_package_order_id,
            Select::table(&STUDENT_PACKAGE_ORDER).filter(Self::by_id(student_package_order_id)),
        )
        .await
    }

    async fn get_by_student_package_id_and_order_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        order_id: &str,
    ) -> LedgerResult<Option<StudentPackageOrder>> {
        fetch_optional(
            ctx,
            db,
            "StudentPackageOrderRepo.GetByStudentPackageIDAndOrderID",
            Select::table(&STUDENT_PACKAGE_ORDER)
                .filter(Predicate::eq("student_package_id", student_package_id))
                .filter(Predicate::eq("order_id", order_id))
                .active()
                .order_by("created_at", SortOrder::Desc)
                .limit(1),
        )
        .await
    }

    async fn get_active_orders_by_user_id_and_time(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        user_id: &str,
        at: Timestamp,
    ) -> LedgerResult<Vec<StudentPackageOrder>> {
        fetch_all(
            ctx,
            db,
            "StudentPackageOrderRepo.GetActiveOrdersByUserIDAndTime",
            Select::table(&STUDENT_PACKAGE_ORDER)
                .filter(Predicate::eq("user_id", user_id))
                .filter(Predicate::Le("start_at", at.into()))
                .filter(Predicate::Ge("end_at", at.into()))
                .active()
                .order_by("start_at", SortOrder::Asc),
        )
        .await
    }
}
