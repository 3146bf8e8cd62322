//! Append-only audit trail in `student_package_log`.

use super::{execute_expecting, fetch_all};
use crate::domain::entities::StudentPackageLog;
use crate::domain::errors::LedgerResult;
use crate::ports::inbound::StudentPackageLogStore;
use crate::ports::outbound::{QueryExecutor, RequestContext, TimeSource};
use crate::sql::tables::STUDENT_PACKAGE_LOG;
use crate::sql::{ColumnScope, Insert, Predicate, Select, SortOrder};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub struct StudentPackageLogRepo {
    clock: Arc<dyn TimeSource>,
}

impl StudentPackageLogRepo {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl StudentPackageLogStore for StudentPackageLogRepo {
    async fn create(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        log: &StudentPackageLog,
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        let mut entry = log.clone();
        if entry.student_package_log_id.is_empty() {
            entry.student_package_log_id = Uuid::new_v4().to_string();
        }
        if entry.user_id.is_none() {
            entry.user_id = ctx.user_id.clone();
        }
        entry.created_at = now;
        entry.updated_at = now;

        execute_expecting(
            ctx,
            db,
            "StudentPackageLogRepo.Create",
            1,
            Insert::from_record(&entry, ColumnScope::ExcludeAuditScope),
        )
        .await
    }

    async fn get_by_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<Vec<StudentPackageLog>> {
        fetch_all(
            ctx,
            db,
            "StudentPackageLogRepo.GetByStudentPackageID",
            Select::table(&STUDENT_PACKAGE_LOG)
                .filter(Predicate::eq("student_package_id", student_package_id))
                .order_by("created_at", SortOrder::Asc),
        )
        .await
    }
}
