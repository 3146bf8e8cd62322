//! # Access Path Projector
//!
//! Owns `student_package_access_path`, the per-course grant markers read by
//! authorization checks.
//!
//! `check_exist_student_package_access_path` has an inverted contract: `Ok`
//! means no live path exists, a live path is `PreconditionViolation`.

use super::{execute, execute_expecting, fetch_all, fetch_optional};
use crate::config::LedgerConfig;
use crate::domain::entities::StudentPackageAccessPath;
use crate::domain::errors::{BatchFailure, LedgerError, LedgerResult};
use crate::ports::inbound::AccessPathStore;
use crate::ports::outbound::{QueryExecutor, RequestContext, TimeSource};
use crate::sql::tables::STUDENT_PACKAGE_ACCESS_PATH;
use crate::sql::{
    revert_update, soft_delete_update, Batch, ColumnScope, Insert, OnConflict, Predicate, Select,
    SortOrder, Statement,
};
use async_trait::async_trait;
use shared_types::{student_course_key, StudentPackageId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AccessPathRepo {
    clock: Arc<dyn TimeSource>,
    config: LedgerConfig,
}

impl AccessPathRepo {
    pub fn new(clock: Arc<dyn TimeSource>, config: LedgerConfig) -> Self {
        Self { clock, config }
    }

    /// Fresh row: `access_path` and `deleted_at` cleared, timestamps stamped.
    fn fresh(&self, path: &StudentPackageAccessPath) -> StudentPackageAccessPath {
        let now = self.clock.now();
        StudentPackageAccessPath {
            access_path: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            ..path.clone()
        }
    }

    fn by_pair(student_id: &str, course_id: &str) -> Vec<Predicate> {
        vec![
            Predicate::eq("student_id", student_id),
            Predicate::eq("course_id", course_id),
        ]
    }

    /// Run `statements` as one pipelined batch where every item must touch exactly one row.
    async fn send_each_one_row(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        op: &'static str,
        statements: Vec<Statement>,
    ) -> LedgerResult<()> {
        let total = statements.len();
        if total == 0 {
            return Ok(());
        }
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
        for stmt in statements {
            batch.queue(stmt);
        }
        let results = db.send_batch(ctx, &batch).await;

        for (index, outcome) in results.outcomes.iter().enumerate() {
            let cause = match outcome {
                Ok(1) => continue,
                Ok(_) => BatchFailure::NoRowAffected,
                Err(e) => BatchFailure::Exec(e.clone()),
            };
            warn!(op, index, total, %cause, "access path batch aborted");
            return Err(LedgerError::BatchFailed {
                op,
                index,
                total,
                cause,
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
        debug!(op, total, "access path batch applied");
        Ok(())
    }
}

#[async_trait]
impl AccessPathStore for AccessPathRepo {
    async fn insert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        path: &StudentPackageAccessPath,
    ) -> LedgerResult<()> {
        let stmt = Insert::from_record(&self.fresh(path), ColumnScope::ExcludeAuditScope);
        execute_expecting(ctx, db, "AccessPathRepo.Insert", 1, stmt).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        path: &StudentPackageAccessPath,
    ) -> LedgerResult<()> {
        let stmt = Insert::from_record(&self.fresh(path), ColumnScope::ExcludeAuditScope)
            .on_conflict(OnConflict::DoNothing);
        execute(ctx, db, "AccessPathRepo.Update", stmt).await.map(|_| ())
    }

    async fn insert_multi(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        paths: &[StudentPackageAccessPath],
    ) -> LedgerResult<()> {
        let statements: Vec<Statement> = paths
            .iter()
            .map(|p| Insert::from_record(&self.fresh(p), ColumnScope::ExcludeAuditScope).into())
            .collect();
        self.send_each_one_row(ctx, db, "AccessPathRepo.InsertMulti", statements)
            .await
    }

    async fn delete_multi(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        paths: &[StudentPackageAccessPath],
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        let statements: Vec<Statement> = paths
            .iter()
            .map(|p| {
                soft_delete_update(
                    &STUDENT_PACKAGE_ACCESS_PATH,
                    vec![
                        Predicate::eq("student_package_id", &p.student_package_id),
                        Predicate::eq("student_id", &p.student_id),
                        Predicate::eq("course_id", &p.course_id),
                        Predicate::eq("location_id", &p.location_id),
                    ],
                    now,
                )
                .into()
            })
            .collect();
        self.send_each_one_row(ctx, db, "AccessPathRepo.DeleteMulti", statements)
            .await
    }

    async fn check_exist_student_package_access_path(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_id: &str,
        course_id: &str,
    ) -> LedgerResult<()> {
        const OP: &str = "AccessPathRepo.CheckExistStudentPackageAccessPath";
        let mut stmt = Select::table(&STUDENT_PACKAGE_ACCESS_PATH).limit(1);
        stmt.filter = Self::by_pair(student_id, course_id);

        let existing: Option<StudentPackageAccessPath> =
            fetch_optional(ctx, db, OP, stmt.active()).await?;
        match existing {
            None => Ok(()),
            Some(path) => Err(LedgerError::precondition(
                OP,
                format!(
                    "duplicate student package access path: student {} already has course {} through package {}",
                    student_id, course_id, path.student_package_id
                ),
            )),
        }
    }

    async fn revert_by_student_id_and_course_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_id: &str,
        course_id: &str,
    ) -> LedgerResult<()> {
        const OP: &str = "AccessPathRepo.RevertByStudentIDAndCourseID";
        let stmt = revert_update(
            &STUDENT_PACKAGE_ACCESS_PATH,
            Self::by_pair(student_id, course_id),
            self.clock.now(),
        );
        let rows = execute(ctx, db, OP, stmt).await?;
        if rows == 0 {
            return Err(LedgerError::no_row_affected(OP, 1, 0));
        }
        Ok(())
    }

    async fn revert_by_student_package_id_and_course_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        student_id: &str,
        course_id: &str,
    ) -> LedgerResult<()> {
        const OP: &str = "AccessPathRepo.RevertByStudentPackageIDAndCourseID";
        let mut filter = Self::by_pair(student_id, course_id);
        filter.push(Predicate::eq("student_package_id", student_package_id));
        let stmt = revert_update(&STUDENT_PACKAGE_ACCESS_PATH, filter, self.clock.now());
        let rows = execute(ctx, db, OP, stmt).await?;
        if rows == 0 {
            return Err(LedgerError::no_row_affected(OP, 1, 0));
        }
        Ok(())
    }

    async fn get_map_student_course_key_with_student_package_access_path_by_student_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_ids: &[String],
    ) -> LedgerResult<HashMap<String, StudentPackageAccessPath>> {
        if student_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let paths: Vec<StudentPackageAccessPath> = fetch_all(
            ctx,
            db,
            "AccessPathRepo.GetMapStudentCourseKeyWithStudentPackageAccessPathByStudentIDs",
            Select::table(&STUDENT_PACKAGE_ACCESS_PATH)
                .filter(Predicate::any_of("student_id", student_ids))
                .active(),
        )
        .await?;

        Ok(paths
            .into_iter()
            .map(|p| (student_course_key(&p.student_id, &p.course_id), p))
            .collect())
    }

    async fn get_by_student_id_and_course_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_id: &str,
        course_id: &str,
    ) -> LedgerResult<Option<StudentPackageAccessPath>> {
        let mut stmt = Select::table(&STUDENT_PACKAGE_ACCESS_PATH)
            .order_by("created_at", SortOrder::Desc)
            .limit(1);
        stmt.filter = Self::by_pair(student_id, course_id);
        fetch_optional(
            ctx,
            db,
            "AccessPathRepo.GetByStudentIDAndCourseID",
            stmt.active(),
        )
        .await
    }

    async fn delete_by_student_package_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_ids: &[StudentPackageId],
    ) -> LedgerResult<u64> {
        if student_package_ids.is_empty() {
            return Ok(0);
        }
        let stmt = soft_delete_update(
            &STUDENT_PACKAGE_ACCESS_PATH,
            vec![Predicate::any_of("student_package_id", student_package_ids)],
            self.clock.now(),
        );
        execute(ctx, db, "AccessPathRepo.DeleteByStudentPackageIDs", stmt).await
    }
}
