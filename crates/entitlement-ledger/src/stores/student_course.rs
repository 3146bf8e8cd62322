//! # Course Grant Projector
//!
//! Owns `student_course`: one row per (student, course, location, package).
//! Rows are derived from the current ledger segment by the entitlement service.

use super::{execute, execute_expecting, fetch_all};
use crate::domain::entities::StudentCourse;
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::ports::inbound::StudentCourseStore;
use crate::ports::outbound::{QueryExecutor, RequestContext, TimeSource};
use crate::sql::tables::STUDENT_COURSE;
use crate::sql::{
    soft_delete_update, ColumnScope, Insert, OnConflict, Predicate, RowLock, Select, SortOrder,
    Update,
};
use async_trait::async_trait;
use shared_types::{StudentPackageId, Timestamp};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct StudentCourseRepo {
    clock: Arc<dyn TimeSource>,
}

impl StudentCourseRepo {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self { clock }
    }

    fn by_package_and_course(student_package_id: &str, course_id: &str) -> [Predicate; 2] {
        [
            Predicate::eq("student_package_id", student_package_id),
            Predicate::eq("course_id", course_id),
        ]
    }
}

/// At least one row must match. Zero is reported as `NoRowAffected`.
fn require_some(op: &'static str, rows: u64) -> LedgerResult<u64> {
    if rows == 0 {
        Err(LedgerError::no_row_affected(op, 1, 0))
    } else {
        Ok(rows)
    }
}

#[async_trait]
impl StudentCourseStore for StudentCourseRepo {
    async fn upsert_student_course_data(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        courses: &[StudentCourse],
    ) -> LedgerResult<()> {
        for course in courses {
            self.upsert_student_course(ctx, db, course).await?;
        }
        debug!(count = courses.len(), "student courses upserted");
        Ok(())
    }

    async fn upsert_student_course(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        course: &StudentCourse,
    ) -> LedgerResult<()> {
        const OP: &str = "StudentCourseRepo.UpsertStudentCourse";
        if course.student_end_date < course.student_start_date {
            return Err(LedgerError::invalid_argument(
                OP,
                format!("course {} ends before it starts", course.course_id),
            ));
        }

        let now = self.clock.now();
        let row = StudentCourse {
            created_at: now,
            updated_at: now,
            ..course.clone()
        };
        let stmt = Insert::from_record(&row, ColumnScope::ExcludeAuditScope)
            .on_conflict(OnConflict::update_all(&STUDENT_COURSE));
        execute_expecting(ctx, db, OP, 1, stmt).await
    }

    async fn soft_delete_by_student_package_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_ids: &[StudentPackageId],
        deleted_at: Timestamp,
    ) -> LedgerResult<u64> {
        if student_package_ids.is_empty() {
            return Ok(0);
        }
        let stmt = soft_delete_update(
            &STUDENT_COURSE,
            vec![Predicate::any_of("student_package_id", student_package_ids)],
            deleted_at,
        );
        execute(ctx, db, "StudentCourseRepo.SoftDeleteByStudentPackageIDs", stmt).await
    }

    async fn void_student_courses_by_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        end_at: Timestamp,
        student_package_id: &str,
    ) -> LedgerResult<u64> {
        const OP: &str = "StudentCourseRepo.VoidStudentCoursesByStudentPackageID";
        let stmt = Update::table(&STUDENT_COURSE)
            .set("student_end_date", end_at)
            .set("updated_at", self.clock.now())
            .filter(Predicate::eq("student_package_id", student_package_id))
            .filter(Predicate::IsNotNull("deleted_at"));

        let rows = execute(ctx, db, OP, stmt).await?;
        if rows == 0 {
            warn!(student_package_id, "no soft-deleted course grant to void");
        }
        require_some(OP, rows)
    }

    async fn update_time_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        course_id: &str,
        start_at: Timestamp,
        end_at: Timestamp,
    ) -> LedgerResult<()> {
        const OP: &str = "StudentCourseRepo.UpdateTimeByID";
        if end_at < start_at {
            return Err(LedgerError::invalid_argument(OP, "end_at is before start_at"));
        }
        let mut stmt = Update::table(&STUDENT_COURSE)
            .set("student_start_date", start_at)
            .set("student_end_date", end_at)
            .set("updated_at", self.clock.now());
        stmt.filter
            .extend(Self::by_package_and_course(student_package_id, course_id));

        let rows = execute(ctx, db, OP, stmt).await?;
        require_some(OP, rows).map(|_| ())
    }

    async fn cancel_by_student_package_id_and_course_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        course_id: &str,
    ) -> LedgerResult<()> {
        const OP: &str = "StudentCourseRepo.CancelByStudentPackageIDAndCourseID";
        let stmt = soft_delete_update(
            &STUDENT_COURSE,
            Self::by_package_and_course(student_package_id, course_id).to_vec(),
            self.clock.now(),
        );
        let rows = execute(ctx, db, OP, stmt).await?;
        require_some(OP, rows).map(|_| ())
    }

    async fn get_student_courses_by_student_package_id_for_update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<Vec<StudentCourse>> {
        fetch_all(
            ctx,
            db,
            "StudentCourseRepo.GetStudentCoursesByStudentPackageIDForUpdate",
            Select::table(&STUDENT_COURSE)
                .filter(Predicate::eq("student_package_id", student_package_id))
                .active()
                .order_by("course_id", SortOrder::Asc)
                .lock(RowLock::ForUpdate),
        )
        .await
    }

    async fn get_student_courses_by_student_package_ids_for_update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_ids: &[StudentPackageId],
    ) -> LedgerResult<Vec<StudentCourse>> {
        if student_package_ids.is_empty() {
            return Ok(Vec::new());
        }
        fetch_all(
            ctx,
            db,
            "StudentCourseRepo.GetStudentCoursesByStudentPackageIDsForUpdate",
            Select::table(&STUDENT_COURSE)
                .filter(Predicate::any_of("student_package_id", student_package_ids))
                .active()
                .order_by("student_package_id", SortOrder::Asc)
                .order_by("course_id", SortOrder::Asc)
                .lock(RowLock::ForUpdate),
        )
        .await
    }
}
