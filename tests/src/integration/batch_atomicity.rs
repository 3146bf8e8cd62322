//! # Batch Atomicity
//!
//! Stores stop at the first failed statement but never undo what already ran.
//! These scenarios pin down what survives a failure with and without the
//! caller's transaction.

#[cfg(test)]
mod tests {
    use crate::fixtures::{day, grant, Ledger, COURSE, HEAD, STUDENT};
    use entitlement_ledger::{
        AccessPathRepo, AccessPathStore, AssociationStore, BatchFailure, BatchWriteCoordinator,
        ExecError, LedgerConfig, LedgerError, PackageCourse, RequestContext, StudentCourse,
        StudentCourseRepo, StudentCourseStore, StudentPackageAccessPath,
    };
    use std::sync::Arc;

    const LEDGER_TABLES: [&str; 5] = [
        "student_packages",
        "student_package_order",
        "student_course",
        "student_package_access_path",
        "student_package_log",
    ];

    fn path(location_id: &str) -> StudentPackageAccessPath {
        StudentPackageAccessPath {
            student_package_id: HEAD.into(),
            student_id: STUDENT.into(),
            course_id: COURSE.into(),
            location_id: location_id.into(),
            ..Default::default()
        }
    }

    fn course(location_id: &str) -> StudentCourse {
        StudentCourse {
            student_package_id: HEAD.into(),
            student_id: STUDENT.into(),
            course_id: COURSE.into(),
            location_id: location_id.into(),
            student_start_date: day(1, 1),
            student_end_date: day(3, 31),
            ..Default::default()
        }
    }

    // =============================================================================
    // MULTI-STORE FLOW
    // =============================================================================

    #[tokio::test]
    async fn test_failed_grant_rolls_back_every_table() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();

        let tx = ledger.db.begin(&ctx).await.unwrap();
        ledger.db.inject_failure_at(6);
        let result = ledger
            .service
            .grant_segment(&ctx, &tx, &grant("ord-1", day(1, 1), day(3, 31)))
            .await;
        assert!(result.is_err());
        assert!(tx.is_aborted());
        assert!(tx.commit().is_err());

        for table in LEDGER_TABLES {
            let rows = ledger.db.snapshot(table).await.unwrap();
            assert!(rows.is_empty(), "{} kept {} rows", table, rows.len());
        }
    }

    #[tokio::test]
    async fn test_failed_grant_without_transaction_leaves_partial_state() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();

        ledger.db.inject_failure_at(6);
        let result = ledger
            .service
            .grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await;
        assert!(result.is_err());

        let heads = ledger.db.snapshot("student_packages").await.unwrap();
        assert_eq!(heads.len(), 1);
        let logs = ledger.db.snapshot("student_package_log").await.unwrap();
        assert!(logs.is_empty());
    }

    // =============================================================================
    // SINGLE STORES
    // =============================================================================

    #[tokio::test]
    async fn test_course_loop_partial_unless_rolled_back() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let repo = StudentCourseRepo::new(ledger.clock.clone());
        let courses = [course("loc-1"), course("loc-2"), course("loc-3")];

        ledger.db.inject_failure_at(2);
        assert!(repo
            .upsert_student_course_data(&ctx, &ledger.db, &courses)
            .await
            .is_err());
        assert_eq!(ledger.db.snapshot("student_course").await.unwrap().len(), 1);

        let tx = ledger.db.begin(&ctx).await.unwrap();
        ledger.db.inject_failure_at(3);
        assert!(repo
            .upsert_student_course_data(&ctx, &tx, &courses)
            .await
            .is_err());
        tx.rollback();
        assert_eq!(ledger.db.snapshot("student_course").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_access_path_batch_reports_failing_index() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let repo = AccessPathRepo::new(ledger.clock.clone(), LedgerConfig::default());
        repo.insert(&ctx, &ledger.db, &path("loc-1")).await.unwrap();

        let tx = ledger.db.begin(&ctx).await.unwrap();
        let err = repo
            .insert_multi(&ctx, &tx, &[path("loc-2"), path("loc-1"), path("loc-3")])
            .await
            .unwrap_err();
        match err {
            LedgerError::BatchFailed {
                index,
                total,
                cause: BatchFailure::Exec(ExecError::UniqueViolation { .. }),
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        tx.rollback();

        let rows = ledger
            .db
            .snapshot("student_package_access_path")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("location_id").unwrap(), "loc-1");
    }

    #[tokio::test]
    async fn test_child_replacement_in_aborted_transaction_keeps_old_set() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let coordinator = Arc::new(BatchWriteCoordinator::new(
            ledger.clock.clone(),
            LedgerConfig::default(),
        ));
        let child = |course_id: &str| PackageCourse {
            course_id: course_id.into(),
            course_weight: 1,
            max_slots_per_course: 4,
            ..Default::default()
        };

        coordinator
            .upsert_package_courses(&ctx, &ledger.db, "pkg-1", &[child("c-1"), child("c-2")])
            .await
            .unwrap();

        let tx = ledger.db.begin(&ctx).await.unwrap();
        ledger.db.inject_failure_at(2);
        let err = coordinator
            .upsert_package_courses(&ctx, &tx, "pkg-1", &[child("c-3"), child("c-4")])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::BatchFailed { index: 1, total: 3, .. }));
        assert!(tx.commit().is_err());

        let kept: Vec<String> = coordinator
            .get_package_courses(&ctx, &ledger.db, "pkg-1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.course_id)
            .collect();
        assert_eq!(kept, vec!["c-1".to_string(), "c-2".to_string()]);
    }
}
