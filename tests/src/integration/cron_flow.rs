//! # Cron Flow
//!
//! The expiration job scans heads whose `end_at` falls in the look-back window
//! and brings each one in line with the segment that should be current.

#[cfg(test)]
mod tests {
    use crate::fixtures::{day, grant, Ledger, COURSE, HEAD, STUDENT};
    use chrono::Duration;
    use entitlement_ledger::{
        ExpirationAction, ExpirationReport, LedgerConfig, PackageLogAction, RequestContext,
    };

    #[tokio::test]
    async fn test_expired_head_is_withdrawn_once() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;
        let stores = svc.stores();
        let granted = svc
            .grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();

        ledger.clock.set(day(4, 2) + Duration::hours(3));
        let report = svc
            .run_expiration_job(&ctx, &ledger.db, Some(3))
            .await
            .unwrap();
        assert_eq!(
            report,
            ExpirationReport {
                scanned: 1,
                expired: 1,
                ..Default::default()
            }
        );

        let head = stores.packages.get_by_id(&ctx, &ledger.db, HEAD).await.unwrap();
        assert!(!head.is_active);
        assert_eq!(head.end_at, Some(day(3, 31)));

        let courses = ledger.db.snapshot("student_course").await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].timestamp("student_end_date").unwrap(), day(3, 31));
        assert!(courses[0].opt_timestamp("deleted_at").unwrap().is_some());

        assert!(stores
            .access_paths
            .get_by_student_id_and_course_id(&ctx, &ledger.db, STUDENT, COURSE)
            .await
            .unwrap()
            .is_none());

        let segment = stores
            .orders
            .get_by_id(&ctx, &ledger.db, &granted.segment.student_package_order_id)
            .await
            .unwrap();
        assert!(segment.is_executed_by_cronjob);
        assert!(!segment.is_current_student_package);

        let logs = stores
            .logs
            .get_by_student_package_id(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(logs.last().map(|l| l.action), Some(PackageLogAction::Expired));
        assert_eq!(logs.last().and_then(|l| l.course_id.clone()), None);

        // Second run sees an inactive head and leaves it alone
        let again = svc
            .run_expiration_job(&ctx, &ledger.db, Some(3))
            .await
            .unwrap();
        assert_eq!(again.expired, 0);
        assert_eq!(again.unchanged, again.scanned);
    }

    #[tokio::test]
    async fn test_head_ending_later_today_is_unchanged() {
        let ledger = Ledger::at(day(3, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;
        svc.grant_segment(
            &ctx,
            &ledger.db,
            &grant("ord-1", day(2, 1), day(3, 1) + Duration::hours(20)),
        )
        .await
        .unwrap();

        ledger.clock.set(day(3, 1) + Duration::hours(9));
        let report = svc.run_expiration_job(&ctx, &ledger.db, None).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.unchanged, 1);

        let head = svc
            .stores()
            .packages
            .get_by_id(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert!(head.is_active);
    }

    #[tokio::test]
    async fn test_lookback_window_limits_scan() {
        let ledger = Ledger::with_config(
            day(2, 1),
            LedgerConfig {
                cronjob_lookback_days: 1,
                ..Default::default()
            },
        );
        let ctx = RequestContext::background();
        let svc = &ledger.service;
        svc.grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();

        ledger.clock.set(day(4, 20));
        let narrow = svc.run_expiration_job(&ctx, &ledger.db, None).await.unwrap();
        assert_eq!(narrow.scanned, 0);

        let wide = svc
            .run_expiration_job(&ctx, &ledger.db, Some(30))
            .await
            .unwrap();
        assert_eq!(wide.scanned, 1);
        assert_eq!(wide.expired, 1);
    }

    #[tokio::test]
    async fn test_expire_package_advances_into_future_segment() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;
        svc.grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();
        let next = svc
            .grant_segment(&ctx, &ledger.db, &grant("ord-2", day(5, 1), day(7, 31)))
            .await
            .unwrap();

        // Gap between the two windows: the later one becomes current early
        ledger.clock.set(day(4, 10));
        let action = svc.expire_package(&ctx, &ledger.db, HEAD).await.unwrap();
        assert_eq!(action, ExpirationAction::Advanced);

        let head = svc
            .stores()
            .packages
            .get_by_id(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(head.start_at, Some(day(5, 1)));
        assert_eq!(head.end_at, Some(day(7, 31)));

        let segment = svc
            .stores()
            .orders
            .get_by_id(&ctx, &ledger.db, &next.segment.student_package_order_id)
            .await
            .unwrap();
        assert!(segment.is_current_student_package);
        assert!(segment.is_executed_by_cronjob);

        let again = svc.expire_package(&ctx, &ledger.db, HEAD).await.unwrap();
        assert_eq!(again, ExpirationAction::Unchanged);
    }

    #[tokio::test]
    async fn test_job_runs_inside_one_transaction() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;
        svc.grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();

        ledger.clock.set(day(4, 1));
        let tx = ledger.db.begin(&ctx).await.unwrap();
        let report = svc.run_expiration_job(&ctx, &tx, Some(2)).await.unwrap();
        assert_eq!(report.expired, 1);
        tx.rollback();

        let head = svc
            .stores()
            .packages
            .get_by_id(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert!(head.is_active);
    }
}
