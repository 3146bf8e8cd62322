//! # Ledger Scenarios
//!
//! One package walked through its whole life, each request in its own
//! transaction:
//!
//! 1. grant Jan-Mar (current), grant Apr-Jun (future)
//! 2. time passes, the expiration job moves the head onto Apr-Jun
//! 3. Apr-Jun is cancelled; nothing is left so the head and grants are withdrawn
//! 4. the cancellation is voided and every projection comes back

#[cfg(test)]
mod tests {
    use crate::fixtures::{day, grant, Ledger, COURSE, HEAD, STUDENT};
    use chrono::Duration;
    use entitlement_ledger::{
        PackageLogAction, RequestContext, SegmentState, StudentPackagePosition,
    };
    use shared_types::ErrorKind;

    // =============================================================================
    // FULL LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_grant_advance_cancel_void() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background().with_user("staff-1");
        let svc = &ledger.service;
        let stores = svc.stores();

        // Grants
        let tx = ledger.db.begin(&ctx).await.unwrap();
        let first = svc
            .grant_segment(&ctx, &tx, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();
        let second = svc
            .grant_segment(&ctx, &tx, &grant("ord-2", day(4, 1), day(6, 30)))
            .await
            .unwrap();
        tx.commit().unwrap();

        assert!(first.head_created);
        assert_eq!(first.position, StudentPackagePosition::Current);
        assert!(!second.head_created);
        assert_eq!(second.position, StudentPackagePosition::Future);

        // Expiration job picks up the head that ended on Mar 31
        ledger.clock.set(day(4, 15));
        let tx = ledger.db.begin(&ctx).await.unwrap();
        let report = svc.run_expiration_job(&ctx, &tx, Some(30)).await.unwrap();
        tx.commit().unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.advanced, 1);

        let head = stores.packages.get_by_id(&ctx, &ledger.db, HEAD).await.unwrap();
        assert_eq!(head.start_at, Some(day(4, 1)));
        assert_eq!(head.end_at, Some(day(6, 30)));
        let courses = stores
            .courses
            .get_student_courses_by_student_package_id_for_update(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].student_end_date, day(6, 30));

        // Cancel the only remaining live window
        let tx = ledger.db.begin(&ctx).await.unwrap();
        let cancelled = svc
            .cancel_segment(&ctx, &tx, HEAD, day(4, 15))
            .await
            .unwrap();
        tx.commit().unwrap();
        assert!(cancelled.head_cancelled);
        assert!(cancelled.current.is_none());
        assert_eq!(
            cancelled.cancelled.student_package_order_id,
            second.segment.student_package_order_id
        );

        let head = stores.packages.get_by_id(&ctx, &ledger.db, HEAD).await.unwrap();
        assert!(!head.is_active);
        assert_eq!(head.end_at, Some(day(4, 15)));
        assert!(stores
            .courses
            .get_student_courses_by_student_package_id_for_update(&ctx, &ledger.db, HEAD)
            .await
            .unwrap()
            .is_empty());
        assert!(stores
            .access_paths
            .get_by_student_id_and_course_id(&ctx, &ledger.db, STUDENT, COURSE)
            .await
            .unwrap()
            .is_none());

        // Void the cancellation
        ledger.clock.advance(Duration::minutes(1));
        let tx = ledger.db.begin(&ctx).await.unwrap();
        let restored = svc
            .void_cancellation(&ctx, &tx, &second.segment.student_package_order_id)
            .await
            .unwrap()
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(
            restored.student_package_order_id,
            second.segment.student_package_order_id
        );

        let head = stores.packages.get_by_id(&ctx, &ledger.db, HEAD).await.unwrap();
        assert!(head.is_active);
        assert_eq!(head.end_at, Some(day(6, 30)));
        let courses = stores
            .courses
            .get_student_courses_by_student_package_id_for_update(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].student_end_date, day(6, 30));
        assert!(stores
            .access_paths
            .get_by_student_id_and_course_id(&ctx, &ledger.db, STUDENT, COURSE)
            .await
            .unwrap()
            .is_some());

        // Audit trail
        let actions: Vec<PackageLogAction> = stores
            .logs
            .get_by_student_package_id(&ctx, &ledger.db, HEAD)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                PackageLogAction::Upserted,
                PackageLogAction::Upserted,
                PackageLogAction::Canceled,
                PackageLogAction::Voided,
            ]
        );
    }

    // =============================================================================
    // CANCELLATION HAND-OFF
    // =============================================================================

    #[tokio::test]
    async fn test_cancel_current_hands_flag_to_next_segment() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;

        svc.grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();
        let next = svc
            .grant_segment(&ctx, &ledger.db, &grant("ord-2", day(4, 1), day(6, 30)))
            .await
            .unwrap();

        let outcome = svc
            .cancel_segment(&ctx, &ledger.db, HEAD, day(2, 1))
            .await
            .unwrap();
        assert!(!outcome.head_cancelled);
        let current = outcome.current.unwrap();
        assert_eq!(
            current.student_package_order_id,
            next.segment.student_package_order_id
        );

        let head = svc
            .stores()
            .packages
            .get_by_id(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert!(head.is_active);
        assert_eq!(head.start_at, Some(day(4, 1)));
        assert_eq!(head.end_at, Some(day(6, 30)));
    }

    #[tokio::test]
    async fn test_void_after_flag_moved_restores_first_segment() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;

        let first = svc
            .grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();
        let next = svc
            .grant_segment(&ctx, &ledger.db, &grant("ord-2", day(4, 1), day(6, 30)))
            .await
            .unwrap();
        svc.cancel_segment(&ctx, &ledger.db, HEAD, day(2, 1))
            .await
            .unwrap();

        let current = svc
            .void_cancellation(&ctx, &ledger.db, &first.segment.student_package_order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            current.student_package_order_id,
            first.segment.student_package_order_id
        );

        let states = svc
            .order_service()
            .segment_states(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(
            states[0],
            (first.segment.student_package_order_id.clone(), SegmentState::Current)
        );
        assert_ne!(states[1].1, SegmentState::Current);
        assert_eq!(states[1].0, next.segment.student_package_order_id);

        let head = svc
            .stores()
            .packages
            .get_by_id(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(head.start_at, Some(day(1, 1)));
        assert_eq!(head.end_at, Some(day(3, 31)));
    }

    #[tokio::test]
    async fn test_cancel_future_segment_keeps_current() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;

        let first = svc
            .grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();
        svc.grant_segment(&ctx, &ledger.db, &grant("ord-2", day(4, 1), day(6, 30)))
            .await
            .unwrap();

        let outcome = svc
            .cancel_segment(&ctx, &ledger.db, HEAD, day(5, 1))
            .await
            .unwrap();
        assert!(outcome.current.is_none());
        assert!(!outcome.head_cancelled);

        let states = svc
            .order_service()
            .segment_states(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(
            states,
            vec![(first.segment.student_package_order_id, SegmentState::Current)]
        );
    }

    #[tokio::test]
    async fn test_cancel_without_segment_at_time_is_not_found() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        ledger
            .service
            .grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();

        let err = ledger
            .service
            .cancel_segment(&ctx, &ledger.db, HEAD, day(8, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_void_of_live_segment_is_refused() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let granted = ledger
            .service
            .grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();

        let err = ledger
            .service
            .void_cancellation(&ctx, &ledger.db, &granted.segment.student_package_order_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    }

    // =============================================================================
    // SUPERSESSION AND POINT-IN-TIME READS
    // =============================================================================

    #[tokio::test]
    async fn test_extension_supersedes_previous_segment() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;

        let first = svc
            .grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();
        let mut extension = grant("ord-2", day(4, 1), day(6, 30));
        extension.from_student_package_order_id =
            Some(first.segment.student_package_order_id.clone());
        let second = svc
            .grant_segment(&ctx, &ledger.db, &extension)
            .await
            .unwrap();

        ledger.clock.set(day(4, 2));
        svc.expire_package(&ctx, &ledger.db, HEAD).await.unwrap();

        let states = svc
            .order_service()
            .segment_states(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(
            states,
            vec![
                (first.segment.student_package_order_id, SegmentState::Superseded),
                (second.segment.student_package_order_id.clone(), SegmentState::Current),
            ]
        );

        let active = svc
            .stores()
            .orders
            .get_active_orders_by_user_id_and_time(&ctx, &ledger.db, STUDENT, day(5, 1))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(
            active[0].student_package_order_id,
            second.segment.student_package_order_id
        );
    }

    #[tokio::test]
    async fn test_grant_at_other_location_opens_new_head() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;
        svc.grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();

        let mut elsewhere = grant("ord-2", day(1, 1), day(3, 31));
        elsewhere.student_package_id = None;
        elsewhere.location_ids = vec!["loc-2".into()];
        let outcome = svc
            .grant_segment(&ctx, &ledger.db, &elsewhere)
            .await
            .unwrap();

        assert!(outcome.head_created);
        assert_ne!(outcome.student_package_id, HEAD);
        assert_eq!(outcome.position, StudentPackagePosition::Current);

        let heads = svc
            .stores()
            .packages
            .get_by_student_ids(&ctx, &ledger.db, &[STUDENT.to_string()])
            .await
            .unwrap();
        assert_eq!(heads.len(), 2);
    }

    #[tokio::test]
    async fn test_new_head_does_not_revive_cancelled_head_paths() {
        let ledger = Ledger::at(day(2, 1));
        let ctx = RequestContext::background();
        let svc = &ledger.service;
        svc.grant_segment(&ctx, &ledger.db, &grant("ord-1", day(1, 1), day(3, 31)))
            .await
            .unwrap();
        let cancelled = svc
            .cancel_segment(&ctx, &ledger.db, HEAD, day(2, 1))
            .await
            .unwrap();
        assert!(cancelled.head_cancelled);

        let mut elsewhere = grant("ord-2", day(2, 1), day(4, 30));
        elsewhere.student_package_id = Some("sp-2".into());
        elsewhere.location_ids = vec!["loc-2".into()];
        let outcome = svc
            .grant_segment(&ctx, &ledger.db, &elsewhere)
            .await
            .unwrap();
        assert!(outcome.head_created);

        let live: Vec<(String, String)> = ledger
            .db
            .snapshot("student_package_access_path")
            .await
            .unwrap()
            .iter()
            .filter(|r| matches!(r.opt_timestamp("deleted_at"), Ok(None)))
            .map(|r| {
                (
                    r.text("student_package_id").unwrap(),
                    r.text("location_id").unwrap(),
                )
            })
            .collect();
        assert_eq!(live, vec![("sp-2".to_string(), "loc-2".to_string())]);

        let map = svc
            .stores()
            .access_paths
            .get_map_student_course_key_with_student_package_access_path_by_student_ids(
                &ctx,
                &ledger.db,
                &[STUDENT.to_string()],
            )
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.values().next().map(|p| p.student_package_id.as_str()),
            Some("sp-2")
        );
    }
}
