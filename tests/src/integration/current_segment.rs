//! # Current Segment Property
//!
//! Whatever sequence of flag moves, soft deletes and reverts a package goes
//! through, at most one live segment carries `is_current_student_package`.

#[cfg(test)]
mod tests {
    use crate::fixtures::{day, HEAD, STUDENT};
    use entitlement_ledger::sql::Row;
    use entitlement_ledger::{
        FixedTimeSource, InMemoryDatabase, OrderService, RequestContext, StudentPackageOrder,
        StudentPackageOrderRepo, StudentPackageOrderStore,
    };
    use proptest::prelude::*;
    use std::sync::Arc;

    const SEGMENTS: usize = 4;

    #[derive(Debug, Clone)]
    enum Op {
        Reset,
        SetCurrent(usize),
        SoftDelete(usize),
        Revert(usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Reset),
            (0..SEGMENTS).prop_map(Op::SetCurrent),
            (0..SEGMENTS).prop_map(Op::SoftDelete),
            (0..SEGMENTS).prop_map(Op::Revert),
        ]
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    /// Segment `i` covers the 1st to the 28th of month `2 * i + 2`.
    async fn seeded(
        clock: Arc<FixedTimeSource>,
    ) -> (Arc<StudentPackageOrderRepo>, InMemoryDatabase, Vec<String>) {
        let repo = Arc::new(StudentPackageOrderRepo::new(clock));
        let db = InMemoryDatabase::new();
        let ctx = RequestContext::background();
        let mut ids = Vec::with_capacity(SEGMENTS);
        for i in 0..SEGMENTS {
            let month = 2 * i as u32 + 2;
            let segment = StudentPackageOrder {
                student_package_id: HEAD.into(),
                user_id: STUDENT.into(),
                order_id: format!("ord-{}", i),
                course_id: "c-1".into(),
                start_at: day(month, 1),
                end_at: day(month, 28),
                ..Default::default()
            };
            let created = repo.create(&ctx, &db, &segment).await.unwrap();
            ids.push(created.student_package_order_id);
        }
        (repo, db, ids)
    }

    fn live_current(rows: &[Row]) -> usize {
        rows.iter()
            .filter(|r| r.boolean("is_current_student_package").unwrap_or(false))
            .filter(|r| matches!(r.opt_timestamp("deleted_at"), Ok(None)))
            .count()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn at_most_one_live_current_segment(ops in prop::collection::vec(arb_op(), 1..24)) {
            let clock = Arc::new(FixedTimeSource::new(day(1, 1)));
            let (worst, failed_reverts) = runtime().block_on(async {
                let (repo, db, ids) = seeded(clock).await;
                let ctx = RequestContext::background();
                let mut deleted = [false; SEGMENTS];
                let mut worst = 0;
                let mut failed_reverts = 0;
                for op in ops {
                    match op {
                        // Rejected flag moves are expected; only the stored state matters.
                        Op::Reset => {
                            let _ = repo.reset_current_position(&ctx, &db, HEAD).await;
                        }
                        Op::SetCurrent(i) => {
                            let _ = repo
                                .set_current_student_package_by_id(&ctx, &db, &ids[i], true)
                                .await;
                        }
                        Op::SoftDelete(i) => {
                            if repo.soft_delete_by_id(&ctx, &db, &ids[i]).await.is_ok() {
                                deleted[i] = true;
                            }
                        }
                        Op::Revert(i) => {
                            let reverted = repo.revert_by_id(&ctx, &db, &ids[i]).await;
                            if deleted[i] && reverted.is_err() {
                                failed_reverts += 1;
                            }
                            if reverted.is_ok() {
                                deleted[i] = false;
                            }
                        }
                    }
                    let rows = db.snapshot("student_package_order").await.unwrap();
                    worst = worst.max(live_current(&rows));
                }
                (worst, failed_reverts)
            });
            prop_assert!(worst <= 1);
            prop_assert_eq!(failed_reverts, 0);
        }

        #[test]
        fn recompute_marks_one_segment_while_any_is_ahead(
            deleted in prop::collection::vec(any::<bool>(), SEGMENTS),
            month in 1u32..=12,
        ) {
            let now = day(month, 15);
            let clock = Arc::new(FixedTimeSource::new(now));
            let (current, expected) = runtime().block_on(async {
                let (repo, db, ids) = seeded(clock.clone()).await;
                let ctx = RequestContext::background();
                for (id, gone) in ids.iter().zip(&deleted) {
                    if *gone {
                        repo.soft_delete_by_id(&ctx, &db, id).await.unwrap();
                    }
                }
                let service = OrderService::new(repo, clock);
                service
                    .set_current_student_package_order_by_time_and_student_package_id(&ctx, &db, HEAD)
                    .await
                    .unwrap();

                let rows = db.snapshot("student_package_order").await.unwrap();
                let ahead = (0..SEGMENTS)
                    .filter(|i| !deleted[*i])
                    .any(|i| day(2 * i as u32 + 2, 28) >= now);
                (live_current(&rows), usize::from(ahead))
            });
            prop_assert_eq!(current, expected);
        }
    }
}
