//! # Concurrency
//!
//! Requests touching the same package run in their own transactions. The
//! in-memory database serializes transactions, so a request always sees the
//! committed result of the one before it:
//!
//! - two disjoint grants both land, and exactly one segment is current
//! - two overlapping grants race; one wins, the other is a precondition failure
//! - a transaction that cannot get the lock in time fails with a retryable error

#[cfg(test)]
mod tests {
    use crate::fixtures::{day, grant, Ledger, HEAD};
    use entitlement_ledger::{
        ExecError, GrantRequest, LedgerConfig, LedgerResult, RequestContext, SegmentState,
        StudentPackagePosition,
    };
    use shared_types::ErrorKind;
    use std::time::Duration;

    /// Run one grant in its own transaction, committing on success.
    async fn grant_in_tx(
        ledger: &Ledger,
        request: GrantRequest,
    ) -> LedgerResult<StudentPackagePosition> {
        let ctx = RequestContext::background().with_timeout(Duration::from_secs(5));
        let tx = ledger
            .db
            .begin(&ctx)
            .await
            .map_err(|e| entitlement_ledger::LedgerError::read("Test.Begin", e))?;
        let outcome = ledger.service.grant_segment(&ctx, &tx, &request).await;
        match outcome {
            Ok(o) => {
                tx.commit()
                    .map_err(|e| entitlement_ledger::LedgerError::write("Test.Commit", e))?;
                Ok(o.position)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_grants_both_land() {
        let ledger = std::sync::Arc::new(Ledger::at(day(2, 1)));

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                grant_in_tx(&ledger, grant("ord-1", day(1, 1), day(3, 31))).await
            })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                grant_in_tx(&ledger, grant("ord-2", day(4, 1), day(6, 30))).await
            })
        };
        let a = a.await.unwrap();
        let b = b.await.unwrap();
        assert!(a.is_ok(), "{:?}", a);
        assert!(b.is_ok(), "{:?}", b);

        let ctx = RequestContext::background();
        let states = ledger
            .service
            .order_service()
            .segment_states(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(states.len(), 2);
        let current = states
            .iter()
            .filter(|(_, s)| *s == SegmentState::Current)
            .count();
        assert_eq!(current, 1);

        let head = ledger
            .service
            .stores()
            .packages
            .get_by_id(&ctx, &ledger.db, HEAD)
            .await
            .unwrap();
        assert_eq!(head.end_at, Some(day(3, 31)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_grants_one_wins() {
        let ledger = std::sync::Arc::new(Ledger::at(day(2, 1)));

        let handles: Vec<_> = ["ord-1", "ord-2"]
            .into_iter()
            .map(|order_id| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    grant_in_tx(&ledger, grant(order_id, day(1, 1), day(3, 31))).await
                })
            })
            .collect();

        let mut won = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(position) => {
                    assert_eq!(position, StudentPackagePosition::Current);
                    won += 1;
                }
                Err(e) => {
                    assert_eq!(e.kind(), ErrorKind::FailedPrecondition);
                    rejected += 1;
                }
            }
        }
        assert_eq!((won, rejected), (1, 1));

        let segments = ledger.db.snapshot("student_package_order").await.unwrap();
        assert_eq!(segments.len(), 1);
        let logs = ledger.db.snapshot("student_package_log").await.unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_timeout_is_retryable() {
        let ledger = Ledger::with_config(
            day(2, 1),
            LedgerConfig {
                lock_timeout_ms: 50,
                ..Default::default()
            },
        );
        let ctx = RequestContext::background();

        let holder = ledger.db.begin(&ctx).await.unwrap();
        let err = match ledger.db.begin(&ctx).await {
            Ok(_) => panic!("second transaction must wait for the first"),
            Err(e) => e,
        };
        assert_eq!(err, ExecError::LockTimeout);
        assert!(entitlement_ledger::LedgerError::read("Test.Begin", err).is_retryable());

        holder.rollback();
        assert!(ledger.db.begin(&ctx).await.is_ok());
    }
}
