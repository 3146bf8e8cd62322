//! # Order Service
//!
//! Position-aware operations over a package's ledger segments. Builds on the
//! Temporal Order Ledger store and the pure rules in `domain::position`.
//!
//! Every method expects the caller's transaction to already hold the head lock
//! (`StudentPackageStore::get_by_id`) for the package it touches.

use crate::domain::entities::StudentPackageOrder;
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::position::{
    classify_segments, determine_position, select_current_segment, PositionError, SegmentState,
    StudentPackagePosition,
};
use crate::ports::inbound::StudentPackageOrderStore;
use crate::ports::outbound::{QueryExecutor, RequestContext, TimeSource};
use std::sync::Arc;
use tracing::{debug, info};

pub struct OrderService<O: ?Sized> {
    orders: Arc<O>,
    clock: Arc<dyn TimeSource>,
}

impl<O: StudentPackageOrderStore + ?Sized> OrderService<O> {
    pub fn new(orders: Arc<O>, clock: Arc<dyn TimeSource>) -> Self {
        Self { orders, clock }
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    /// Where `order` would land among the package's live segments.
    pub async fn get_position_of_student_package_order(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        order: &StudentPackageOrder,
    ) -> LedgerResult<StudentPackagePosition> {
        const OP: &str = "OrderService.GetPositionOfStudentPackageOrder";

        let segments = self
            .orders
            .get_student_package_orders_by_student_package_id(ctx, db, &order.student_package_id)
            .await?;
        let candidate_id = Some(order.student_package_order_id.as_str()).filter(|id| !id.is_empty());

        determine_position(&order.window(), candidate_id, &segments, self.clock.now()).map_err(
            |e| match e {
                PositionError::InvertedWindow => LedgerError::invalid_argument(OP, e.to_string()),
                PositionError::Overlap { .. } => LedgerError::precondition(OP, e.to_string()),
            },
        )
    }

    /// Create the segment. A `Current` segment takes the flag from every other segment first.
    pub async fn insert_student_package_order(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        order: &StudentPackageOrder,
        position: StudentPackagePosition,
    ) -> LedgerResult<StudentPackageOrder> {
        let is_current = position == StudentPackagePosition::Current;
        if is_current {
            self.orders
                .reset_current_position(ctx, db, &order.student_package_id)
                .await?;
        }
        let segment = StudentPackageOrder {
            is_current_student_package: is_current,
            ..order.clone()
        };
        let created = self.orders.create(ctx, db, &segment).await?;
        debug!(
            student_package_order_id = %created.student_package_order_id,
            ?position,
            "segment inserted"
        );
        Ok(created)
    }

    /// Move the current flag to the segment containing now, else the earliest
    /// future one. Returns the new current segment, if any.
    pub async fn set_current_student_package_order_by_time_and_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<Option<StudentPackageOrder>> {
        let segments = self
            .orders
            .get_student_package_orders_by_student_package_id(ctx, db, student_package_id)
            .await?;
        self.orders
            .reset_current_position(ctx, db, student_package_id)
            .await?;

        let Some(next) = select_current_segment(&segments, self.clock.now()) else {
            info!(student_package_id, "package has no current segment");
            return Ok(None);
        };
        self.orders
            .set_current_student_package_by_id(ctx, db, &next.student_package_order_id, true)
            .await?;

        info!(
            student_package_id,
            student_package_order_id = %next.student_package_order_id,
            "current segment moved"
        );
        Ok(Some(StudentPackageOrder {
            is_current_student_package: true,
            ..next.clone()
        }))
    }

    pub async fn delete_student_package_order_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<()> {
        self.orders
            .soft_delete_by_id(ctx, db, student_package_order_id)
            .await
    }

    /// Reinstate a cancelled segment. Overlap with newer segments is not checked.
    pub async fn revert_student_package_order_by_student_package_order_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<()> {
        self.orders.revert_by_id(ctx, db, student_package_order_id).await
    }

    pub async fn get_student_package_order_by_student_package_id_and_order_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        order_id: &str,
    ) -> LedgerResult<Option<StudentPackageOrder>> {
        self.orders
            .get_by_student_package_id_and_order_id(ctx, db, student_package_id, order_id)
            .await
    }

    pub async fn get_student_package_order_by_student_package_order_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<StudentPackageOrder> {
        self.orders.get_by_id(ctx, db, student_package_order_id).await
    }

    /// Inferred state of each live segment, in `start_at` order.
    pub async fn segment_states(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<Vec<(String, SegmentState)>> {
        let segments = self
            .orders
            .get_student_package_orders_by_student_package_id(ctx, db, student_package_id)
            .await?;
        Ok(classify_segments(&segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FixedTimeSource, InMemoryDatabase};
    use crate::stores::StudentPackageOrderRepo;
    use chrono::{TimeZone, Utc};
    use shared_types::{ErrorKind, Timestamp};

    fn day(m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap()
    }

    fn service(now: Timestamp) -> (OrderService<StudentPackageOrderRepo>, Arc<FixedTimeSource>) {
        let clock = Arc::new(FixedTimeSource::new(now));
        let repo = Arc::new(StudentPackageOrderRepo::new(clock.clone()));
        (OrderService::new(repo, clock.clone()), clock)
    }

    fn order(from: Timestamp, to: Timestamp) -> StudentPackageOrder {
        StudentPackageOrder {
            student_package_id: "sp-1".into(),
            user_id: "stu-1".into(),
            order_id: "ord-1".into(),
            course_id: "c-1".into(),
            start_at: from,
            end_at: to,
            ..Default::default()
        }
    }

    async fn place(
        svc: &OrderService<StudentPackageOrderRepo>,
        ctx: &RequestContext,
        db: &InMemoryDatabase,
        from: Timestamp,
        to: Timestamp,
    ) -> (StudentPackageOrder, StudentPackagePosition) {
        let candidate = order(from, to);
        let position = svc
            .get_position_of_student_package_order(ctx, db, &candidate)
            .await
            .unwrap();
        let created = svc
            .insert_student_package_order(ctx, db, &candidate, position)
            .await
            .unwrap();
        (created, position)
    }

    #[tokio::test]
    async fn test_positions_follow_current_segment() {
        let db = InMemoryDatabase::new();
        let ctx = RequestContext::background();
        let (svc, _) = service(day(5, 1));

        let (first, pos) = place(&svc, &ctx, &db, day(4, 1), day(6, 30)).await;
        assert_eq!(pos, StudentPackagePosition::Current);
        assert!(first.is_current_student_package);

        let (_, pos) = place(&svc, &ctx, &db, day(7, 1), day(9, 30)).await;
        assert_eq!(pos, StudentPackagePosition::Future);
        let (_, pos) = place(&svc, &ctx, &db, day(1, 1), day(3, 31)).await;
        assert_eq!(pos, StudentPackagePosition::Past);

        let states = svc.segment_states(&ctx, &db, "sp-1").await.unwrap();
        let current: Vec<_> = states
            .iter()
            .filter(|(_, s)| *s == SegmentState::Current)
            .collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].0, first.student_package_order_id);
    }

    #[tokio::test]
    async fn test_overlap_is_precondition_violation() {
        let db = InMemoryDatabase::new();
        let ctx = RequestContext::background();
        let (svc, _) = service(day(5, 1));
        place(&svc, &ctx, &db, day(4, 1), day(6, 30)).await;

        let err = svc
            .get_position_of_student_package_order(&ctx, &db, &order(day(6, 1), day(8, 1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedPrecondition);

        let err = svc
            .get_position_of_student_package_order(&ctx, &db, &order(day(9, 1), day(8, 1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_set_current_by_time_advances_and_clears() {
        let db = InMemoryDatabase::new();
        let ctx = RequestContext::background();
        let (svc, clock) = service(day(2, 1));
        let (first, _) = place(&svc, &ctx, &db, day(1, 1), day(3, 31)).await;
        let (second, pos) = place(&svc, &ctx, &db, day(4, 1), day(6, 30)).await;
        assert_eq!(pos, StudentPackagePosition::Future);

        clock.set(day(4, 15));
        let current = svc
            .set_current_student_package_order_by_time_and_student_package_id(&ctx, &db, "sp-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.student_package_order_id, second.student_package_order_id);

        let stored = svc
            .get_student_package_order_by_student_package_order_id(
                &ctx,
                &db,
                &first.student_package_order_id,
            )
            .await
            .unwrap();
        assert!(!stored.is_current_student_package);

        clock.set(day(8, 1));
        let none = svc
            .set_current_student_package_order_by_time_and_student_package_id(&ctx, &db, "sp-1")
            .await
            .unwrap();
        assert!(none.is_none());
        let states = svc.segment_states(&ctx, &db, "sp-1").await.unwrap();
        assert!(states.iter().all(|(_, s)| *s != SegmentState::Current));
    }

    #[tokio::test]
    async fn test_delete_and_revert_round_trip() {
        let db = InMemoryDatabase::new();
        let ctx = RequestContext::background();
        let (svc, _) = service(day(5, 1));
        let (created, _) = place(&svc, &ctx, &db, day(4, 1), day(6, 30)).await;
        let id = created.student_package_order_id.as_str();

        svc.delete_student_package_order_by_id(&ctx, &db, id)
            .await
            .unwrap();
        assert!(svc
            .get_student_package_order_by_student_package_id_and_order_id(&ctx, &db, "sp-1", "ord-1")
            .await
            .unwrap()
            .is_none());

        svc.revert_student_package_order_by_student_package_order_id(&ctx, &db, id)
            .await
            .unwrap();
        let restored = svc
            .get_student_package_order_by_student_package_id_and_order_id(&ctx, &db, "sp-1", "ord-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.window(), created.window());
    }
}
