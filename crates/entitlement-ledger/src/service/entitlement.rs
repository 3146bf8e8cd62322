//! # Entitlement Service
//!
//! Multi-store flows over one package. Each flow:
//!
//! 1. locks the head (`StudentPackageStore::get_by_id`)
//! 2. changes the ledger through `OrderService`
//! 3. projects the current segment into the head, course grants and access paths
//! 4. appends a `student_package_log` row
//!
//! The caller owns the transaction. Any error means the whole request must be
//! rolled back; the service never commits partial work on its own.
//!
//! ## Flows
//!
//! | Flow                  | Log action |
//! |-----------------------|------------|
//! | `grant_segment`       | UPSERTED   |
//! | `cancel_segment`      | CANCELED   |
//! | `void_cancellation`   | VOIDED     |
//! | `run_expiration_job`  | EXPIRED    |

use super::order_service::OrderService;
use crate::config::LedgerConfig;
use crate::domain::entities::{
    PackageLogAction, PackageProperties, StudentCourse, StudentPackage, StudentPackageAccessPath,
    StudentPackageLog, StudentPackageOrder,
};
use crate::domain::errors::{LedgerError, LedgerResult, RowError};
use crate::domain::position::StudentPackagePosition;
use crate::ports::inbound::{
    AccessPathStore, StudentCourseStore, StudentPackageLogStore, StudentPackageOrderStore,
    StudentPackageStore,
};
use crate::ports::outbound::{QueryExecutor, RequestContext, TimeSource};
use crate::stores::{
    AccessPathRepo, StudentCourseRepo, StudentPackageLogRepo, StudentPackageOrderRepo,
    StudentPackageRepo,
};
use ledger_telemetry::log_ledger_event;
use serde::{Deserialize, Serialize};
use shared_types::{
    CourseId, ErrorKind, LocationId, OrderId, PackageId, Revisable, StudentId, StudentPackageId,
    StudentPackageOrderId, TimeWindow, Timestamp,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const FLOW_CANCEL: &str = "cancel order";
const FLOW_VOID: &str = "void order";
const FLOW_EXPIRE: &str = "cron job";

// =============================================================================
// Wiring
// =============================================================================

/// Every store the service writes through.
#[derive(Clone)]
pub struct LedgerStores {
    pub packages: Arc<dyn StudentPackageStore>,
    pub orders: Arc<dyn StudentPackageOrderStore>,
    pub courses: Arc<dyn StudentCourseStore>,
    pub access_paths: Arc<dyn AccessPathStore>,
    pub logs: Arc<dyn StudentPackageLogStore>,
}

impl LedgerStores {
    /// Default SQL-backed stores sharing one clock.
    pub fn new(clock: Arc<dyn TimeSource>, config: &LedgerConfig) -> Self {
        Self {
            packages: Arc::new(StudentPackageRepo::new(Arc::clone(&clock), config.clone())),
            orders: Arc::new(StudentPackageOrderRepo::new(Arc::clone(&clock))),
            courses: Arc::new(StudentCourseRepo::new(Arc::clone(&clock))),
            access_paths: Arc::new(AccessPathRepo::new(Arc::clone(&clock), config.clone())),
            logs: Arc::new(StudentPackageLogRepo::new(clock)),
        }
    }
}

// =============================================================================
// Requests and outcomes
// =============================================================================

/// A new or extended time window for one student's package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantRequest {
    pub student_id: StudentId,
    pub package_id: Option<PackageId>,
    /// Id for the head when none exists yet. Generated when `None`.
    pub student_package_id: Option<StudentPackageId>,
    pub order_id: OrderId,
    pub course_id: CourseId,
    pub location_ids: Vec<LocationId>,
    pub properties: PackageProperties,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    pub from_student_package_order_id: Option<StudentPackageOrderId>,
    pub flow: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrantOutcome {
    pub student_package_id: StudentPackageId,
    pub head_created: bool,
    pub position: StudentPackagePosition,
    pub segment: StudentPackageOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelOutcome {
    pub cancelled: StudentPackageOrder,
    /// Segment that took over the current flag, when the cancelled one held it.
    pub current: Option<StudentPackageOrder>,
    pub head_cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationAction {
    /// Head already matches its current segment.
    Unchanged,
    /// Head moved onto a new current segment.
    Advanced,
    /// No segment left: head deactivated, grants withdrawn.
    Expired,
    /// A business rule rejected the projection; recorded on the segment.
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationReport {
    pub scanned: usize,
    pub unchanged: usize,
    pub advanced: usize,
    pub expired: usize,
    pub failed: usize,
}

fn is_business_error(e: &LedgerError) -> bool {
    matches!(
        e.kind(),
        ErrorKind::FailedPrecondition | ErrorKind::NotFound | ErrorKind::InvalidArgument
    )
}

fn access_path(head: &StudentPackage, course_id: &str, location_id: &str) -> StudentPackageAccessPath {
    StudentPackageAccessPath {
        student_package_id: head.student_package_id.clone(),
        student_id: head.student_id.clone(),
        course_id: course_id.to_string(),
        location_id: location_id.to_string(),
        ..Default::default()
    }
}

fn snapshot(op: &'static str, head: &StudentPackage) -> LedgerResult<serde_json::Value> {
    serde_json::to_value(head).map_err(|e| {
        LedgerError::decode(
            op,
            RowError::Json {
                column: "student_package_object".to_string(),
                message: e.to_string(),
            },
        )
    })
}

// =============================================================================
// Service
// =============================================================================

pub struct EntitlementService {
    stores: LedgerStores,
    order_service: OrderService<dyn StudentPackageOrderStore>,
    clock: Arc<dyn TimeSource>,
}

impl EntitlementService {
    pub fn new(stores: LedgerStores, clock: Arc<dyn TimeSource>) -> Self {
        let order_service = OrderService::new(Arc::clone(&stores.orders), Arc::clone(&clock));
        Self {
            stores,
            order_service,
            clock,
        }
    }

    pub fn stores(&self) -> &LedgerStores {
        &self.stores
    }

    pub fn order_service(&self) -> &OrderService<dyn StudentPackageOrderStore> {
        &self.order_service
    }

    /// Record a new segment for the student's package, creating the head when needed.
    pub async fn grant_segment(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        request: &GrantRequest,
    ) -> LedgerResult<GrantOutcome> {
        const OP: &str = "EntitlementService.GrantSegment";
        let window = TimeWindow::new(request.start_at, request.end_at)
            .ok_or_else(|| LedgerError::invalid_argument(OP, "end_at is before start_at"))?;
        if request.location_ids.is_empty() {
            return Err(LedgerError::invalid_argument(OP, "no location given"));
        }

        let candidate = StudentPackage {
            student_package_id: request.student_package_id.clone().unwrap_or_default(),
            student_id: request.student_id.clone(),
            package_id: request.package_id.clone(),
            start_at: Some(window.start),
            end_at: Some(window.end),
            properties: request.properties.clone(),
            is_active: true,
            location_ids: request.location_ids.clone(),
            ..Default::default()
        };

        let packages = &self.stores.packages;
        let (mut head, head_created) =
            match packages.get_student_package_for_upsert(ctx, db, &candidate).await? {
                Some(id) => (packages.get_by_id(ctx, db, &id).await?, false),
                None => {
                    let id = request
                        .student_package_id
                        .clone()
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    let fresh = StudentPackage {
                        student_package_id: id.clone(),
                        ..candidate
                    };
                    packages.upsert(ctx, db, &fresh).await?;
                    (packages.get_by_id(ctx, db, &id).await?, true)
                }
            };

        let segment = StudentPackageOrder {
            student_package_id: head.student_package_id.clone(),
            user_id: request.student_id.clone(),
            order_id: request.order_id.clone(),
            course_id: request.course_id.clone(),
            start_at: window.start,
            end_at: window.end,
            student_package_object: snapshot(OP, &head)?,
            from_student_package_order_id: request.from_student_package_order_id.clone(),
            ..Default::default()
        };
        let position = self
            .order_service
            .get_position_of_student_package_order(ctx, db, &segment)
            .await?;
        let segment = self
            .order_service
            .insert_student_package_order(ctx, db, &segment, position)
            .await?;

        if position == StudentPackagePosition::Current {
            head.start_at = Some(window.start);
            head.end_at = Some(window.end);
            head.properties = request.properties.clone();
            head.location_ids = request.location_ids.clone();
            packages.update(ctx, db, &head).await?;
            self.project_courses(ctx, db, &head, &segment).await?;
            self.assert_access_paths(ctx, db, &head, &segment.course_id)
                .await?;
        }

        self.append_log(
            ctx,
            db,
            &head,
            Some(&segment.course_id),
            PackageLogAction::Upserted,
            &request.flow,
        )
        .await?;

        info!(
            student_package_id = %head.student_package_id,
            student_package_order_id = %segment.student_package_order_id,
            ?position,
            head_created,
            "segment granted"
        );
        Ok(GrantOutcome {
            student_package_id: head.student_package_id,
            head_created,
            position,
            segment,
        })
    }

    /// Cancel the segment active at `at`. Cancelling an ended segment is refused.
    pub async fn cancel_segment(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        at: Timestamp,
    ) -> LedgerResult<CancelOutcome> {
        const OP: &str = "EntitlementService.CancelSegment";
        let head = self.stores.packages.get_by_id(ctx, db, student_package_id).await?;
        let segment = self
            .stores
            .orders
            .get_student_package_order_by_time_and_student_package_id(
                ctx,
                db,
                student_package_id,
                at,
            )
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                op: OP,
                entity: "student_package_order",
                key: format!("{}@{}", student_package_id, at),
            })?;

        let now = self.clock.now();
        if segment.end_at < now {
            return Err(LedgerError::precondition(
                OP,
                format!(
                    "segment {} ended at {} and cannot be cancelled",
                    segment.student_package_order_id, segment.end_at
                ),
            ));
        }

        self.order_service
            .delete_student_package_order_by_id(ctx, db, &segment.student_package_order_id)
            .await?;

        let mut current = None;
        let mut head_cancelled = false;
        if segment.is_current_student_package {
            current = self
                .order_service
                .set_current_student_package_order_by_time_and_student_package_id(
                    ctx,
                    db,
                    student_package_id,
                )
                .await?;
            match &current {
                Some(next) => {
                    self.stores
                        .packages
                        .update_time_by_id(ctx, db, student_package_id, next.start_at, next.end_at)
                        .await?;
                    self.project_courses(ctx, db, &head, next).await?;
                }
                None => {
                    self.stores
                        .packages
                        .cancel_by_id(ctx, db, student_package_id)
                        .await?;
                    self.withdraw_grants(ctx, db, student_package_id, now).await?;
                    head_cancelled = true;
                }
            }
        }

        self.append_log(
            ctx,
            db,
            &head,
            Some(&segment.course_id),
            PackageLogAction::Canceled,
            FLOW_CANCEL,
        )
        .await?;

        log_ledger_event!(
            info,
            OP,
            student_package_id,
            "segment cancelled",
            student_package_order_id = %segment.student_package_order_id,
            head_cancelled = head_cancelled
        );
        Ok(CancelOutcome {
            cancelled: segment,
            current,
            head_cancelled,
        })
    }

    /// Reinstate a cancelled segment and re-project the package.
    ///
    /// The revert does not check the segment against newer live segments.
    pub async fn void_cancellation(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<Option<StudentPackageOrder>> {
        const OP: &str = "EntitlementService.VoidCancellation";
        let segment = self
            .order_service
            .get_student_package_order_by_student_package_order_id(ctx, db, student_package_order_id)
            .await?;
        if segment.is_active() {
            return Err(LedgerError::precondition(
                OP,
                format!("segment {} is not cancelled", student_package_order_id),
            ));
        }

        let spid = segment.student_package_id.as_str();
        let mut head = self.stores.packages.get_by_id(ctx, db, spid).await?;
        self.order_service
            .revert_student_package_order_by_student_package_order_id(
                ctx,
                db,
                student_package_order_id,
            )
            .await?;

        let current = self
            .order_service
            .set_current_student_package_order_by_time_and_student_package_id(ctx, db, spid)
            .await?;
        if let Some(c) = &current {
            head.start_at = Some(c.start_at);
            head.end_at = Some(c.end_at);
            head.deleted_at = None;
            self.stores.packages.update(ctx, db, &head).await?;
            self.project_courses(ctx, db, &head, c).await?;
            self.assert_access_paths(ctx, db, &head, &c.course_id).await?;
        }

        self.append_log(
            ctx,
            db,
            &head,
            Some(&segment.course_id),
            PackageLogAction::Voided,
            FLOW_VOID,
        )
        .await?;
        Ok(current)
    }

    /// Re-evaluate every head ending in the look-back window.
    pub async fn run_expiration_job(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        days: Option<i64>,
    ) -> LedgerResult<ExpirationReport> {
        let heads = self
            .stores
            .packages
            .get_student_packages_for_cronjob_by_day(ctx, db, days)
            .await?;

        let mut report = ExpirationReport {
            scanned: heads.len(),
            ..Default::default()
        };
        for head in &heads {
            match self.expire_package(ctx, db, &head.student_package_id).await? {
                ExpirationAction::Unchanged => report.unchanged += 1,
                ExpirationAction::Advanced => report.advanced += 1,
                ExpirationAction::Expired => report.expired += 1,
                ExpirationAction::Failed => report.failed += 1,
            }
        }

        info!(
            scanned = report.scanned,
            advanced = report.advanced,
            expired = report.expired,
            failed = report.failed,
            "expiration job finished"
        );
        Ok(report)
    }

    /// Bring one head in line with the segment that should be current now.
    pub async fn expire_package(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<ExpirationAction> {
        let head = self.stores.packages.get_by_id(ctx, db, student_package_id).await?;
        let now = self.clock.now();
        let current = self
            .order_service
            .set_current_student_package_order_by_time_and_student_package_id(
                ctx,
                db,
                student_package_id,
            )
            .await?;

        let Some(current) = current else {
            let ended = head.end_at.map_or(false, |end| end < now);
            if !head.is_active || !ended {
                return Ok(ExpirationAction::Unchanged);
            }
            return self.expire_head(ctx, db, &head, now).await;
        };

        let changed =
            head.start_at != Some(current.start_at) || head.end_at != Some(current.end_at);
        if changed {
            if let Err(e) = self.advance_head(ctx, db, &head, &current).await {
                if !is_business_error(&e) {
                    return Err(e);
                }
                log_ledger_event!(
                    warn,
                    "EntitlementService.ExpirePackage",
                    student_package_id,
                    "expiration projection rejected",
                    error = %e
                );
                self.stores
                    .orders
                    .update_execute_error(ctx, db, &current.student_package_order_id, &e.to_string())
                    .await?;
                return Ok(ExpirationAction::Failed);
            }
        }
        self.stores
            .orders
            .update_execute_status(ctx, db, &current.student_package_order_id, true)
            .await?;

        Ok(if changed {
            ExpirationAction::Advanced
        } else {
            ExpirationAction::Unchanged
        })
    }

    // =========================================================================
    // Projection helpers
    // =========================================================================

    async fn advance_head(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        head: &StudentPackage,
        current: &StudentPackageOrder,
    ) -> LedgerResult<()> {
        self.stores
            .packages
            .update_time_by_id(
                ctx,
                db,
                &head.student_package_id,
                current.start_at,
                current.end_at,
            )
            .await?;
        self.project_courses(ctx, db, head, current).await
    }

    async fn expire_head(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        head: &StudentPackage,
        now: Timestamp,
    ) -> LedgerResult<ExpirationAction> {
        let spid = head.student_package_id.as_str();
        self.stores.packages.deactivate_by_id(ctx, db, spid).await?;
        self.withdraw_grants(ctx, db, spid, head.end_at.unwrap_or(now))
            .await?;

        let segments = self
            .stores
            .orders
            .get_student_package_orders_by_student_package_id(ctx, db, spid)
            .await?;
        if let Some(last) = segments.last() {
            self.stores
                .orders
                .update_execute_status(ctx, db, &last.student_package_order_id, true)
                .await?;
        }

        self.append_log(ctx, db, head, None, PackageLogAction::Expired, FLOW_EXPIRE)
            .await?;
        log_ledger_event!(info, "EntitlementService.ExpireHead", spid, "student package expired");
        Ok(ExpirationAction::Expired)
    }

    /// Upsert one course grant per head location for the segment's course.
    async fn project_courses(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        head: &StudentPackage,
        segment: &StudentPackageOrder,
    ) -> LedgerResult<()> {
        let info = head.properties.course(&segment.course_id);
        let courses: Vec<StudentCourse> = head
            .location_ids
            .iter()
            .map(|location_id| StudentCourse {
                student_package_id: head.student_package_id.clone(),
                student_id: head.student_id.clone(),
                course_id: segment.course_id.clone(),
                location_id: location_id.clone(),
                student_start_date: segment.start_at,
                student_end_date: segment.end_at,
                course_slot: info.map(|c| c.number_of_slots),
                weight: info.map(|c| c.weight),
                ..Default::default()
            })
            .collect();
        self.stores
            .courses
            .upsert_student_course_data(ctx, db, &courses)
            .await
    }

    /// Ensure the student can reach the course through this head.
    ///
    /// Only this head's soft-deleted paths are revived; paths of other heads stay withdrawn.
    async fn assert_access_paths(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        head: &StudentPackage,
        course_id: &str,
    ) -> LedgerResult<()> {
        let paths = &self.stores.access_paths;
        match paths
            .check_exist_student_package_access_path(ctx, db, &head.student_id, course_id)
            .await
        {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::FailedPrecondition => return Ok(()),
            Err(e) => return Err(e),
        }

        match paths
            .revert_by_student_package_id_and_course_id(
                ctx,
                db,
                &head.student_package_id,
                &head.student_id,
                course_id,
            )
            .await
        {
            Ok(()) => {
                for location_id in &head.location_ids {
                    paths
                        .update(ctx, db, &access_path(head, course_id, location_id))
                        .await?;
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NoRowAffected => {
                let fresh: Vec<StudentPackageAccessPath> = head
                    .location_ids
                    .iter()
                    .map(|l| access_path(head, course_id, l))
                    .collect();
                paths.insert_multi(ctx, db, &fresh).await
            }
            Err(e) => Err(e),
        }
    }

    /// Two-phase course cancel (soft delete, then void), plus access path removal.
    async fn withdraw_grants(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        end_at: Timestamp,
    ) -> LedgerResult<()> {
        let ids = [student_package_id.to_string()];
        let now = self.clock.now();
        let deleted = self
            .stores
            .courses
            .soft_delete_by_student_package_ids(ctx, db, &ids, now)
            .await?;
        if deleted > 0 {
            self.stores
                .courses
                .void_student_courses_by_student_package_id(ctx, db, end_at, student_package_id)
                .await?;
        }
        self.stores
            .access_paths
            .delete_by_student_package_ids(ctx, db, &ids)
            .await?;
        Ok(())
    }

    async fn append_log(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        head: &StudentPackage,
        course_id: Option<&str>,
        action: PackageLogAction,
        flow: &str,
    ) -> LedgerResult<()> {
        let log = StudentPackageLog {
            student_package_log_id: String::new(),
            student_package_id: head.student_package_id.clone(),
            student_id: head.student_id.clone(),
            course_id: course_id.map(str::to_string),
            user_id: ctx.user_id.clone(),
            action,
            flow: flow.to_string(),
            student_package_object: snapshot("EntitlementService.AppendLog", head)?,
            created_at: Default::default(),
            updated_at: Default::default(),
        };
        self.stores.logs.create(ctx, db, &log).await
    }
}
