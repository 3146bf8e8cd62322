//! # Inbound Ports (Driving Ports)
//!
//! One trait per ledger component. Every operation takes the caller's
//! executor handle: stores never open, commit or roll back a transaction, so
//! several stores can be combined inside one ambient transaction.

use super::outbound::{QueryExecutor, RequestContext};
use crate::domain::entities::{
    PackageCourse, PackageCourseFee, PackageCourseMaterial, ProductLocation, StudentCourse,
    StudentPackage, StudentPackageAccessPath, StudentPackageLog, StudentPackageOrder,
};
use crate::domain::errors::LedgerResult;
use async_trait::async_trait;
use shared_types::{StudentPackageId, Timestamp};
use std::collections::HashMap;

/// Entitlement Record Store: owns `student_packages`.
#[async_trait]
pub trait StudentPackageStore: Send + Sync {
    /// Insert a new head. `package_id` and `deleted_at` are written as `NULL`.
    async fn insert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package: &StudentPackage,
    ) -> LedgerResult<()>;

    /// Rewrite the mutable fields and force `is_active = true`. Exactly one row must match.
    async fn update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package: &StudentPackage,
    ) -> LedgerResult<()>;

    /// Insert, or overwrite on primary-key conflict. Exactly one row must be affected.
    async fn upsert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package: &StudentPackage,
    ) -> LedgerResult<()>;

    /// Read a head under `FOR NO KEY UPDATE`.
    async fn get_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<StudentPackage>;

    /// Existing head for `(student_id, package_id, any of location_ids)`. `None` means "create new".
    async fn get_student_package_for_upsert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        candidate: &StudentPackage,
    ) -> LedgerResult<Option<StudentPackageId>>;

    /// Idempotent bulk soft delete. Returns rows newly deleted.
    async fn soft_delete_by_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        ids: &[StudentPackageId],
        deleted_at: Timestamp,
    ) -> LedgerResult<u64>;

    /// Live heads whose `end_at` falls in `[start of today - days, end of today]`.
    /// `None` uses the configured look-back.
    async fn get_student_packages_for_cronjob_by_day(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        days: Option<i64>,
    ) -> LedgerResult<Vec<StudentPackage>>;

    /// Deactivate a head and end-date it to now.
    async fn cancel_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<()>;

    /// Clear `is_active` on a live head, leaving its window as recorded.
    async fn deactivate_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<()>;

    async fn update_time_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        start_at: Timestamp,
        end_at: Timestamp,
    ) -> LedgerResult<()>;

    async fn get_by_student_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_ids: &[String],
    ) -> LedgerResult<Vec<StudentPackage>>;
}

/// Temporal Order Ledger: owns `student_package_order`.
#[async_trait]
pub trait StudentPackageOrderStore: Send + Sync {
    /// Insert with a freshly generated segment id. Returns the stored segment.
    async fn create(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        order: &StudentPackageOrder,
    ) -> LedgerResult<StudentPackageOrder>;

    async fn upsert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        order: &StudentPackageOrder,
    ) -> LedgerResult<()>;

    async fn update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        order: &StudentPackageOrder,
    ) -> LedgerResult<()>;

    /// Clear the current flag on every live segment of a package.
    async fn reset_current_position(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<u64>;

    async fn set_current_student_package_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
        is_current: bool,
    ) -> LedgerResult<()>;

    /// Live segments ordered by `start_at` ascending.
    async fn get_student_package_orders_by_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<Vec<StudentPackageOrder>>;

    /// Live segment whose window contains `at`, read under `FOR NO KEY UPDATE`.
    async fn get_student_package_order_by_time_and_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        at: Timestamp,
    ) -> LedgerResult<Option<StudentPackageOrder>>;

    async fn soft_delete_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<()>;

    /// Clear `deleted_at` without re-validating the window.
    async fn revert_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<()>;

    async fn update_execute_error(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
        executed_error: &str,
    ) -> LedgerResult<()>;

    async fn update_execute_status(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
        is_executed_by_cronjob: bool,
    ) -> LedgerResult<()>;

    /// Any segment by id, deleted or not.
    async fn get_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_order_id: &str,
    ) -> LedgerResult<StudentPackageOrder>;

    async fn get_by_student_package_id_and_order_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        order_id: &str,
    ) -> LedgerResult<Option<StudentPackageOrder>>;

    /// Live segments of a user active at `at`.
    async fn get_active_orders_by_user_id_and_time(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        user_id: &str,
        at: Timestamp,
    ) -> LedgerResult<Vec<StudentPackageOrder>>;
}

/// Course Grant Projector: owns `student_course`.
#[async_trait]
pub trait StudentCourseStore: Send + Sync {
    /// Upsert each course in order. A failure leaves earlier rows applied.
    async fn upsert_student_course_data(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        courses: &[StudentCourse],
    ) -> LedgerResult<()>;

    async fn upsert_student_course(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        course: &StudentCourse,
    ) -> LedgerResult<()>;

    async fn soft_delete_by_student_package_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_ids: &[StudentPackageId],
        deleted_at: Timestamp,
    ) -> LedgerResult<u64>;

    /// End-date rows that are already soft-deleted. Zero matches is an error.
    async fn void_student_courses_by_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        end_at: Timestamp,
        student_package_id: &str,
    ) -> LedgerResult<u64>;

    async fn update_time_by_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        course_id: &str,
        start_at: Timestamp,
        end_at: Timestamp,
    ) -> LedgerResult<()>;

    async fn cancel_by_student_package_id_and_course_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        course_id: &str,
    ) -> LedgerResult<()>;

    async fn get_student_courses_by_student_package_id_for_update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<Vec<StudentCourse>>;

    async fn get_student_courses_by_student_package_ids_for_update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_ids: &[StudentPackageId],
    ) -> LedgerResult<Vec<StudentCourse>>;
}

/// Access Path Projector: owns `student_package_access_path`.
#[async_trait]
pub trait AccessPathStore: Send + Sync {
    async fn insert(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        path: &StudentPackageAccessPath,
    ) -> LedgerResult<()>;

    /// Re-assert a path. An existing row is left untouched.
    async fn update(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        path: &StudentPackageAccessPath,
    ) -> LedgerResult<()>;

    async fn insert_multi(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        paths: &[StudentPackageAccessPath],
    ) -> LedgerResult<()>;

    /// Soft delete each path. Every item must match exactly one live row.
    async fn delete_multi(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        paths: &[StudentPackageAccessPath],
    ) -> LedgerResult<()>;

    /// `Ok` means no live path exists for the pair. A live path is a precondition failure.
    async fn check_exist_student_package_access_path(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_id: &str,
        course_id: &str,
    ) -> LedgerResult<()>;

    async fn revert_by_student_id_and_course_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_id: &str,
        course_id: &str,
    ) -> LedgerResult<()>;

    /// Like `revert_by_student_id_and_course_id`, limited to paths owned by one head.
    async fn revert_by_student_package_id_and_course_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
        student_id: &str,
        course_id: &str,
    ) -> LedgerResult<()>;

    /// Live paths keyed by `"{student_id}_{course_id}"`.
    async fn get_map_student_course_key_with_student_package_access_path_by_student_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_ids: &[String],
    ) -> LedgerResult<HashMap<String, StudentPackageAccessPath>>;

    async fn get_by_student_id_and_course_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_id: &str,
        course_id: &str,
    ) -> LedgerResult<Option<StudentPackageAccessPath>>;

    async fn delete_by_student_package_ids(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_ids: &[StudentPackageId],
    ) -> LedgerResult<u64>;
}

/// Append-only audit trail of package changes.
#[async_trait]
pub trait StudentPackageLogStore: Send + Sync {
    async fn create(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        log: &StudentPackageLog,
    ) -> LedgerResult<()>;

    async fn get_by_student_package_id(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        student_package_id: &str,
    ) -> LedgerResult<Vec<StudentPackageLog>>;
}

/// Replace-all-children writes for package and product associations.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    async fn upsert_package_courses(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package_id: &str,
        courses: &[PackageCourse],
    ) -> LedgerResult<()>;

    async fn upsert_package_course_materials(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package_id: &str,
        materials: &[PackageCourseMaterial],
    ) -> LedgerResult<()>;

    async fn upsert_package_course_fees(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package_id: &str,
        fees: &[PackageCourseFee],
    ) -> LedgerResult<()>;

    async fn upsert_product_locations(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        product_id: &str,
        locations: &[ProductLocation],
    ) -> LedgerResult<()>;

    async fn get_package_courses(
        &self,
        ctx: &RequestContext,
        db: &dyn QueryExecutor,
        package_id: &str,
    ) -> LedgerResult<Vec<PackageCourse>>;
}
