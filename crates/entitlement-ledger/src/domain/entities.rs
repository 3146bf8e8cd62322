//! # Domain Entities
//!
//! ## Clusters
//!
//! - **Ledger**: `StudentPackage` (head) and `StudentPackageOrder` (segment)
//! - **Projections**: `StudentCourse`, `StudentPackageAccessPath`
//! - **Audit**: `StudentPackageLog`
//! - **Associations**: package children and product locations, replaced wholesale
//!   by the batch write coordinator

use serde::{Deserialize, Serialize};
use shared_types::{
    CourseId, LocationId, OrderId, PackageId, Revisable, StudentId, StudentPackageId,
    StudentPackageOrderId, TimeWindow, Timestamp,
};

// =============================================================================
// CLUSTER A: PACKAGE PROPERTIES
// =============================================================================

/// One course unlocked by a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseInfo {
    pub course_id: CourseId,
    pub name: String,
    pub number_of_slots: i32,
    pub weight: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AskTutorConfig {
    pub total_question_limit: i32,
    pub limit_duration: String,
}

/// Package-specific configuration stored in `student_packages.properties`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageProperties {
    pub all_course_info: Vec<CourseInfo>,
    pub can_watch_video: Vec<CourseId>,
    pub can_view_study_guide: Vec<CourseId>,
    pub can_do_quiz: Vec<CourseId>,
    pub limit_online_lesson: i32,
    pub ask_tutor: Option<AskTutorConfig>,
}

impl PackageProperties {
    /// Properties granting full access to the given courses.
    pub fn for_courses(courses: Vec<CourseInfo>) -> Self {
        let ids: Vec<CourseId> = courses.iter().map(|c| c.course_id.clone()).collect();
        Self {
            all_course_info: courses,
            can_watch_video: ids.clone(),
            can_view_study_guide: ids.clone(),
            can_do_quiz: ids,
            limit_online_lesson: 0,
            ask_tutor: None,
        }
    }

    pub fn course(&self, course_id: &str) -> Option<&CourseInfo> {
        self.all_course_info.iter().find(|c| c.course_id == course_id)
    }
}

// =============================================================================
// CLUSTER B: LEDGER
// =============================================================================

/// Entitlement head: one per student-package grant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentPackage {
    pub student_package_id: StudentPackageId,
    pub student_id: StudentId,
    /// Catalog reference. `None` for ad-hoc grants.
    pub package_id: Option<PackageId>,
    pub start_at: Option<Timestamp>,
    pub end_at: Option<Timestamp>,
    pub properties: PackageProperties,
    pub is_active: bool,
    pub location_ids: Vec<LocationId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl StudentPackage {
    /// Active window, when both bounds are set and ordered.
    pub fn window(&self) -> Option<TimeWindow> {
        TimeWindow::new(self.start_at?, self.end_at?)
    }

    /// Bounds are either missing or ordered.
    pub fn has_valid_window(&self) -> bool {
        match (self.start_at, self.end_at) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }
}

/// Ledger segment: one contiguous period of a package's life.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentPackageOrder {
    pub student_package_order_id: StudentPackageOrderId,
    pub student_package_id: StudentPackageId,
    pub user_id: StudentId,
    pub order_id: OrderId,
    pub course_id: CourseId,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    /// Snapshot of the head at creation time.
    pub student_package_object: serde_json::Value,
    pub is_current_student_package: bool,
    pub from_student_package_order_id: Option<StudentPackageOrderId>,
    pub executed_error: Option<String>,
    pub is_executed_by_cronjob: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl StudentPackageOrder {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_at,
            end: self.end_at,
        }
    }
}

// =============================================================================
// CLUSTER C: PROJECTIONS
// =============================================================================

/// Per-course grant derived from a package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentCourse {
    pub student_package_id: StudentPackageId,
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub location_id: LocationId,
    pub student_start_date: Timestamp,
    pub student_end_date: Timestamp,
    pub course_slot: Option<i32>,
    pub course_slot_per_week: Option<i32>,
    pub weight: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// Materialised student/course/location grant used by authorization checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentPackageAccessPath {
    pub student_package_id: StudentPackageId,
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub location_id: LocationId,
    pub access_path: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

macro_rules! impl_revisable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Revisable for $ty {
                fn deleted_at(&self) -> Option<Timestamp> {
                    self.deleted_at
                }

                fn set_deleted_at(&mut self, deleted_at: Option<Timestamp>) {
                    self.deleted_at = deleted_at;
                }
            }
        )+
    };
}

impl_revisable!(
    StudentPackage,
    StudentPackageOrder,
    StudentCourse,
    StudentPackageAccessPath,
);

// =============================================================================
// CLUSTER D: AUDIT
// =============================================================================

/// What happened to a package, as recorded in `student_package_log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageLogAction {
    Upserted,
    Canceled,
    Voided,
    Expired,
}

impl PackageLogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageLogAction::Upserted => "STUDENT_PACKAGE_ACTION_UPSERTED",
            PackageLogAction::Canceled => "STUDENT_PACKAGE_ACTION_CANCELED",
            PackageLogAction::Voided => "STUDENT_PACKAGE_ACTION_VOIDED",
            PackageLogAction::Expired => "STUDENT_PACKAGE_ACTION_EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            PackageLogAction::Upserted,
            PackageLogAction::Canceled,
            PackageLogAction::Voided,
            PackageLogAction::Expired,
        ]
        .into_iter()
        .find(|a| a.as_str() == s)
    }
}

/// Append-only audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentPackageLog {
    pub student_package_log_id: String,
    pub student_package_id: StudentPackageId,
    pub student_id: StudentId,
    pub course_id: Option<CourseId>,
    pub user_id: Option<String>,
    pub action: PackageLogAction,
    pub flow: String,
    pub student_package_object: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// =============================================================================
// CLUSTER E: ASSOCIATIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCourse {
    pub package_id: PackageId,
    pub course_id: CourseId,
    pub mandatory_flag: bool,
    pub course_weight: i32,
    pub max_slots_per_course: i32,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCourseMaterial {
    pub package_id: PackageId,
    pub course_id: CourseId,
    pub material_id: String,
    pub available_from: Option<Timestamp>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCourseFee {
    pub package_id: PackageId,
    pub course_id: CourseId,
    pub fee_id: String,
    pub available_from: Option<Timestamp>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLocation {
    pub product_id: String,
    pub location_id: LocationId,
    pub created_at: Timestamp,
}
