//! # Core Identifiers and Time Windows
//!
//! ## Clusters
//!
//! - **Identity**: string identifiers for students, packages, courses and locations
//! - **Time**: `Timestamp` and the closed interval `TimeWindow`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Identifier of a student (the user an entitlement belongs to).
pub type StudentId = String;

/// Identifier of an entitlement head (`student_packages.student_package_id`).
pub type StudentPackageId = String;

/// Identifier of one ledger segment (`student_package_order.student_package_order_id`).
pub type StudentPackageOrderId = String;

/// Catalog package identifier. Consumed only by ID.
pub type PackageId = String;

/// Catalog course identifier. Consumed only by ID.
pub type CourseId = String;

/// Location (branch) identifier.
pub type LocationId = String;

/// Identifier of the order that produced a ledger segment.
pub type OrderId = String;

/// Build the `"{student_id}_{course_id}"` key used by bulk access-path lookups.
pub fn student_course_key(student_id: &str, course_id: &str) -> String {
    format!("{}_{}", student_id, course_id)
}

// =============================================================================
// CLUSTER B: TIME
// =============================================================================

/// Wall-clock instant stored in every timestamp column.
pub type Timestamp = DateTime<Utc>;

/// A closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    /// Build a window. Returns `None` when `end < start`.
    pub fn new(start: Timestamp, end: Timestamp) -> Option<Self> {
        if end < start {
            return None;
        }
        Some(Self { start, end })
    }

    /// True when `t` lies inside the window (both bounds inclusive).
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }

    /// True when the two windows share at least one instant.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Window lies entirely before `other`.
    pub fn is_before(&self, other: &TimeWindow) -> bool {
        self.end < other.start
    }

    /// Window lies entirely after `other`.
    pub fn is_after(&self, other: &TimeWindow) -> bool {
        self.start > other.end
    }
}
